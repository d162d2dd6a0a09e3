//! # warden-mechanisms
//!
//! Reflexive self-test harness for Warden's own remediation machinery.
//!
//! A [`MechanismCatalog`] lists each mechanism with the handler that
//! implements it and the synthetic scenarios it must survive. The
//! [`MechanismValidator`] resolves handlers from a [`HandlerRegistry`] and
//! compares what they observe against each scenario's expected outcome.
//! Adding a mechanism is a catalog row, plus a handler when it is new code.

pub mod catalog;
pub mod feedback;
pub mod handlers;
pub mod registry;
pub mod validator;

pub use catalog::{MechanismCatalog, MechanismError, PreventionMechanism, TestScenario};
pub use feedback::{
    FEEDBACK_EVENTS_FILE, FeedbackOutcome, ValidationLogRecord, feedback_events, record_feedback,
    report_severity,
};
pub use handlers::builtin_registry;
pub use registry::{HandlerRegistry, MechanismHandler, Observation, observation};
pub use validator::{
    MechanismValidator, ScenarioResult, SystematicValidationReport, ValidationResult,
    ValidationStatus, ValidationSummary, compare_outcome, rollup,
};
