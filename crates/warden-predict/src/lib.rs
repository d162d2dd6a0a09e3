//! # warden-predict
//!
//! Forecasts compliance violations before they happen.
//!
//! A catalog of compliance-pattern templates names typed probes over live
//! repository state, learned patterns, and current artifact health. The
//! monitor scores each template from the probes that hold and raises an
//! alert above `0.3` confidence. Critical alerts whose template has a strong
//! prevention record are handed to the [`PreventionExecutor`], which runs
//! each action at most once per fingerprint and logs every decision.

pub mod alert;
pub mod catalog;
pub mod history;
pub mod monitor;
pub mod prevention;
pub mod probe;
pub mod repo_state;

pub use alert::{
    ALERT_THRESHOLD, MonitoringResult, MonitoringStatus, PredictiveAlert, ProbeFailure,
    overall_risk_score,
};
pub use catalog::{Catalog, CatalogError, CompliancePattern, Condition};
pub use history::{AlertHistory, HistoryEntry, HistoryError};
pub use monitor::PredictiveMonitor;
pub use prevention::{
    BlueprintRepairHook, PreventionAction, PreventionExecutor, PreventionRecord,
    PreventionStatus, PreventionStep, RepairHook, RepairSummary, prevention_fingerprint,
};
pub use probe::{Probe, ProbeContext, ProbeError, ProbeOutcome};
pub use repo_state::{RepoState, parse_porcelain};
