//! # warden-blueprint
//!
//! Drift detection and repair for blueprint artifacts.
//!
//! ## Pipeline
//!
//! ```text
//! ArtifactStore (YAML on disk)
//!     │  read + parse
//! RuleEvaluator           → Issue[] + HealthReport (score, status)
//!     │
//! RepairPlanner           → RepairAction per auto-fixable Issue
//!     │
//! RepairApplier           → lock, apply in memory, atomic write, repair log
//!     │
//! RuleEvaluator (re-read) → final HealthReport
//! ```
//!
//! Evaluation is pure. The applier is the only writer, and it never leaves
//! an artifact half-repaired: either every safe action lands in one atomic
//! rename or the file keeps its original bytes.

pub mod apply;
pub mod artifact;
pub mod issue;
pub mod repair;
pub mod repair_log;
pub mod report;
pub mod rules;
pub mod scan;
pub mod store;

pub use apply::{AppliedAction, RepairApplier, RepairError, RepairFailure, RepairOutcome};
pub use artifact::{Artifact, ArtifactError, KeyPath, has_marker, insert_header_line};
pub use issue::{Issue, IssueCategory, RuleId};
pub use repair::{
    PlannerConfigError, RepairAction, RepairHandler, RepairOperation, RepairPlanner, RepairRisk,
    RepairTarget, default_repair_handlers,
};
pub use repair_log::{RepairChange, RepairLogEntry, read_repair_log};
pub use report::{HealthReport, HealthStatus, health_score};
pub use rules::{
    RuleEvaluator, VersionSource, normalize_version, version_format_re, version_source,
};
pub use scan::{
    ArtifactScan, HealOutcome, HealReport, RepositoryScan, ScanSummary, heal_repository,
    scan_artifact, scan_repository,
};
pub use store::{ArtifactStore, Discovery, StoreError, WalkFailure};
