//! Repair application.
//!
//! One `apply` call is one transaction per artifact: take the repository
//! lock, re-read the file, check it still matches the report, apply every
//! approved action in memory, then write once. Any failure leaves the file
//! byte-for-byte unchanged.

use crate::artifact::{Artifact, ArtifactError, KeyPath, has_marker, insert_header_line};
use crate::repair::{RepairAction, RepairOperation, RepairTarget};
use crate::repair_log::{RepairChange, RepairLogEntry};
use crate::report::HealthReport;
use crate::store::{ArtifactStore, StoreError};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use serde_yaml::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use warden_core::{
    LockError, RepoLock, Severity, TelemetryEvent, TelemetrySink, append_record, emit,
    sha256_digest,
};

#[derive(Debug, thiserror::Error)]
pub enum RepairError {
    #[error(transparent)]
    Lock(#[from] LockError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Artifact(#[from] ArtifactError),

    #[error("{path} changed since it was evaluated; re-scan before repairing")]
    Stale { path: String },

    #[error("action for `{issue_id}` is malformed: {message}")]
    InvalidAction { issue_id: String, message: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepairFailure {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issue_id: Option<String>,
    pub message: String,
}

impl RepairFailure {
    fn new(issue_id: Option<&str>, error: &RepairError) -> Self {
        Self {
            issue_id: issue_id.map(str::to_string),
            message: error.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppliedAction {
    pub issue_id: String,
    pub description: String,
    pub change: RepairChange,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepairOutcome {
    pub artifact_id: String,
    pub file_path: String,
    pub modified: bool,
    pub applied: Vec<AppliedAction>,
    /// Approved actions that were already satisfied on disk.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub already_satisfied: Vec<String>,
    pub pending_approval: Vec<RepairAction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<RepairFailure>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub digest_before: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub digest_after: Option<String>,
    /// Set when the file was repaired but its repair log entries were not
    /// all written.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_error: Option<String>,
}

impl RepairOutcome {
    fn empty(report: &HealthReport, pending_approval: Vec<RepairAction>) -> Self {
        Self {
            artifact_id: report.artifact_id.clone(),
            file_path: report.file_path.clone(),
            modified: false,
            applied: Vec::new(),
            already_satisfied: Vec::new(),
            pending_approval,
            failure: None,
            digest_before: None,
            digest_after: None,
            log_error: None,
        }
    }

    pub fn failed(&self) -> bool {
        self.failure.is_some()
    }
}

#[derive(Clone)]
pub struct RepairApplier {
    store: ArtifactStore,
    lock_path: PathBuf,
    repair_log: PathBuf,
    run_id: String,
    telemetry: Arc<dyn TelemetrySink>,
}

impl RepairApplier {
    pub fn new(
        store: ArtifactStore,
        lock_path: impl Into<PathBuf>,
        repair_log: impl Into<PathBuf>,
        run_id: impl Into<String>,
        telemetry: Arc<dyn TelemetrySink>,
    ) -> Self {
        Self {
            store,
            lock_path: lock_path.into(),
            repair_log: repair_log.into(),
            run_id: run_id.into(),
            telemetry,
        }
    }

    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    pub fn apply(&self, report: &HealthReport) -> RepairOutcome {
        let (ready, pending): (Vec<_>, Vec<_>) = report
            .actions
            .iter()
            .cloned()
            .partition(|action| !action.requires_approval);
        let mut outcome = RepairOutcome::empty(report, pending);
        if ready.is_empty() {
            return outcome;
        }

        let path = PathBuf::from(&report.file_path);
        match self.apply_locked(report, &path, &ready, &mut outcome) {
            Ok(()) => {}
            Err((issue_id, error)) => {
                warn!(artifact_id = %report.artifact_id, error = %error, "repair aborted; file left unchanged");
                outcome.applied.clear();
                outcome.already_satisfied.clear();
                outcome.modified = false;
                outcome.digest_after = None;
                outcome.failure = Some(RepairFailure::new(issue_id.as_deref(), &error));
                emit(
                    self.telemetry.as_ref(),
                    TelemetryEvent::new(
                        "repair.failed",
                        Severity::High,
                        json!({
                            "artifactId": report.artifact_id,
                            "issueId": issue_id,
                            "error": error.to_string(),
                        }),
                    ),
                );
                return outcome;
            }
        }

        if outcome.modified {
            outcome.log_error = self.log_applied(report, &outcome);
            info!(
                artifact_id = %report.artifact_id,
                applied = outcome.applied.len(),
                "repaired artifact"
            );
            emit(
                self.telemetry.as_ref(),
                TelemetryEvent::new(
                    "repair.applied",
                    Severity::Medium,
                    json!({
                        "artifactId": report.artifact_id,
                        "applied": outcome.applied.len(),
                        "pendingApproval": outcome.pending_approval.len(),
                        "logError": outcome.log_error,
                    }),
                ),
            );
        }
        outcome
    }

    fn apply_locked(
        &self,
        report: &HealthReport,
        path: &Path,
        ready: &[RepairAction],
        outcome: &mut RepairOutcome,
    ) -> Result<(), (Option<String>, RepairError)> {
        let _lock = RepoLock::acquire(&self.lock_path).map_err(unattributed)?;

        let raw = self.store.read(path).map_err(unattributed)?;
        let digest_before = sha256_digest(raw.as_bytes());
        if let Some(expected) = &report.source_digest
            && *expected != digest_before
        {
            return Err((
                None,
                RepairError::Stale {
                    path: path.display().to_string(),
                },
            ));
        }
        outcome.digest_before = Some(digest_before);

        let mut artifact = Artifact::parse(path, raw.clone()).map_err(unattributed)?;
        let mut headers: Vec<String> = Vec::new();
        let mut fields_changed = false;

        for action in ready {
            let applied = apply_action(&mut artifact, &mut headers, action)
                .map_err(|e| (Some(action.issue_id.clone()), e))?;
            match applied {
                Some(change) => {
                    fields_changed |= change.target == RepairTarget::Field;
                    outcome.applied.push(AppliedAction {
                        issue_id: action.issue_id.clone(),
                        description: action.description.clone(),
                        change,
                    });
                }
                None => outcome.already_satisfied.push(action.issue_id.clone()),
            }
        }

        if outcome.applied.is_empty() {
            return Ok(());
        }

        let text = if fields_changed {
            artifact.render(&headers).map_err(unattributed)?
        } else {
            headers
                .iter()
                .fold(raw, |text, line| insert_header_line(&text, line))
        };
        self.store.write(path, &text).map_err(unattributed)?;
        outcome.modified = true;
        outcome.digest_after = Some(sha256_digest(text.as_bytes()));
        Ok(())
    }

    /// Append one log entry per applied action. Returns a description of
    /// the entries that could not be written.
    fn log_applied(&self, report: &HealthReport, outcome: &RepairOutcome) -> Option<String> {
        let timestamp = Utc::now();
        let mut unwritten = 0usize;
        let mut first_error = None;
        for applied in &outcome.applied {
            let entry = RepairLogEntry {
                run_id: self.run_id.clone(),
                artifact_id: report.artifact_id.clone(),
                file_path: report.file_path.clone(),
                issue_id: applied.issue_id.clone(),
                description: applied.description.clone(),
                changes: vec![applied.change.clone()],
                timestamp,
                digest_before: outcome.digest_before.clone().unwrap_or_default(),
                digest_after: outcome.digest_after.clone().unwrap_or_default(),
            };
            if let Err(err) = append_record(&self.repair_log, &entry) {
                warn!(path = %self.repair_log.display(), error = %err, "failed to append repair log");
                unwritten += 1;
                first_error.get_or_insert_with(|| err.to_string());
            }
        }
        first_error.map(|err| {
            format!(
                "{unwritten} of {} repair log entries not written to {}: {err}",
                outcome.applied.len(),
                self.repair_log.display()
            )
        })
    }
}

fn unattributed(error: impl Into<RepairError>) -> (Option<String>, RepairError) {
    (None, error.into())
}

/// Apply one action in memory. `Ok(None)` means it was already satisfied.
fn apply_action(
    artifact: &mut Artifact,
    headers: &mut Vec<String>,
    action: &RepairAction,
) -> Result<Option<RepairChange>, RepairError> {
    let invalid = |message: &str| RepairError::InvalidAction {
        issue_id: action.issue_id.clone(),
        message: message.to_string(),
    };

    match action.target {
        RepairTarget::Header => {
            let Some(Value::String(line)) = &action.new_value else {
                return Err(invalid("header action needs a string line"));
            };
            if action.operation != RepairOperation::Add {
                return Err(invalid("header actions only support add"));
            }
            if has_marker(&artifact.raw_text, &action.path)
                || headers.iter().any(|existing| has_marker(existing, &action.path))
            {
                return Ok(None);
            }
            headers.push(line.clone());
            Ok(Some(RepairChange {
                operation: RepairOperation::Add,
                target: RepairTarget::Header,
                path: action.path.clone(),
                before: None,
                after: Some(Value::String(line.clone())),
            }))
        }
        RepairTarget::Field => {
            let path = KeyPath::parse(&action.path)?;
            let current = artifact.get(&path).cloned();
            match action.operation {
                RepairOperation::Add | RepairOperation::Update => {
                    let Some(new_value) = action.new_value.clone() else {
                        return Err(invalid("add/update needs a new value"));
                    };
                    let satisfied = match action.operation {
                        RepairOperation::Add => current.as_ref().is_some_and(|v| !v.is_null()),
                        _ => current.as_ref() == Some(&new_value),
                    };
                    if satisfied {
                        return Ok(None);
                    }
                    let before = artifact.set(&path, new_value.clone())?;
                    Ok(Some(RepairChange {
                        operation: action.operation,
                        target: RepairTarget::Field,
                        path: action.path.clone(),
                        before,
                        after: Some(new_value),
                    }))
                }
                RepairOperation::Remove => {
                    if current.is_none() {
                        return Ok(None);
                    }
                    let before = artifact.remove(&path)?;
                    Ok(Some(RepairChange {
                        operation: RepairOperation::Remove,
                        target: RepairTarget::Field,
                        path: action.path.clone(),
                        before,
                        after: None,
                    }))
                }
            }
        }
    }
}
