//! Live repository signals: working-tree changes, the last validation run,
//! and modification times of documents the catalog refers to.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::debug;
use warden_core::{CommandRunner, CommandSpec, read_records_from_path};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepoState {
    /// Repo-relative paths with any working-tree or index change, untracked included.
    pub changed_files: Vec<String>,
    /// Repo-relative paths with staged changes.
    pub staged_files: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_validation: Option<DateTime<Utc>>,
    /// Modification time per referenced document; `None` when it is missing.
    #[serde(default)]
    pub document_mtimes: BTreeMap<String, Option<DateTime<Utc>>>,
    /// Whether `git status` succeeded; change probes are unknowable otherwise.
    pub vcs_available: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub collection_errors: Vec<String>,
}

impl RepoState {
    /// Collect state for `root`. Failures are recorded, never returned.
    pub fn collect(
        root: &Path,
        validation_log: &Path,
        documents: &[String],
        runner: &dyn CommandRunner,
        timeout: Duration,
    ) -> Self {
        let mut state = Self::default();

        let spec = CommandSpec::new("git", &["status", "--porcelain"]).with_timeout(timeout);
        let outcome = runner.run(&spec, root);
        match outcome.failure_message() {
            None => {
                let (changed, staged) = parse_porcelain(&outcome.stdout);
                state.changed_files = changed;
                state.staged_files = staged;
                state.vcs_available = true;
            }
            Some(message) => {
                debug!(error = %message, "git status unavailable");
                state.collection_errors.push(message);
            }
        }

        match last_validation(validation_log) {
            Ok(last) => state.last_validation = last,
            Err(message) => state.collection_errors.push(message),
        }

        for document in documents {
            let mtime = fs::metadata(root.join(document))
                .and_then(|meta| meta.modified())
                .ok()
                .map(DateTime::<Utc>::from);
            state.document_mtimes.insert(document.clone(), mtime);
        }
        state
    }
}

/// Split `git status --porcelain` (v1) output into changed and staged paths.
pub fn parse_porcelain(output: &str) -> (Vec<String>, Vec<String>) {
    let mut changed = Vec::new();
    let mut staged = Vec::new();
    for line in output.lines() {
        if line.len() < 4 {
            continue;
        }
        let (status, rest) = line.split_at(2);
        let path = rest.trim_start();
        // Renames and copies are reported as `old -> new`.
        let path = path.rsplit(" -> ").next().unwrap_or(path);
        let path = path.trim_matches('"').to_string();
        let index = status.chars().next().unwrap_or(' ');
        if index != ' ' && index != '?' && index != '!' {
            staged.push(path.clone());
        }
        if index != '!' {
            changed.push(path);
        }
    }
    changed.sort();
    changed.dedup();
    staged.sort();
    staged.dedup();
    (changed, staged)
}

/// Latest `timestamp` recorded in the validation log.
fn last_validation(path: &Path) -> Result<Option<DateTime<Utc>>, String> {
    let records: Vec<Value> = read_records_from_path(path)
        .map_err(|e| format!("validation log {}: {e}", path.display()))?;
    Ok(records
        .iter()
        .filter_map(|record| record.get("timestamp")?.as_str())
        .filter_map(|text| DateTime::parse_from_rfc3339(text).ok())
        .map(|ts| ts.with_timezone(&Utc))
        .max())
}
