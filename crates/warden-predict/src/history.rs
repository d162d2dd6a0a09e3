//! Bounded rolling alert history, stored as one JSON array.

use crate::alert::PredictiveAlert;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use warden_core::{AtomicWriteError, write_atomic};

#[derive(Debug, thiserror::Error)]
pub enum HistoryError {
    #[error("failed to read alert history {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid alert history {path}: {message}")]
    Parse { path: String, message: String },

    #[error("failed to serialize alert history: {0}")]
    Serialize(String),

    #[error(transparent)]
    Write(#[from] AtomicWriteError),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub run_id: String,
    pub recorded_at: DateTime<Utc>,
    pub alert: PredictiveAlert,
}

#[derive(Debug, Clone)]
pub struct AlertHistory {
    path: PathBuf,
    limit: usize,
}

impl AlertHistory {
    pub fn new(path: impl Into<PathBuf>, limit: usize) -> Self {
        Self {
            path: path.into(),
            limit: limit.max(1),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Oldest first. A missing file is an empty history.
    pub fn load(&self) -> Result<Vec<HistoryEntry>, HistoryError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let text = fs::read_to_string(&self.path).map_err(|source| HistoryError::Read {
            path: self.path.display().to_string(),
            source,
        })?;
        if text.trim().is_empty() {
            return Ok(Vec::new());
        }
        serde_json::from_str(&text).map_err(|e| HistoryError::Parse {
            path: self.path.display().to_string(),
            message: e.to_string(),
        })
    }

    /// Append `alerts` and keep only the newest `limit` entries.
    pub fn record(
        &self,
        run_id: &str,
        alerts: &[PredictiveAlert],
        recorded_at: DateTime<Utc>,
    ) -> Result<Vec<HistoryEntry>, HistoryError> {
        let mut entries = self.load()?;
        entries.extend(alerts.iter().map(|alert| HistoryEntry {
            run_id: run_id.to_string(),
            recorded_at,
            alert: alert.clone(),
        }));
        if entries.len() > self.limit {
            let excess = entries.len() - self.limit;
            entries.drain(..excess);
        }
        let mut bytes = serde_json::to_vec_pretty(&entries)
            .map_err(|e| HistoryError::Serialize(e.to_string()))?;
        bytes.push(b'\n');
        write_atomic(&self.path, &bytes)?;
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use warden_core::{Severity, TimeToViolation};

    fn alert(id: &str) -> PredictiveAlert {
        PredictiveAlert {
            id: id.to_string(),
            pattern_id: "version-skew".to_string(),
            risk_level: Severity::Medium,
            confidence: 0.56,
            evidence: vec!["version missing: missing-version on 1 artifact(s)".to_string()],
            matched_conditions: vec!["no-version".to_string()],
            time_to_violation: TimeToViolation::Soon,
            prevention_actions: Vec::new(),
            auto_preventable: false,
        }
    }

    #[test]
    fn history_keeps_the_newest_entries() {
        let dir = tempfile::tempdir().expect("tempdir");
        let history = AlertHistory::new(dir.path().join(".warden/alerts.json"), 3);
        assert!(history.load().expect("empty").is_empty());

        history
            .record("run-1", &[alert("a"), alert("b")], Utc::now())
            .expect("record");
        let entries = history
            .record("run-2", &[alert("c"), alert("d")], Utc::now())
            .expect("record");
        let ids: Vec<&str> = entries.iter().map(|entry| entry.alert.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "c", "d"]);
        assert_eq!(history.load().expect("reload"), entries);
    }

    #[test]
    fn corrupt_history_is_an_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("alerts.json");
        fs::write(&path, "{not json").expect("write");
        let history = AlertHistory::new(&path, 10);
        assert!(matches!(history.load(), Err(HistoryError::Parse { .. })));
        assert!(matches!(
            history.record("run", &[alert("a")], Utc::now()),
            Err(HistoryError::Parse { .. })
        ));
    }
}
