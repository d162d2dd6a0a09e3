//! Historical violation/drift records and the event-log loader.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;
use warden_core::{Severity, read_records_lenient, tenths};

/// Compliance scores below this count as evidence of drift.
const LOW_COMPLIANCE_SCORE: f64 = 80.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoricalEvent {
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub event_type: Option<String>,
    #[serde(default)]
    pub severity: Severity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub drift_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compliance_score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_correction: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub evidence: Vec<Value>,
}

impl HistoricalEvent {
    pub fn new(timestamp: DateTime<Utc>, severity: Severity) -> Self {
        Self {
            timestamp,
            action: None,
            event_type: None,
            severity,
            drift_type: None,
            compliance_score: None,
            user_correction: None,
            description: None,
            evidence: Vec::new(),
        }
    }

    /// `agent-<action>` when an action is present, else `system-<type>`.
    pub fn pattern_id(&self) -> Option<String> {
        if let Some(action) = non_blank(self.action.as_deref()) {
            return Some(format!("agent-{action}"));
        }
        non_blank(self.event_type.as_deref()).map(|kind| format!("system-{kind}"))
    }

    pub fn is_agent_action(&self) -> bool {
        non_blank(self.action.as_deref()).is_some()
    }

    /// Initial confidence for a pattern first seen through this record:
    /// `0.3 + 0.4·drift + 0.2·low score + 0.1·correction`, capped at `1.0`.
    pub fn likelihood(&self) -> f64 {
        let mut score = 3;
        if non_blank(self.drift_type.as_deref()).is_some() {
            score += 4;
        }
        if self
            .compliance_score
            .is_some_and(|value| value < LOW_COMPLIANCE_SCORE)
        {
            score += 2;
        }
        if self.user_correction.as_ref().is_some_and(|v| !v.is_null()) {
            score += 1;
        }
        tenths(score.min(10))
    }

    /// Evidence flattened to display strings, description first.
    pub fn evidence_lines(&self) -> Vec<String> {
        let mut lines = Vec::new();
        if let Some(description) = non_blank(self.description.as_deref()) {
            lines.push(description.to_string());
        }
        for item in &self.evidence {
            match item {
                Value::String(text) if !text.trim().is_empty() => lines.push(text.clone()),
                Value::Null | Value::String(_) => {}
                other => lines.push(other.to_string()),
            }
        }
        lines
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|text| !text.is_empty())
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum EventLogError {
    #[error("failed to read event log {path}: {message}")]
    Unreadable { path: String, message: String },

    #[error("malformed event log {path}: {message}")]
    Malformed { path: String, message: String },
}

/// Events gathered from an events directory.
#[derive(Debug, Clone, Default)]
pub struct EventLoad {
    pub events: Vec<HistoricalEvent>,
    /// Records that parsed as JSON but are not events.
    pub rejected: usize,
    pub errors: Vec<EventLogError>,
    pub files: Vec<PathBuf>,
}

/// Load every `*.jsonl` and `*.json` file under `dir`. A bad file is
/// reported in `errors` and skipped; it never stops the other files.
pub fn load_events_dir(dir: &Path) -> EventLoad {
    let mut load = EventLoad::default();
    if !dir.exists() {
        debug!(dir = %dir.display(), "events directory missing");
        return load;
    }

    let mut files: Vec<PathBuf> = WalkDir::new(dir)
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(err) => {
                load.errors.push(EventLogError::Unreadable {
                    path: dir.display().to_string(),
                    message: err.to_string(),
                });
                None
            }
        })
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| log_format(path).is_some())
        .collect();
    files.sort();

    for path in files {
        match read_log_file(&path) {
            Ok((records, line_errors)) => {
                for err in line_errors {
                    warn!(error = %err, "skipping malformed event line");
                    load.errors.push(err);
                }
                for record in records {
                    match serde_json::from_value::<HistoricalEvent>(record) {
                        Ok(event) => load.events.push(event),
                        Err(err) => {
                            debug!(path = %path.display(), error = %err, "rejected event record");
                            load.rejected += 1;
                        }
                    }
                }
                load.files.push(path);
            }
            Err(err) => {
                warn!(error = %err, "skipping event log");
                load.errors.push(err);
            }
        }
    }
    load
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LogFormat {
    Lines,
    Array,
}

fn log_format(path: &Path) -> Option<LogFormat> {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("jsonl") => Some(LogFormat::Lines),
        Some("json") => Some(LogFormat::Array),
        _ => None,
    }
}

/// Parsed records plus per-line errors. Only a `.jsonl` file can have line
/// errors; a bad `.json` array fails the whole file.
fn read_log_file(path: &Path) -> Result<(Vec<Value>, Vec<EventLogError>), EventLogError> {
    let display = path.display().to_string();
    let text = fs::read_to_string(path).map_err(|e| EventLogError::Unreadable {
        path: display.clone(),
        message: e.to_string(),
    })?;
    let malformed = |message: String| EventLogError::Malformed {
        path: display.clone(),
        message,
    };
    match log_format(path) {
        Some(LogFormat::Array) => match serde_json::from_str::<Value>(&text) {
            Ok(Value::Array(records)) => Ok((records, Vec::new())),
            Ok(_) => Err(malformed("expected a JSON array of events".to_string())),
            Err(err) => Err(malformed(err.to_string())),
        },
        _ => {
            let read = read_records_lenient::<Value>(text.as_bytes());
            let errors = read
                .errors
                .into_iter()
                .map(|e| malformed(e.to_string()))
                .collect();
            Ok((read.records, errors))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn event(value: Value) -> HistoricalEvent {
        serde_json::from_value(value).expect("event parses")
    }

    #[test]
    fn pattern_id_prefers_action() {
        let both = event(json!({"timestamp": "2026-01-01T00:00:00Z", "action": "skip-tests", "type": "drift"}));
        assert_eq!(both.pattern_id().as_deref(), Some("agent-skip-tests"));
        let system = event(json!({"timestamp": "2026-01-01T00:00:00Z", "type": "schema-drift"}));
        assert_eq!(system.pattern_id().as_deref(), Some("system-schema-drift"));
        let neither = event(json!({"timestamp": "2026-01-01T00:00:00Z", "action": "  "}));
        assert_eq!(neither.pattern_id(), None);
    }

    #[test]
    fn likelihood_adds_evidence_weights() {
        let base = event(json!({"timestamp": "2026-01-01T00:00:00Z", "type": "x"}));
        assert_eq!(base.likelihood(), 0.3);
        let full = event(json!({
            "timestamp": "2026-01-01T00:00:00Z",
            "type": "x",
            "driftType": "schema",
            "complianceScore": 79.5,
            "userCorrection": "reverted"
        }));
        assert_eq!(full.likelihood(), 1.0);
        let at_threshold = event(json!({
            "timestamp": "2026-01-01T00:00:00Z",
            "type": "x",
            "driftType": "schema",
            "complianceScore": 80
        }));
        assert_eq!(at_threshold.likelihood(), 0.7);
    }

    #[test]
    fn loader_reads_both_formats_and_reports_bad_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(
            dir.path().join("a.jsonl"),
            "# agent session\n{\"timestamp\":\"2026-01-02T00:00:00Z\",\"action\":\"edit\",\"severity\":\"high\"}\n\n{\"no\":\"timestamp\"}\n",
        )
        .expect("write jsonl");
        fs::write(
            dir.path().join("b.json"),
            r#"[{"timestamp":"2026-01-01T00:00:00Z","type":"drift"}]"#,
        )
        .expect("write json");
        fs::write(dir.path().join("c.json"), "{not json").expect("write bad");
        fs::write(dir.path().join("notes.txt"), "ignored").expect("write txt");

        let load = load_events_dir(dir.path());
        assert_eq!(load.events.len(), 2);
        assert_eq!(load.rejected, 1);
        assert_eq!(load.errors.len(), 1);
        assert!(matches!(load.errors[0], EventLogError::Malformed { ref path, .. } if path.ends_with("c.json")));
        assert_eq!(load.events[0].severity, Severity::High);
    }

    #[test]
    fn malformed_line_keeps_the_rest_of_the_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(
            dir.path().join("agent.jsonl"),
            concat!(
                "{\"timestamp\":\"2026-01-01T00:00:00Z\",\"action\":\"skip-tests\"}\n",
                "{\"timestamp\": truncated\n",
                "{\"timestamp\":\"2026-01-02T00:00:00Z\",\"action\":\"skip-tests\"}\n",
            ),
        )
        .expect("write jsonl");

        let load = load_events_dir(dir.path());
        assert_eq!(load.events.len(), 2);
        assert_eq!(load.files.len(), 1);
        assert_eq!(load.errors.len(), 1);
        assert!(matches!(
            load.errors[0],
            EventLogError::Malformed { ref path, ref message }
                if path.ends_with("agent.jsonl") && message.starts_with("line 2:")
        ));
    }

    #[test]
    fn missing_directory_loads_nothing() {
        let dir = tempfile::tempdir().expect("tempdir");
        let load = load_events_dir(&dir.path().join("absent"));
        assert!(load.events.is_empty());
        assert!(load.errors.is_empty());
    }
}
