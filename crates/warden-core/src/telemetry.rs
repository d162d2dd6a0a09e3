//! Injected telemetry sink.
//!
//! Components emit `{type, severity, timestamp, data}` events for every major
//! operation. The pipeline never depends on the sink succeeding: [`emit`]
//! logs a sink failure and carries on.

use crate::jsonl::append_record;
use crate::severity::Severity;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TelemetryEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    pub severity: Severity,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub data: Value,
}

impl TelemetryEvent {
    pub fn new(event_type: impl Into<String>, severity: Severity, data: Value) -> Self {
        Self {
            event_type: event_type.into(),
            severity,
            timestamp: Utc::now(),
            data,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    #[error("telemetry sink unavailable: {0}")]
    Unavailable(String),
}

pub trait TelemetrySink: Send + Sync {
    fn emit(&self, event: &TelemetryEvent) -> Result<(), TelemetryError>;
}

/// Emit best-effort: a failing sink is logged, never propagated.
pub fn emit(sink: &dyn TelemetrySink, event: TelemetryEvent) {
    if let Err(err) = sink.emit(&event) {
        warn!(event_type = %event.event_type, error = %err, "telemetry emit failed");
    }
}

/// Discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl TelemetrySink for NullSink {
    fn emit(&self, _event: &TelemetryEvent) -> Result<(), TelemetryError> {
        Ok(())
    }
}

/// Appends events to a JSONL file.
#[derive(Debug, Clone)]
pub struct JsonlSink {
    path: PathBuf,
}

impl JsonlSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl TelemetrySink for JsonlSink {
    fn emit(&self, event: &TelemetryEvent) -> Result<(), TelemetryError> {
        append_record(&self.path, event).map_err(|e| TelemetryError::Unavailable(e.to_string()))
    }
}

/// Keeps events in memory; used by embedders and tests to inspect emissions.
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<TelemetryEvent>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<TelemetryEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    pub fn event_types(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .map(|event| event.event_type)
            .collect()
    }
}

impl TelemetrySink for MemorySink {
    fn emit(&self, event: &TelemetryEvent) -> Result<(), TelemetryError> {
        self.events
            .lock()
            .map_err(|e| TelemetryError::Unavailable(e.to_string()))?
            .push(event.clone());
        Ok(())
    }
}
