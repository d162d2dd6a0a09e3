//! Feeds validation results back into the rest of the pipeline.
//!
//! Every failed scenario becomes a historical event in the events directory,
//! so repeated mechanism regressions grow a `system-mechanism-<id>` pattern
//! the monitor can see. Every run appends one summary record to the
//! validation log, which is where "last validation" is read from.

use crate::validator::{SystematicValidationReport, ValidationStatus, ValidationSummary};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::path::{Path, PathBuf};
use tracing::info;
use warden_core::{JsonlError, Severity, append_record};
use warden_patterns::HistoricalEvent;

/// File under the events directory that receives validation feedback.
pub const FEEDBACK_EVENTS_FILE: &str = "mechanism-validation.jsonl";

pub const REGRESSION_DRIFT_TYPE: &str = "mechanism-regression";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationLogRecord {
    pub timestamp: DateTime<Utc>,
    pub run_id: String,
    pub overall_status: ValidationStatus,
    pub summary: ValidationSummary,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackOutcome {
    pub events_written: usize,
    pub events_file: PathBuf,
    pub validation_log: PathBuf,
}

/// One event per failed scenario, one per unresolvable mechanism.
pub fn feedback_events(report: &SystematicValidationReport) -> Vec<HistoricalEvent> {
    let mut events = Vec::new();
    for result in &report.results {
        let event_type = format!("mechanism-{}", result.mechanism_id);
        if result.status == ValidationStatus::Error {
            for error in &result.errors {
                let mut event = HistoricalEvent::new(report.generated_at, result.criticality);
                event.event_type = Some(event_type.clone());
                event.drift_type = Some(REGRESSION_DRIFT_TYPE.to_string());
                event.description = Some(error.clone());
                events.push(event);
            }
            continue;
        }
        for scenario in result.scenarios.iter().filter(|scenario| !scenario.passed) {
            let mut event = HistoricalEvent::new(report.generated_at, scenario.risk_level);
            event.event_type = Some(event_type.clone());
            event.drift_type = Some(REGRESSION_DRIFT_TYPE.to_string());
            event.description = scenario.failure_message();
            event.evidence = scenario
                .mismatches
                .iter()
                .map(|mismatch| json!(mismatch))
                .chain(scenario.error.iter().map(|error| json!(error)))
                .collect();
            events.push(event);
        }
    }
    events
}

/// Append feedback events and the validation-log summary.
pub fn record_feedback(
    report: &SystematicValidationReport,
    run_id: &str,
    events_dir: &Path,
    validation_log: &Path,
) -> Result<FeedbackOutcome, JsonlError> {
    let events_file = events_dir.join(FEEDBACK_EVENTS_FILE);
    let events = feedback_events(report);
    for event in &events {
        append_record(&events_file, event)?;
    }
    append_record(
        validation_log,
        &ValidationLogRecord {
            timestamp: report.generated_at,
            run_id: run_id.to_string(),
            overall_status: report.overall_status,
            summary: report.summary.clone(),
        },
    )?;
    info!(
        events = events.len(),
        validation_log = %validation_log.display(),
        "recorded validation feedback"
    );
    Ok(FeedbackOutcome {
        events_written: events.len(),
        events_file,
        validation_log: validation_log.to_path_buf(),
    })
}

/// Severity for the telemetry event summarising one validation run.
pub fn report_severity(report: &SystematicValidationReport) -> Severity {
    match report.overall_status {
        ValidationStatus::Pass => Severity::Low,
        ValidationStatus::Warning => Severity::Medium,
        ValidationStatus::Fail | ValidationStatus::Error => Severity::High,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validator::{ScenarioResult, ValidationResult};
    use warden_core::read_records_from_path;
    use warden_patterns::PatternStore;

    fn failing_report(at: &str) -> SystematicValidationReport {
        let result = ValidationResult {
            mechanism_id: "repair".to_string(),
            implementation_ref: "blueprint.repair-applier".to_string(),
            criticality: Severity::Critical,
            status: ValidationStatus::Fail,
            tests_run: 2,
            tests_passed: 1,
            tests_failed: 1,
            evidence: vec!["scenario `ok` passed".to_string()],
            errors: vec!["scenario `broken`: `modified`: expected true, observed false".to_string()],
            warnings: Vec::new(),
            scenarios: vec![ScenarioResult {
                scenario_id: "broken".to_string(),
                risk_level: Severity::Critical,
                passed: false,
                mismatches: vec!["`modified`: expected true, observed false".to_string()],
                error: None,
                observed: Default::default(),
            }],
        };
        SystematicValidationReport::new(vec![result], at.parse().expect("ts"))
    }

    #[test]
    fn failed_scenarios_become_events() {
        let events = feedback_events(&failing_report("2026-06-01T00:00:00Z"));
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].pattern_id().as_deref(), Some("system-mechanism-repair"));
        assert_eq!(events[0].severity, Severity::Critical);
        assert_eq!(events[0].evidence.len(), 1);
    }

    #[test]
    fn repeated_regressions_raise_pattern_frequency() {
        let dir = tempfile::tempdir().expect("tempdir");
        let events_dir = dir.path().join("events");
        let log = dir.path().join("logs/validation.jsonl");
        record_feedback(&failing_report("2026-06-01T00:00:00Z"), "run-1", &events_dir, &log)
            .expect("feedback");
        let outcome =
            record_feedback(&failing_report("2026-06-02T00:00:00Z"), "run-2", &events_dir, &log)
                .expect("feedback");
        assert_eq!(outcome.events_written, 1);

        let store = PatternStore::from_events_dir(&events_dir);
        let pattern = store.get("system-mechanism-repair").expect("pattern");
        assert_eq!(pattern.frequency, 2);

        let records: Vec<ValidationLogRecord> = read_records_from_path(&log).expect("log");
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].overall_status, ValidationStatus::Fail);
    }
}
