//! Alerts and the monitoring result they roll up into.

use crate::prevention::{PreventionRecord, PreventionStep};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use warden_core::{Severity, TimeToViolation, round_confidence};

/// Alerts are emitted only above this confidence.
pub const ALERT_THRESHOLD: f64 = 0.3;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PredictiveAlert {
    pub id: String,
    pub pattern_id: String,
    pub risk_level: Severity,
    pub confidence: f64,
    pub evidence: Vec<String>,
    /// Ids of the conditions that held; the stable part of the evidence.
    #[serde(default)]
    pub matched_conditions: Vec<String>,
    pub time_to_violation: TimeToViolation,
    pub prevention_actions: Vec<PreventionStep>,
    pub auto_preventable: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MonitoringStatus {
    Safe,
    Warning,
    Danger,
    Critical,
}

impl MonitoringStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Safe => "safe",
            Self::Warning => "warning",
            Self::Danger => "danger",
            Self::Critical => "critical",
        }
    }

    pub fn is_failing(self) -> bool {
        self == Self::Critical
    }

    pub fn classify(alerts: &[PredictiveAlert], overall_risk_score: f64) -> Self {
        if overall_risk_score >= 0.9
            || alerts
                .iter()
                .any(|alert| alert.risk_level == Severity::Critical)
        {
            Self::Critical
        } else if overall_risk_score >= 0.7 {
            Self::Danger
        } else if overall_risk_score >= 0.3 {
            Self::Warning
        } else {
            Self::Safe
        }
    }
}

impl Display for MonitoringStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Confidence-weighted mean of alert confidences: `Σc² / Σc`, `0` with no alerts.
pub fn overall_risk_score(alerts: &[PredictiveAlert]) -> f64 {
    let total: f64 = alerts.iter().map(|alert| alert.confidence).sum();
    if total <= 0.0 {
        return 0.0;
    }
    let weighted: f64 = alerts
        .iter()
        .map(|alert| alert.confidence * alert.confidence)
        .sum();
    round_confidence(weighted / total)
}

/// A probe that could not be evaluated and therefore counted as unsatisfied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProbeFailure {
    pub template_id: String,
    pub condition_id: String,
    pub probe: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitoringResult {
    pub status: MonitoringStatus,
    pub overall_risk_score: f64,
    pub alerts: Vec<PredictiveAlert>,
    #[serde(default)]
    pub preventions: Vec<PreventionRecord>,
    #[serde(default)]
    pub probe_errors: Vec<ProbeFailure>,
    pub evaluated_at: DateTime<Utc>,
}

impl MonitoringResult {
    pub fn new(
        alerts: Vec<PredictiveAlert>,
        probe_errors: Vec<ProbeFailure>,
        evaluated_at: DateTime<Utc>,
    ) -> Self {
        let overall_risk_score = overall_risk_score(&alerts);
        Self {
            status: MonitoringStatus::classify(&alerts, overall_risk_score),
            overall_risk_score,
            alerts,
            preventions: Vec::new(),
            probe_errors,
            evaluated_at,
        }
    }

    /// `[monitor] WARNING (2 alert(s), risk 0.72)`.
    pub fn summary_line(&self) -> String {
        format!(
            "[monitor] {} ({} alert(s), risk {:.2})",
            self.status.as_str().to_ascii_uppercase(),
            self.alerts.len(),
            self.overall_risk_score
        )
    }
}
