//! Predictive monitor: scores every catalog template against live signals.
//!
//! Satisfied triggers count three tenths, risk indicators two, predictive
//! signals one. The count is capped at ten tenths and scaled by the
//! template's base confidence, so boundaries like `0.9` are exact.

use crate::alert::{
    ALERT_THRESHOLD, MonitoringResult, MonitoringStatus, PredictiveAlert, ProbeFailure,
};
use crate::catalog::{Catalog, CompliancePattern, Condition};
use crate::prevention::PreventionExecutor;
use crate::probe::ProbeContext;
use serde_json::json;
use tracing::{debug, info};
use warden_core::{
    Severity, TelemetryEvent, TelemetrySink, TimeToViolation, emit, round_confidence, tenths,
};

const TRIGGER_TENTHS: u32 = 3;
const RISK_INDICATOR_TENTHS: u32 = 2;
const PREDICTIVE_SIGNAL_TENTHS: u32 = 1;
const MAX_TENTHS: u32 = 10;

/// Auto-prevention needs both a confident alert and a template that
/// historically prevents well.
const AUTO_PREVENT_CONFIDENCE: f64 = 0.8;
const AUTO_PREVENT_SUCCESS: f64 = 0.9;

#[derive(Debug, Clone)]
pub struct PredictiveMonitor {
    catalog: Catalog,
}

#[derive(Debug, Default)]
struct TemplateScore {
    tenths: u32,
    evidence: Vec<String>,
    matched: Vec<String>,
    failures: Vec<ProbeFailure>,
}

impl PredictiveMonitor {
    pub fn new(catalog: Catalog) -> Self {
        Self { catalog }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Evaluate every template. Never runs prevention.
    pub fn monitor(&self, ctx: &ProbeContext<'_>) -> MonitoringResult {
        let mut alerts = Vec::new();
        let mut probe_errors = Vec::new();
        for template in self.catalog.templates() {
            let score = score_template(template, ctx);
            probe_errors.extend(score.failures);
            let raw = tenths(score.tenths.min(MAX_TENTHS));
            let confidence = round_confidence(raw * template.base_confidence);
            debug!(template = %template.id, tenths = score.tenths, confidence, "template scored");
            if confidence <= ALERT_THRESHOLD {
                continue;
            }
            alerts.push(PredictiveAlert {
                id: format!("{}@{}", template.id, ctx.now.format("%Y%m%dT%H%M%SZ")),
                pattern_id: template.id.clone(),
                risk_level: Severity::from_confidence(confidence),
                confidence,
                evidence: score.evidence,
                matched_conditions: score.matched,
                time_to_violation: TimeToViolation::from_confidence(confidence),
                prevention_actions: template.prevention_actions.clone(),
                auto_preventable: confidence > AUTO_PREVENT_CONFIDENCE
                    && template.historical_prevention_success > AUTO_PREVENT_SUCCESS,
            });
        }
        MonitoringResult::new(alerts, probe_errors, ctx.now)
    }

    /// Evaluate, then hand critical auto-preventable alerts to `executor`.
    pub fn run(
        &self,
        ctx: &ProbeContext<'_>,
        executor: &PreventionExecutor,
        telemetry: &dyn TelemetrySink,
    ) -> MonitoringResult {
        let mut result = self.monitor(ctx);
        for alert in &result.alerts {
            emit(
                telemetry,
                TelemetryEvent::new(
                    "alert.raised",
                    alert.risk_level,
                    json!({
                        "alertId": alert.id,
                        "patternId": alert.pattern_id,
                        "confidence": alert.confidence,
                        "autoPreventable": alert.auto_preventable,
                    }),
                ),
            );
        }

        let preventions: Vec<_> = result
            .alerts
            .iter()
            .filter(|alert| alert.risk_level == Severity::Critical && alert.auto_preventable)
            .flat_map(|alert| executor.execute(alert))
            .collect();
        result.preventions = preventions;

        info!(
            status = %result.status,
            alerts = result.alerts.len(),
            risk = result.overall_risk_score,
            preventions = result.preventions.len(),
            "monitoring complete"
        );
        emit(
            telemetry,
            TelemetryEvent::new(
                "monitor.completed",
                match result.status {
                    MonitoringStatus::Critical => Severity::Critical,
                    MonitoringStatus::Danger => Severity::High,
                    MonitoringStatus::Warning => Severity::Medium,
                    MonitoringStatus::Safe => Severity::Low,
                },
                json!({
                    "status": result.status,
                    "overallRiskScore": result.overall_risk_score,
                    "alerts": result.alerts.len(),
                    "probeErrors": result.probe_errors.len(),
                }),
            ),
        );
        result
    }
}

fn score_template(template: &CompliancePattern, ctx: &ProbeContext<'_>) -> TemplateScore {
    let mut score = TemplateScore::default();
    let groups: [(&[Condition], u32); 3] = [
        (&template.trigger_conditions, TRIGGER_TENTHS),
        (&template.risk_indicators, RISK_INDICATOR_TENTHS),
        (&template.predictive_signals, PREDICTIVE_SIGNAL_TENTHS),
    ];
    for (conditions, weight) in groups {
        for condition in conditions {
            match condition.probe.evaluate(ctx) {
                Ok(outcome) if outcome.satisfied => {
                    score.tenths += weight;
                    let label = if condition.description.is_empty() {
                        condition.id.as_str()
                    } else {
                        condition.description.as_str()
                    };
                    score.evidence.push(format!("{label}: {}", outcome.detail));
                    score.matched.push(condition.id.clone());
                }
                Ok(_) => {}
                Err(err) => {
                    debug!(template = %template.id, condition = %condition.id, error = %err, "probe failed");
                    score.failures.push(ProbeFailure {
                        template_id: template.id.clone(),
                        condition_id: condition.id.clone(),
                        probe: condition.probe.kind().to_string(),
                        message: err.to_string(),
                    });
                }
            }
        }
    }
    score
}
