//! Mechanism validator.
//!
//! Runs every scenario of every catalog mechanism through the handler its
//! `implementationRef` resolves to. The validator only compares observed
//! facts with expected ones; it knows nothing about any particular
//! mechanism.

use crate::catalog::{MechanismCatalog, MechanismError, PreventionMechanism, TestScenario};
use crate::registry::{HandlerRegistry, MechanismHandler, Observation};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::any::Any;
use std::fmt::{Display, Formatter};
use std::panic::{AssertUnwindSafe, catch_unwind};
use tracing::{debug, info, warn};
use warden_core::Severity;

const FLOAT_TOLERANCE: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ValidationStatus {
    Pass,
    Warning,
    Fail,
    /// The mechanism could not be run at all.
    Error,
}

impl ValidationStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pass => "pass",
            Self::Warning => "warning",
            Self::Fail => "fail",
            Self::Error => "error",
        }
    }
}

impl Display for ValidationStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScenarioResult {
    pub scenario_id: String,
    pub risk_level: Severity,
    pub passed: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mismatches: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub observed: Observation,
}

impl ScenarioResult {
    /// One-line reason a failed scenario failed.
    pub fn failure_message(&self) -> Option<String> {
        if self.passed {
            return None;
        }
        let reason = match &self.error {
            Some(error) => error.clone(),
            None => self.mismatches.join("; "),
        };
        Some(format!("scenario `{}`: {reason}", self.scenario_id))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResult {
    pub mechanism_id: String,
    pub implementation_ref: String,
    pub criticality: Severity,
    pub status: ValidationStatus,
    pub tests_run: usize,
    pub tests_passed: usize,
    pub tests_failed: usize,
    pub evidence: Vec<String>,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    #[serde(default)]
    pub scenarios: Vec<ScenarioResult>,
}

impl ValidationResult {
    fn unresolved(mechanism: &PreventionMechanism) -> Self {
        Self {
            mechanism_id: mechanism.id.clone(),
            implementation_ref: mechanism.implementation_ref.clone(),
            criticality: mechanism.criticality,
            status: ValidationStatus::Error,
            tests_run: 0,
            tests_passed: 0,
            tests_failed: 0,
            evidence: Vec::new(),
            errors: vec![format!(
                "implementation `{}` is not registered",
                mechanism.implementation_ref
            )],
            warnings: Vec::new(),
            scenarios: Vec::new(),
        }
    }

    fn from_scenarios(mechanism: &PreventionMechanism, scenarios: Vec<ScenarioResult>) -> Self {
        let mut evidence = Vec::new();
        let mut errors = Vec::new();
        let mut warnings = Vec::new();
        for scenario in &scenarios {
            match scenario.failure_message() {
                None => evidence.push(format!("scenario `{}` passed", scenario.scenario_id)),
                Some(message) if scenario.risk_level == Severity::Critical => errors.push(message),
                Some(message) => warnings.push(message),
            }
        }
        let tests_passed = scenarios.iter().filter(|scenario| scenario.passed).count();
        let status = if !errors.is_empty() {
            ValidationStatus::Fail
        } else if !warnings.is_empty() {
            ValidationStatus::Warning
        } else {
            ValidationStatus::Pass
        };
        Self {
            mechanism_id: mechanism.id.clone(),
            implementation_ref: mechanism.implementation_ref.clone(),
            criticality: mechanism.criticality,
            status,
            tests_run: scenarios.len(),
            tests_passed,
            tests_failed: scenarios.len() - tests_passed,
            evidence,
            errors,
            warnings,
            scenarios,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationSummary {
    pub mechanisms: usize,
    pub passed: usize,
    pub warnings: usize,
    pub failed: usize,
    pub errored: usize,
    pub tests_run: usize,
    pub tests_passed: usize,
    pub tests_failed: usize,
}

impl ValidationSummary {
    fn from_results(results: &[ValidationResult]) -> Self {
        let count = |status: ValidationStatus| {
            results
                .iter()
                .filter(|result| result.status == status)
                .count()
        };
        Self {
            mechanisms: results.len(),
            passed: count(ValidationStatus::Pass),
            warnings: count(ValidationStatus::Warning),
            failed: count(ValidationStatus::Fail),
            errored: count(ValidationStatus::Error),
            tests_run: results.iter().map(|result| result.tests_run).sum(),
            tests_passed: results.iter().map(|result| result.tests_passed).sum(),
            tests_failed: results.iter().map(|result| result.tests_failed).sum(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystematicValidationReport {
    pub overall_status: ValidationStatus,
    pub summary: ValidationSummary,
    pub results: Vec<ValidationResult>,
    pub generated_at: DateTime<Utc>,
}

impl SystematicValidationReport {
    pub fn new(results: Vec<ValidationResult>, generated_at: DateTime<Utc>) -> Self {
        Self {
            overall_status: rollup(&results),
            summary: ValidationSummary::from_results(&results),
            results,
            generated_at,
        }
    }

    pub fn is_failing(&self) -> bool {
        self.overall_status == ValidationStatus::Fail
    }

    /// `[validate-mechanisms] PASS (6 mechanism(s), 11/11 scenario(s) passed)`.
    pub fn summary_line(&self) -> String {
        format!(
            "[validate-mechanisms] {} ({} mechanism(s), {}/{} scenario(s) passed)",
            self.overall_status.as_str().to_ascii_uppercase(),
            self.summary.mechanisms,
            self.summary.tests_passed,
            self.summary.tests_run
        )
    }
}

/// `fail` when a critical mechanism is not passing, `warning` when any is not.
pub fn rollup(results: &[ValidationResult]) -> ValidationStatus {
    let not_passing = |result: &&ValidationResult| result.status != ValidationStatus::Pass;
    if results
        .iter()
        .filter(not_passing)
        .any(|result| result.criticality == Severity::Critical)
    {
        ValidationStatus::Fail
    } else if results.iter().any(|result| not_passing(&result)) {
        ValidationStatus::Warning
    } else {
        ValidationStatus::Pass
    }
}

/// Keys of `expected` that `observed` lacks or disagrees on.
pub fn compare_outcome(expected: &Map<String, Value>, observed: &Observation) -> Vec<String> {
    expected
        .iter()
        .filter_map(|(key, want)| match observed.get(key) {
            None => Some(format!("`{key}` not observed")),
            Some(got) if !values_match(want, got) => {
                Some(format!("`{key}`: expected {want}, observed {got}"))
            }
            Some(_) => None,
        })
        .collect()
}

/// Structural equality; numbers compare by value so `1` matches `1.0`.
fn values_match(expected: &Value, observed: &Value) -> bool {
    match (expected, observed) {
        (Value::Number(a), Value::Number(b)) => match (a.as_f64(), b.as_f64()) {
            (Some(a), Some(b)) => (a - b).abs() <= FLOAT_TOLERANCE,
            _ => a == b,
        },
        (Value::Array(a), Value::Array(b)) => {
            a.len() == b.len() && a.iter().zip(b).all(|(a, b)| values_match(a, b))
        }
        (Value::Object(a), Value::Object(b)) => {
            a.len() == b.len()
                && a
                    .iter()
                    .all(|(key, a)| b.get(key).is_some_and(|b| values_match(a, b)))
        }
        _ => expected == observed,
    }
}

#[derive(Debug, Clone)]
pub struct MechanismValidator {
    catalog: MechanismCatalog,
    registry: HandlerRegistry,
}

impl MechanismValidator {
    pub fn new(catalog: MechanismCatalog, registry: HandlerRegistry) -> Self {
        Self { catalog, registry }
    }

    pub fn catalog(&self) -> &MechanismCatalog {
        &self.catalog
    }

    pub fn validate_all(&self) -> SystematicValidationReport {
        let results: Vec<ValidationResult> = self
            .catalog
            .mechanisms()
            .iter()
            .map(|mechanism| self.validate(mechanism))
            .collect();
        let report = SystematicValidationReport::new(results, Utc::now());
        info!(
            status = %report.overall_status,
            mechanisms = report.summary.mechanisms,
            tests_run = report.summary.tests_run,
            tests_failed = report.summary.tests_failed,
            "mechanism validation complete"
        );
        report
    }

    pub fn validate(&self, mechanism: &PreventionMechanism) -> ValidationResult {
        let Some(handler) = self.registry.resolve(&mechanism.implementation_ref) else {
            warn!(
                mechanism = %mechanism.id,
                implementation = %mechanism.implementation_ref,
                "mechanism implementation not registered"
            );
            return ValidationResult::unresolved(mechanism);
        };
        let scenarios = mechanism
            .scenarios
            .iter()
            .map(|scenario| run_scenario(handler, scenario))
            .collect();
        ValidationResult::from_scenarios(mechanism, scenarios)
    }
}

/// Run a handler with panics turned into execution errors, so one broken
/// handler cannot end the whole validation run.
fn run_isolated(handler: &dyn MechanismHandler, fixture: &Value) -> Result<Observation, MechanismError> {
    catch_unwind(AssertUnwindSafe(|| handler.run(fixture))).unwrap_or_else(|payload| {
        Err(MechanismError::Execution(format!(
            "handler panicked: {}",
            panic_message(payload.as_ref())
        )))
    })
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(text) = payload.downcast_ref::<&str>() {
        return text;
    }
    payload
        .downcast_ref::<String>()
        .map_or("non-string panic payload", String::as_str)
}

fn run_scenario(handler: &dyn MechanismHandler, scenario: &TestScenario) -> ScenarioResult {
    let (observed, error) = match run_isolated(handler, &scenario.fixture) {
        Ok(observed) => (observed, None),
        Err(err) => (Observation::new(), Some(err.to_string())),
    };
    let mismatches = if error.is_none() {
        compare_outcome(&scenario.expected_outcome, &observed)
    } else {
        Vec::new()
    };
    let passed = error.is_none() && mismatches.is_empty();
    debug!(scenario = %scenario.id, passed, "scenario evaluated");
    ScenarioResult {
        scenario_id: scenario.id.clone(),
        risk_level: scenario.risk_level,
        passed,
        mismatches,
        error,
        observed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::observation;
    use serde_json::json;
    use std::sync::Arc;

    /// Reports `value` from its fixture back as `value`, or fails on `"boom"`.
    struct Mirror;

    impl MechanismHandler for Mirror {
        fn run(&self, fixture: &Value) -> Result<Observation, MechanismError> {
            if fixture == &json!("boom") {
                return Err(MechanismError::Execution("boom".to_string()));
            }
            if fixture == &json!("panic") {
                panic!("mirror cannot reflect a panic");
            }
            Ok(observation([("value", fixture.clone())]))
        }
    }

    fn scenario(id: &str, fixture: Value, expected: Value, risk: Severity) -> TestScenario {
        TestScenario {
            id: id.to_string(),
            description: String::new(),
            fixture,
            expected_outcome: expected.as_object().cloned().unwrap_or_default(),
            risk_level: risk,
        }
    }

    fn mechanism(id: &str, reference: &str, criticality: Severity, scenarios: Vec<TestScenario>) -> PreventionMechanism {
        PreventionMechanism {
            id: id.to_string(),
            name: id.to_string(),
            description: String::new(),
            implementation_ref: reference.to_string(),
            criticality,
            scenarios,
        }
    }

    fn validator(mechanisms: Vec<PreventionMechanism>) -> MechanismValidator {
        let mut registry = HandlerRegistry::new();
        registry.register("test.mirror", Arc::new(Mirror));
        MechanismValidator::new(MechanismCatalog::new(mechanisms).expect("catalog"), registry)
    }

    #[test]
    fn mechanism_without_scenarios_passes_with_zero_tests() {
        let report = validator(vec![mechanism("empty", "test.mirror", Severity::Critical, vec![])])
            .validate_all();
        let result = &report.results[0];
        assert_eq!(result.status, ValidationStatus::Pass);
        assert_eq!(result.tests_run, 0);
        assert_eq!(report.overall_status, ValidationStatus::Pass);
    }

    #[test]
    fn missing_implementation_is_an_error_with_zero_tests() {
        let scenarios = vec![scenario("s", json!(1), json!({"value": 1}), Severity::Low)];
        let report = validator(vec![mechanism("ghost", "test.ghost", Severity::Low, scenarios)])
            .validate_all();
        let result = &report.results[0];
        assert_eq!(result.status, ValidationStatus::Error);
        assert_eq!(result.tests_run, 0);
        assert_eq!(result.errors, vec!["implementation `test.ghost` is not registered".to_string()]);
        // Only critical mechanisms fail the rollup.
        assert_eq!(report.overall_status, ValidationStatus::Warning);
    }

    #[test]
    fn scenario_risk_decides_error_or_warning() {
        let scenarios = vec![
            scenario("ok", json!(2), json!({"value": 2.0}), Severity::Critical),
            scenario("soft", json!(1), json!({"value": 3}), Severity::Medium),
        ];
        let result = validator(vec![]).validate(&mechanism("m", "test.mirror", Severity::High, scenarios));
        assert_eq!(result.status, ValidationStatus::Warning);
        assert_eq!((result.tests_run, result.tests_passed, result.tests_failed), (2, 1, 1));
        assert_eq!(result.warnings, vec!["scenario `soft`: `value`: expected 3, observed 1".to_string()]);

        let scenarios = vec![scenario("hard", json!("boom"), json!({}), Severity::Critical)];
        let result = validator(vec![]).validate(&mechanism("m", "test.mirror", Severity::High, scenarios));
        assert_eq!(result.status, ValidationStatus::Fail);
        assert_eq!(result.errors, vec!["scenario `hard`: mechanism execution failed: boom".to_string()]);
    }

    #[test]
    fn panicking_handler_fails_only_its_scenario() {
        let scenarios = vec![
            scenario("explodes", json!("panic"), json!({}), Severity::Critical),
            scenario("after", json!(4), json!({"value": 4}), Severity::Critical),
        ];
        let report = validator(vec![
            mechanism("m", "test.mirror", Severity::High, scenarios),
            mechanism("next", "test.mirror", Severity::Low, vec![]),
        ])
        .validate_all();
        let result = &report.results[0];
        assert_eq!((result.tests_run, result.tests_passed), (2, 1));
        assert_eq!(
            result.errors,
            vec![
                "scenario `explodes`: mechanism execution failed: handler panicked: mirror cannot reflect a panic"
                    .to_string()
            ]
        );
        assert_eq!(report.results[1].status, ValidationStatus::Pass);
    }

    #[test]
    fn critical_mechanism_failure_fails_the_rollup() {
        let failing = vec![scenario("s", json!(1), json!({"missing": true}), Severity::Low)];
        let report = validator(vec![
            mechanism("fine", "test.mirror", Severity::Low, vec![]),
            mechanism("core", "test.mirror", Severity::Critical, failing),
        ])
        .validate_all();
        assert_eq!(report.results[1].status, ValidationStatus::Warning);
        assert_eq!(report.overall_status, ValidationStatus::Fail);
        assert!(report.is_failing());
        assert_eq!(report.summary.warnings, 1);
        insta::assert_snapshot!(
            report.summary_line(),
            @"[validate-mechanisms] FAIL (2 mechanism(s), 0/1 scenario(s) passed)"
        );
    }

    #[test]
    fn comparison_is_structural() {
        let observed = observation([("list", json!([1, 2.0])), ("map", json!({"a": 1}))]);
        let expected = json!({"list": [1.0, 2], "map": {"a": 1.0}});
        assert!(compare_outcome(expected.as_object().expect("object"), &observed).is_empty());
        let expected = json!({"map": {"a": 1, "b": 2}});
        assert_eq!(compare_outcome(expected.as_object().expect("object"), &observed).len(), 1);
    }
}
