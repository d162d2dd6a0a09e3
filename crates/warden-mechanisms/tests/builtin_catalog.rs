//! Integration tests: run the built-in mechanism catalog against the
//! built-in handlers and feed the results back into pattern learning.

use serde_json::json;
use warden_core::{FrameworkConfig, Severity};
use warden_mechanisms::{
    MechanismCatalog, MechanismValidator, PreventionMechanism, TestScenario, ValidationStatus,
    builtin_registry, record_feedback,
};
use warden_patterns::PatternStore;

fn validator(catalog: MechanismCatalog) -> MechanismValidator {
    MechanismValidator::new(catalog, builtin_registry(&FrameworkConfig::default()))
}

#[test]
fn builtin_catalog_passes_against_builtin_handlers() {
    let catalog = MechanismCatalog::builtin().expect("built-in catalog");
    let report = validator(catalog).validate_all();

    for result in &report.results {
        assert_eq!(
            result.status,
            ValidationStatus::Pass,
            "\n\nMechanism: {}\n\nErrors:\n{}\n\nWarnings:\n{}\n",
            result.mechanism_id,
            result.errors.join("\n"),
            result.warnings.join("\n"),
        );
        assert_eq!(result.tests_run, result.tests_passed);
    }
    assert_eq!(report.overall_status, ValidationStatus::Pass);
    assert_eq!(report.summary.mechanisms, 6);
    assert_eq!(report.summary.tests_failed, 0);
    assert!(!report.is_failing());
}

#[test]
fn broken_expectation_feeds_a_mechanism_pattern() {
    let mechanism = PreventionMechanism {
        id: "rule-evaluation".to_string(),
        name: "Blueprint rule evaluation".to_string(),
        description: String::new(),
        implementation_ref: "blueprint.rule-evaluator".to_string(),
        criticality: Severity::Critical,
        scenarios: vec![TestScenario {
            id: "wrong-score".to_string(),
            description: String::new(),
            fixture: json!({"yaml": "id: demo\n"}),
            expected_outcome: json!({"score": 100})
                .as_object()
                .cloned()
                .expect("object"),
            risk_level: Severity::Critical,
        }],
    };
    let catalog = MechanismCatalog::new(vec![mechanism]).expect("catalog");
    let report = validator(catalog).validate_all();
    assert_eq!(report.overall_status, ValidationStatus::Fail);

    let dir = tempfile::tempdir().expect("tempdir");
    let events_dir = dir.path().join("events");
    let log = dir.path().join("validation.jsonl");
    for run in ["run-1", "run-2"] {
        record_feedback(&report, run, &events_dir, &log).expect("feedback");
    }

    let store = PatternStore::from_events_dir(&events_dir);
    let pattern = store
        .get("system-mechanism-rule-evaluation")
        .expect("regression pattern");
    assert_eq!(pattern.frequency, 2);
    assert!(pattern.is_recurring());
}

#[test]
fn unregistered_reference_is_reported_not_raised() {
    let text = r#"[{"id": "ghost", "implementationRef": "nowhere.handler", "criticality": "low",
        "scenarios": [{"id": "s", "expectedOutcome": {"ok": true}}]}]"#;
    let catalog = MechanismCatalog::from_json_str(text, "test").expect("catalog");
    let report = validator(catalog).validate_all();
    let result = &report.results[0];
    assert_eq!(result.status, ValidationStatus::Error);
    assert_eq!(result.tests_run, 0);
    assert_eq!(report.overall_status, ValidationStatus::Warning);
}
