//! Prevention mechanisms and their synthetic test scenarios.
//!
//! The catalog is data: each row names the handler that implements the
//! mechanism (`implementationRef`) and the scenarios to run against it.
//! Whether a reference resolves is decided by the validator, not here.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;
use warden_core::Severity;

const BUILTIN_CATALOG: &str = include_str!("../catalog/mechanisms.json");

#[derive(Debug, thiserror::Error)]
pub enum MechanismError {
    #[error("failed to read mechanism catalog {path}: {source}")]
    CatalogRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse mechanism catalog {origin}: {message}")]
    CatalogParse { origin: String, message: String },

    #[error("duplicate mechanism id `{0}`")]
    DuplicateMechanism(String),

    #[error("mechanism `{mechanism}`: duplicate scenario id `{scenario}`")]
    DuplicateScenario { mechanism: String, scenario: String },

    #[error("mechanism `{id}`: {message}")]
    InvalidMechanism { id: String, message: String },

    #[error("implementation `{0}` is not registered")]
    Unresolved(String),

    #[error("invalid fixture: {0}")]
    Fixture(String),

    #[error("mechanism execution failed: {0}")]
    Execution(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestScenario {
    pub id: String,
    #[serde(default)]
    pub description: String,
    /// Handler-specific input.
    #[serde(default)]
    pub fixture: Value,
    /// Facts the handler must observe; every key must match.
    #[serde(default)]
    pub expected_outcome: Map<String, Value>,
    #[serde(default)]
    pub risk_level: Severity,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreventionMechanism {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub implementation_ref: String,
    #[serde(default)]
    pub criticality: Severity,
    #[serde(default)]
    pub scenarios: Vec<TestScenario>,
}

impl PreventionMechanism {
    fn validate(&self) -> Result<(), MechanismError> {
        if self.id.trim().is_empty() {
            return Err(MechanismError::InvalidMechanism {
                id: self.id.clone(),
                message: "id is empty".to_string(),
            });
        }
        let mut seen = BTreeSet::new();
        for scenario in &self.scenarios {
            if !seen.insert(scenario.id.as_str()) {
                return Err(MechanismError::DuplicateScenario {
                    mechanism: self.id.clone(),
                    scenario: scenario.id.clone(),
                });
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MechanismCatalog {
    mechanisms: Vec<PreventionMechanism>,
}

impl MechanismCatalog {
    pub fn new(mechanisms: Vec<PreventionMechanism>) -> Result<Self, MechanismError> {
        let mut seen = BTreeSet::new();
        for mechanism in &mechanisms {
            if !seen.insert(mechanism.id.clone()) {
                return Err(MechanismError::DuplicateMechanism(mechanism.id.clone()));
            }
            mechanism.validate()?;
        }
        Ok(Self { mechanisms })
    }

    pub fn builtin() -> Result<Self, MechanismError> {
        Self::from_json_str(BUILTIN_CATALOG, "built-in mechanism catalog")
    }

    pub fn from_json_str(text: &str, origin: &str) -> Result<Self, MechanismError> {
        let mechanisms: Vec<PreventionMechanism> =
            serde_json::from_str(text).map_err(|e| MechanismError::CatalogParse {
                origin: origin.to_string(),
                message: e.to_string(),
            })?;
        Self::new(mechanisms)
    }

    /// The override file when given, else the built-in catalog.
    pub fn load(path: Option<&Path>) -> Result<Self, MechanismError> {
        let Some(path) = path else {
            return Self::builtin();
        };
        let text = fs::read_to_string(path).map_err(|source| MechanismError::CatalogRead {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_str(&text, &path.display().to_string())
    }

    pub fn mechanisms(&self) -> &[PreventionMechanism] {
        &self.mechanisms
    }

    pub fn get(&self, id: &str) -> Option<&PreventionMechanism> {
        self.mechanisms.iter().find(|mechanism| mechanism.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_catalog_parses() {
        let catalog = MechanismCatalog::builtin().expect("built-in catalog");
        let ids: Vec<&str> = catalog
            .mechanisms()
            .iter()
            .map(|mechanism| mechanism.implementation_ref.as_str())
            .collect();
        assert_eq!(
            ids,
            vec![
                "blueprint.rule-evaluator",
                "blueprint.repair-applier",
                "blueprint.atomic-rollback",
                "patterns.store",
                "predict.monitor",
                "predict.prevention-idempotence",
            ]
        );
        assert!(catalog
            .mechanisms()
            .iter()
            .all(|mechanism| !mechanism.scenarios.is_empty()));
    }

    #[test]
    fn duplicate_scenarios_are_rejected() {
        let text = r#"[{"id": "m", "implementationRef": "x", "scenarios": [{"id": "s"}, {"id": "s"}]}]"#;
        assert!(matches!(
            MechanismCatalog::from_json_str(text, "test"),
            Err(MechanismError::DuplicateScenario { .. })
        ));
    }

    #[test]
    fn defaults_fill_optional_fields() {
        let text = r#"[{"id": "m", "implementationRef": "x"}]"#;
        let catalog = MechanismCatalog::from_json_str(text, "test").expect("catalog");
        let mechanism = catalog.get("m").expect("mechanism");
        assert_eq!(mechanism.criticality, Severity::Medium);
        assert!(mechanism.scenarios.is_empty());
    }
}
