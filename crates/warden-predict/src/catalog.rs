//! Compliance-pattern templates: known failure modes, the probes that
//! detect them, and the prevention actions that head them off.
//!
//! The catalog is an immutable value built once at start-up (the built-in
//! JSON below, or an override file) and validated before any monitoring
//! happens.

use crate::prevention::PreventionStep;
use crate::probe::{Probe, ProbeError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

const BUILTIN_CATALOG: &str = include_str!("../catalog/compliance_patterns.json");

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("failed to read catalog {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse catalog {origin}: {message}")]
    Parse { origin: String, message: String },

    #[error("duplicate template id `{0}`")]
    DuplicateTemplate(String),

    #[error("template `{id}`: {message}")]
    InvalidTemplate { id: String, message: String },

    #[error("template `{template}` condition `{condition}`: {source}")]
    InvalidCondition {
        template: String,
        condition: String,
        #[source]
        source: ProbeError,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    pub id: String,
    #[serde(default)]
    pub description: String,
    #[serde(flatten)]
    pub probe: Probe,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompliancePattern {
    pub id: String,
    #[serde(rename = "type")]
    pub pattern_type: String,
    #[serde(default)]
    pub description: String,
    pub trigger_conditions: Vec<Condition>,
    #[serde(default)]
    pub risk_indicators: Vec<Condition>,
    #[serde(default)]
    pub predictive_signals: Vec<Condition>,
    #[serde(default)]
    pub prevention_actions: Vec<PreventionStep>,
    pub base_confidence: f64,
    pub historical_prevention_success: f64,
}

impl CompliancePattern {
    pub fn conditions(&self) -> impl Iterator<Item = &Condition> {
        self.trigger_conditions
            .iter()
            .chain(&self.risk_indicators)
            .chain(&self.predictive_signals)
    }

    fn validate(&self) -> Result<(), CatalogError> {
        let invalid = |message: &str| CatalogError::InvalidTemplate {
            id: self.id.clone(),
            message: message.to_string(),
        };
        if self.id.trim().is_empty() {
            return Err(invalid("id is empty"));
        }
        if !(self.base_confidence > 0.0 && self.base_confidence <= 1.0) {
            return Err(invalid("baseConfidence must be within (0, 1]"));
        }
        if !(0.0..=1.0).contains(&self.historical_prevention_success) {
            return Err(invalid("historicalPreventionSuccess must be within [0, 1]"));
        }
        if self.trigger_conditions.is_empty() {
            return Err(invalid("at least one trigger condition is required"));
        }
        let mut condition_ids = BTreeSet::new();
        for condition in self.conditions() {
            if !condition_ids.insert(condition.id.as_str()) {
                return Err(invalid(&format!("duplicate condition `{}`", condition.id)));
            }
            condition
                .probe
                .validate()
                .map_err(|source| CatalogError::InvalidCondition {
                    template: self.id.clone(),
                    condition: condition.id.clone(),
                    source,
                })?;
        }
        let mut step_ids = BTreeSet::new();
        for step in &self.prevention_actions {
            if !step_ids.insert(step.id.as_str()) {
                return Err(invalid(&format!("duplicate prevention action `{}`", step.id)));
            }
            step.action.validate().map_err(|message| invalid(&message))?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Catalog {
    templates: Vec<CompliancePattern>,
}

impl Catalog {
    pub fn new(templates: Vec<CompliancePattern>) -> Result<Self, CatalogError> {
        let mut seen = BTreeSet::new();
        for template in &templates {
            if !seen.insert(template.id.clone()) {
                return Err(CatalogError::DuplicateTemplate(template.id.clone()));
            }
            template.validate()?;
        }
        Ok(Self { templates })
    }

    pub fn builtin() -> Result<Self, CatalogError> {
        Self::from_json_str(BUILTIN_CATALOG, "built-in catalog")
    }

    pub fn from_json_str(text: &str, origin: &str) -> Result<Self, CatalogError> {
        let templates: Vec<CompliancePattern> =
            serde_json::from_str(text).map_err(|e| CatalogError::Parse {
                origin: origin.to_string(),
                message: e.to_string(),
            })?;
        Self::new(templates)
    }

    /// The override file when given, else the built-in catalog.
    pub fn load(path: Option<&Path>) -> Result<Self, CatalogError> {
        let Some(path) = path else {
            return Self::builtin();
        };
        let text = fs::read_to_string(path).map_err(|source| CatalogError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_str(&text, &path.display().to_string())
    }

    pub fn templates(&self) -> &[CompliancePattern] {
        &self.templates
    }

    pub fn get(&self, id: &str) -> Option<&CompliancePattern> {
        self.templates.iter().find(|template| template.id == id)
    }

    /// Documents any probe needs modification times for.
    pub fn documents(&self) -> Vec<String> {
        let documents: BTreeSet<String> = self
            .templates
            .iter()
            .flat_map(CompliancePattern::conditions)
            .filter_map(|condition| condition.probe.document())
            .map(str::to_string)
            .collect();
        documents.into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prevention::PreventionAction;

    #[test]
    fn builtin_catalog_is_valid() {
        let catalog = Catalog::builtin().expect("built-in catalog validates");
        assert_eq!(catalog.templates().len(), 6);
        assert_eq!(catalog.documents(), vec!["README.md".to_string()]);
        let drift = catalog.get("framework-core-drift").expect("template");
        assert_eq!(drift.trigger_conditions.len(), 2);
        assert_eq!(
            drift.prevention_actions[0].action,
            PreventionAction::RepairArtifacts
        );
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let catalog = Catalog::builtin().expect("catalog");
        let mut templates = catalog.templates().to_vec();
        templates.push(templates[0].clone());
        assert!(matches!(
            Catalog::new(templates),
            Err(CatalogError::DuplicateTemplate(id)) if id == "framework-core-drift"
        ));
    }

    #[test]
    fn invalid_probe_is_a_catalog_error() {
        let text = r#"[{
            "id": "t", "type": "x",
            "triggerConditions": [{"id": "c", "probe": "file-modified", "glob": "a/["}],
            "baseConfidence": 0.5, "historicalPreventionSuccess": 0.5
        }]"#;
        assert!(matches!(
            Catalog::from_json_str(text, "test"),
            Err(CatalogError::InvalidCondition { ref condition, .. }) if condition == "c"
        ));
    }

    #[test]
    fn condition_ids_are_unique_across_sections() {
        let text = r#"[{
            "id": "t", "type": "x",
            "triggerConditions": [{"id": "staged", "probe": "staged-changes"}],
            "predictiveSignals": [{"id": "staged", "probe": "staged-changes"}],
            "baseConfidence": 0.5, "historicalPreventionSuccess": 0.5
        }]"#;
        assert!(matches!(
            Catalog::from_json_str(text, "test"),
            Err(CatalogError::InvalidTemplate { ref message, .. }) if message == "duplicate condition `staged`"
        ));
    }

    #[test]
    fn template_needs_a_trigger_and_sane_confidence() {
        let text = r#"[{"id": "t", "type": "x", "triggerConditions": [], "baseConfidence": 0.5, "historicalPreventionSuccess": 0.5}]"#;
        assert!(matches!(
            Catalog::from_json_str(text, "test"),
            Err(CatalogError::InvalidTemplate { .. })
        ));
        let text = r#"[{"id": "t", "type": "x", "triggerConditions": [{"id": "c", "probe": "staged-changes"}], "baseConfidence": 1.5, "historicalPreventionSuccess": 0.5}]"#;
        assert!(Catalog::from_json_str(text, "test").is_err());
    }

    #[test]
    fn override_file_replaces_builtin() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("catalog.json");
        fs::write(
            &path,
            r#"[{"id": "only", "type": "x", "triggerConditions": [{"id": "c", "probe": "staged-changes"}], "baseConfidence": 1.0, "historicalPreventionSuccess": 1.0}]"#,
        )
        .expect("write catalog");
        let catalog = Catalog::load(Some(&path)).expect("override loads");
        assert_eq!(catalog.templates().len(), 1);
        assert!(matches!(
            Catalog::load(Some(&dir.path().join("absent.json"))),
            Err(CatalogError::Read { .. })
        ));
    }
}
