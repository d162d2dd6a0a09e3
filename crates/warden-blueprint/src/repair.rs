//! Repair planning: one auto-fixable issue becomes at most one action.
//!
//! The mapping from rule to fix is an explicit handler table. The planner
//! refuses to start when a repairable rule has no handler, so a gap in the
//! table surfaces as a configuration error instead of a silently skipped fix.

use crate::artifact::{Artifact, KeyPath};
use crate::issue::{Issue, RuleId};
use crate::report::HealthReport;
use crate::rules::{VersionSource, normalize_version, observability_events_path, version_source};
use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;
use warden_core::FrameworkConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RepairOperation {
    Add,
    Update,
    Remove,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RepairTarget {
    Field,
    Header,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RepairRisk {
    Safe,
    Moderate,
    High,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepairAction {
    pub issue_id: String,
    pub operation: RepairOperation,
    pub target: RepairTarget,
    /// Dotted key path for field actions; the marker for header actions.
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_value: Option<Value>,
    pub risk_level: RepairRisk,
    pub requires_approval: bool,
    pub description: String,
}

impl RepairAction {
    fn field(issue: &Issue, path: &str, old_value: Option<&Value>, new_value: Value) -> Self {
        let operation = match old_value {
            None | Some(Value::Null) => RepairOperation::Add,
            Some(_) => RepairOperation::Update,
        };
        Self {
            issue_id: issue.id.clone(),
            operation,
            target: RepairTarget::Field,
            path: path.to_string(),
            old_value: old_value.filter(|value| !value.is_null()).cloned(),
            new_value: Some(new_value),
            risk_level: RepairRisk::Safe,
            requires_approval: false,
            description: String::new(),
        }
    }

    fn header(issue: &Issue, marker: &str, line: String) -> Self {
        Self {
            issue_id: issue.id.clone(),
            operation: RepairOperation::Add,
            target: RepairTarget::Header,
            path: marker.to_string(),
            old_value: None,
            description: format!("insert header annotation `{line}`"),
            new_value: Some(Value::String(line)),
            risk_level: RepairRisk::Safe,
            requires_approval: false,
        }
    }

    fn needs_approval(mut self) -> Self {
        self.risk_level = RepairRisk::Moderate;
        self.requires_approval = true;
        self
    }

    fn described(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    fn conflict_key(&self) -> (RepairTarget, String) {
        (self.target, self.path.clone())
    }
}

pub type RepairHandler = fn(&Issue, &Artifact, &FrameworkConfig) -> Option<RepairAction>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PlannerConfigError {
    #[error("repairable rule `{rule}` has no repair handler")]
    MissingHandler { rule: RuleId },

    #[error("rule `{rule}` is never auto-fixable but has a repair handler")]
    UnexpectedHandler { rule: RuleId },
}

/// Built-in handler table covering every repairable rule.
pub fn default_repair_handlers() -> BTreeMap<RuleId, RepairHandler> {
    let mut handlers: BTreeMap<RuleId, RepairHandler> = BTreeMap::new();
    handlers.insert(RuleId::MissingId, fix_missing_id);
    handlers.insert(RuleId::MissingName, fix_missing_name);
    handlers.insert(RuleId::MissingVersion, fix_missing_version);
    handlers.insert(RuleId::MissingObservability, fix_missing_observability);
    handlers.insert(RuleId::MissingErrorStates, fix_missing_error_states);
    handlers.insert(RuleId::MissingFrameworkAnnotation, fix_framework_annotation);
    handlers.insert(RuleId::MissingComplianceAnnotation, fix_compliance_annotation);
    handlers.insert(RuleId::InvalidVersionFormat, fix_version_format);
    handlers.insert(RuleId::InvalidContractEntry, fix_contract_entry);
    handlers
}

#[derive(Debug, Clone)]
pub struct RepairPlanner {
    handlers: BTreeMap<RuleId, RepairHandler>,
    framework: FrameworkConfig,
}

impl RepairPlanner {
    pub fn new(
        handlers: BTreeMap<RuleId, RepairHandler>,
        framework: FrameworkConfig,
    ) -> Result<Self, PlannerConfigError> {
        for rule in RuleId::ALL {
            match (rule.repairable(), handlers.contains_key(&rule)) {
                (true, false) => return Err(PlannerConfigError::MissingHandler { rule }),
                (false, true) => return Err(PlannerConfigError::UnexpectedHandler { rule }),
                _ => {}
            }
        }
        Ok(Self {
            handlers,
            framework,
        })
    }

    pub fn with_defaults(framework: FrameworkConfig) -> Result<Self, PlannerConfigError> {
        Self::new(default_repair_handlers(), framework)
    }

    pub fn plan(&self, issue: &Issue, artifact: &Artifact) -> Option<RepairAction> {
        if !issue.auto_fixable {
            return None;
        }
        let handler = self.handlers.get(&issue.rule)?;
        handler(issue, artifact, &self.framework)
    }

    /// Fill `report.actions`. A second action on an already-claimed target
    /// is dropped so one batch never writes the same path twice.
    pub fn plan_report(&self, mut report: HealthReport, artifact: &Artifact) -> HealthReport {
        let mut claimed = BTreeSet::new();
        let mut actions = Vec::new();
        for issue in &report.issues {
            let Some(action) = self.plan(issue, artifact) else {
                continue;
            };
            if !claimed.insert(action.conflict_key()) {
                debug!(issue_id = %issue.id, path = %action.path, "dropping conflicting repair action");
                continue;
            }
            actions.push(action);
        }
        report.actions = actions;
        report
    }
}

fn fix_missing_id(issue: &Issue, artifact: &Artifact, _: &FrameworkConfig) -> Option<RepairAction> {
    Some(
        RepairAction::field(issue, "id", None, Value::String(artifact.id.clone()))
            .described(format!("set `id` to `{}` from the file name", artifact.id)),
    )
}

fn fix_missing_name(
    issue: &Issue,
    artifact: &Artifact,
    _: &FrameworkConfig,
) -> Option<RepairAction> {
    let name = display_name(&artifact.id);
    Some(
        RepairAction::field(issue, "name", None, Value::String(name.clone()))
            .described(format!("set `name` to `{name}` derived from the id"))
            .needs_approval(),
    )
}

fn fix_missing_version(
    issue: &Issue,
    _: &Artifact,
    framework: &FrameworkConfig,
) -> Option<RepairAction> {
    Some(
        RepairAction::field(issue, "version", None, Value::String(framework.version.clone()))
            .described(format!("set `version` to `{}`", framework.version)),
    )
}

fn fix_missing_observability(
    issue: &Issue,
    artifact: &Artifact,
    _: &FrameworkConfig,
) -> Option<RepairAction> {
    let path = observability_events_path();
    let event = format!("{}.lifecycle", artifact.id);
    Some(
        RepairAction::field(
            issue,
            &path.to_string(),
            artifact.get(&path),
            Value::Sequence(vec![Value::String(event.clone())]),
        )
        .described(format!("declare observability event `{event}`")),
    )
}

fn fix_missing_error_states(
    issue: &Issue,
    artifact: &Artifact,
    _: &FrameworkConfig,
) -> Option<RepairAction> {
    let mut state = Mapping::new();
    state.insert("name".into(), "unexpected-failure".into());
    state.insert(
        "description".into(),
        "Unhandled failure; surface the error and stop".into(),
    );
    Some(
        RepairAction::field(
            issue,
            "errorStates",
            artifact.root.get("errorStates"),
            Value::Sequence(vec![Value::Mapping(state)]),
        )
        .described("declare a default `unexpected-failure` error state")
        .needs_approval(),
    )
}

fn fix_framework_annotation(
    issue: &Issue,
    _: &Artifact,
    framework: &FrameworkConfig,
) -> Option<RepairAction> {
    let line = format!("# {} {}", framework.framework_marker, framework.version);
    Some(RepairAction::header(issue, &framework.framework_marker, line))
}

fn fix_compliance_annotation(
    issue: &Issue,
    _: &Artifact,
    framework: &FrameworkConfig,
) -> Option<RepairAction> {
    let line = format!("# {}", framework.compliance_marker);
    Some(RepairAction::header(issue, &framework.compliance_marker, line))
}

fn fix_version_format(
    issue: &Issue,
    artifact: &Artifact,
    _: &FrameworkConfig,
) -> Option<RepairAction> {
    let current = artifact.root.get("version")?;
    let VersionSource::Text(text) = version_source(artifact, current) else {
        return None;
    };
    let normalized = normalize_version(&text)?;
    Some(
        RepairAction::field(
            issue,
            "version",
            Some(current),
            Value::String(normalized.clone()),
        )
        .described(format!("normalize `version` to `{normalized}`")),
    )
}

fn fix_contract_entry(
    issue: &Issue,
    artifact: &Artifact,
    _: &FrameworkConfig,
) -> Option<RepairAction> {
    let name = issue.subject_name()?;
    // Dotted names cannot be addressed by a key path.
    if name.contains('.') {
        return None;
    }
    let path = KeyPath::parse(&format!("ruleContracts.{name}")).ok()?;
    match artifact.get(&path) {
        Some(Value::Null) => {}
        _ => return None,
    }
    let mut action = RepairAction::field(
        issue,
        &path.to_string(),
        None,
        Value::Mapping(Mapping::new()),
    )
    .described(format!("replace empty contract `{name}` with `{{}}`"))
    .needs_approval();
    // The key exists with a null value, so this replaces rather than adds.
    action.operation = RepairOperation::Update;
    action.old_value = Some(Value::Null);
    Some(action)
}

/// `checkout-flow` -> `Checkout Flow`.
fn display_name(id: &str) -> String {
    id.split(['-', '_', '.', ' '])
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::RuleEvaluator;
    use std::path::Path;

    fn planned(raw: &str) -> HealthReport {
        let artifact =
            Artifact::parse(Path::new("blueprints/checkout-flow.yaml"), raw.to_string())
                .expect("artifact parses");
        let framework = FrameworkConfig::default();
        let report = RuleEvaluator::new(framework.clone()).evaluate(&artifact);
        RepairPlanner::with_defaults(framework)
            .expect("default handlers cover every repairable rule")
            .plan_report(report, &artifact)
    }

    #[test]
    fn planner_rejects_incomplete_handler_table() {
        let mut handlers = default_repair_handlers();
        handlers.remove(&RuleId::MissingVersion);
        let err = RepairPlanner::new(handlers, FrameworkConfig::default())
            .expect_err("missing handler");
        assert_eq!(
            err,
            PlannerConfigError::MissingHandler {
                rule: RuleId::MissingVersion
            }
        );
    }

    #[test]
    fn planner_rejects_handler_for_unfixable_rule() {
        let mut handlers = default_repair_handlers();
        handlers.insert(RuleId::ParseError, fix_missing_id);
        assert!(matches!(
            RepairPlanner::new(handlers, FrameworkConfig::default()),
            Err(PlannerConfigError::UnexpectedHandler { .. })
        ));
    }

    #[test]
    fn every_fixable_issue_maps_to_one_action() {
        let report = planned("ruleContracts:\n  billing: ~\n");
        let fixable = report.auto_fixable().count();
        assert_eq!(report.actions.len(), fixable);

        let by_issue: BTreeMap<&str, &RepairAction> = report
            .actions
            .iter()
            .map(|action| (action.issue_id.as_str(), action))
            .collect();
        let id = by_issue["missing-id"];
        assert_eq!(id.new_value, Some(Value::String("checkout-flow".into())));
        assert!(!id.requires_approval);

        let name = by_issue["missing-name"];
        assert_eq!(name.new_value, Some(Value::String("Checkout Flow".into())));
        assert_eq!(name.risk_level, RepairRisk::Moderate);
        assert!(name.requires_approval);

        let events = by_issue["missing-observability"];
        assert_eq!(events.path, "observability.events");
        assert_eq!(events.operation, RepairOperation::Add);

        let header = by_issue["missing-compliance-annotation"];
        assert_eq!(header.target, RepairTarget::Header);
        assert_eq!(header.path, "@compliance-enforced");

        let contract = by_issue["invalid-contract-entry.billing"];
        assert_eq!(contract.operation, RepairOperation::Update);
        assert!(contract.requires_approval);
    }

    #[test]
    fn empty_events_sequence_is_updated_not_added() {
        let report = planned("id: demo\nobservability:\n  events: []\n");
        let action = report
            .actions
            .iter()
            .find(|action| action.issue_id == "missing-observability")
            .expect("observability action");
        assert_eq!(action.operation, RepairOperation::Update);
        assert_eq!(action.old_value, Some(Value::Sequence(Vec::new())));
    }

    #[test]
    fn unquoted_float_version_normalizes_from_source_text() {
        let report = planned("version: 1.10\n");
        let action = report
            .actions
            .iter()
            .find(|action| action.path == "version")
            .expect("version action");
        assert_eq!(action.new_value, Some(Value::String("1.10.0".into())));
    }

    #[test]
    fn dotted_contract_name_has_no_action_and_is_not_fixable() {
        let report = planned("ruleContracts:\n  auth.v2: ~\n");
        let issue = report
            .issues
            .iter()
            .find(|issue| issue.rule == RuleId::InvalidContractEntry)
            .expect("contract issue");
        assert!(!issue.auto_fixable);
        assert_eq!(report.actions.len(), report.auto_fixable().count());
    }

    #[test]
    fn unnormalizable_version_has_no_action() {
        let report = planned("version: latest\n");
        let issue = report
            .issues
            .iter()
            .find(|issue| issue.rule == RuleId::InvalidVersionFormat)
            .expect("version issue");
        assert!(!issue.auto_fixable);
        assert!(report.actions.iter().all(|action| action.path != "version"));
    }

    #[test]
    fn display_name_title_cases_words() {
        assert_eq!(display_name("checkout-flow"), "Checkout Flow");
        assert_eq!(display_name("auth_v2"), "Auth V2");
    }
}
