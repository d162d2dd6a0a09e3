//! Rule evaluation over one artifact.
//!
//! Every check is independent and appends zero or more issues. A parse
//! failure short-circuits everything else and produces a single critical
//! issue instead of an error.

use crate::artifact::{Artifact, KeyPath, fallback_id, has_marker, value_kind};
use crate::issue::{Issue, RuleId};
use crate::report::HealthReport;
use regex::Regex;
use serde_yaml::Value;
use std::path::Path;
use std::sync::OnceLock;
use tracing::debug;
use warden_core::{FrameworkConfig, sha256_digest};

pub fn version_format_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^\d+\.\d+\.\d+(-\w+)?$").expect("version format regex must compile")
    })
}

fn loose_version_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^[vV]?(\d+)(?:\.(\d+))?(?:\.(\d+))?(-\w+)?$")
            .expect("loose version regex must compile")
    })
}

/// Text form of a scalar. Floats lose their source spelling (`1.10` reads
/// back as `1.1`); use [`version_source`] for the artifact's own version.
pub(crate) fn version_text(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.trim().to_string()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

/// What a version scalar says about itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionSource {
    /// The version exactly as written.
    Text(String),
    /// An unquoted float whose spelling could not be recovered.
    AmbiguousFloat(String),
    NotScalar,
}

/// The top-level `version` as written in the file. Unquoted floats are
/// recovered from the raw text so `1.10` stays `1.10`.
pub fn version_source(artifact: &Artifact, value: &Value) -> VersionSource {
    match value {
        Value::String(text) => VersionSource::Text(text.trim().to_string()),
        Value::Number(number) if number.is_f64() => {
            match raw_top_level_scalar(&artifact.raw_text, "version") {
                Some(text) if text.parse::<f64>().ok() == number.as_f64() => {
                    VersionSource::Text(text)
                }
                _ => VersionSource::AmbiguousFloat(number.to_string()),
            }
        }
        Value::Number(number) => VersionSource::Text(number.to_string()),
        _ => VersionSource::NotScalar,
    }
}

fn raw_top_level_scalar(raw: &str, key: &str) -> Option<String> {
    raw.lines().find_map(|line| {
        let rest = line.strip_prefix(key)?.strip_prefix(':')?;
        let text = rest.split(" #").next().unwrap_or(rest).trim();
        (!text.is_empty()).then(|| text.to_string())
    })
}

/// Normalize a loose version (`1.2`, `v2`, `1.2-rc1`) to `MAJOR.MINOR.PATCH`.
/// `None` when the text cannot be read as a version at all.
pub fn normalize_version(text: &str) -> Option<String> {
    let text = text.trim();
    if version_format_re().is_match(text) {
        return Some(text.to_string());
    }
    let caps = loose_version_re().captures(text)?;
    let part = |index: usize| caps.get(index).map_or("0", |m| m.as_str());
    let suffix = caps.get(4).map_or("", |m| m.as_str());
    Some(format!("{}.{}.{}{suffix}", part(1), part(2), part(3)))
}

#[derive(Debug, Clone)]
pub struct RuleEvaluator {
    framework: FrameworkConfig,
}

impl RuleEvaluator {
    pub fn new(framework: FrameworkConfig) -> Self {
        Self { framework }
    }

    pub fn framework(&self) -> &FrameworkConfig {
        &self.framework
    }

    pub fn evaluate(&self, artifact: &Artifact) -> HealthReport {
        let mut issues = Vec::new();
        self.check_identity(artifact, &mut issues);
        self.check_version(artifact, &mut issues);
        self.check_observability(artifact, &mut issues);
        self.check_error_states(artifact, &mut issues);
        self.check_annotations(artifact, &mut issues);
        self.check_rule_contracts(artifact, &mut issues);

        debug!(
            artifact_id = %artifact.id,
            issues = issues.len(),
            "evaluated artifact"
        );
        HealthReport::new(
            artifact.id.clone(),
            artifact.file_path.display().to_string(),
            issues,
        )
        .with_source_digest(sha256_digest(artifact.raw_text.as_bytes()))
    }

    /// Report for a file that could not be read or parsed.
    pub fn parse_failure(
        &self,
        file_path: &Path,
        message: &str,
        source_digest: Option<String>,
    ) -> HealthReport {
        let issue = Issue::new(RuleId::ParseError, file_path.display().to_string())
            .expected("a readable YAML mapping")
            .actual(message)
            .suggestion("fix the document by hand; it cannot be repaired automatically");
        let report = HealthReport::new(
            fallback_id(file_path),
            file_path.display().to_string(),
            vec![issue],
        );
        match source_digest {
            Some(digest) => report.with_source_digest(digest),
            None => report,
        }
    }

    fn check_identity(&self, artifact: &Artifact, issues: &mut Vec<Issue>) {
        match artifact.root.get("id") {
            None | Some(Value::Null) => issues.push(
                Issue::new(RuleId::MissingId, "id")
                    .expected("string id")
                    .actual("missing")
                    .suggestion(format!("add `id: {}`", artifact.id))
                    .fixable(true),
            ),
            Some(Value::String(_)) => {}
            Some(other) => issues.push(invalid_type("id", "a string", other)),
        }

        match artifact.root.get("name") {
            None | Some(Value::Null) => issues.push(
                Issue::new(RuleId::MissingName, "name")
                    .expected("human-readable name")
                    .actual("missing")
                    .suggestion("add a `name`; the derived default needs approval")
                    .fixable(true),
            ),
            Some(Value::String(_)) => {}
            Some(other) => issues.push(invalid_type("name", "a string", other)),
        }
    }

    fn check_version(&self, artifact: &Artifact, issues: &mut Vec<Issue>) {
        let Some(value) = artifact.root.get("version").filter(|v| !v.is_null()) else {
            issues.push(
                Issue::new(RuleId::MissingVersion, "version")
                    .expected("semantic version")
                    .actual("missing")
                    .suggestion(format!("add `version: {}`", self.framework.version))
                    .fixable(true),
            );
            return;
        };

        let (text, normalized) = match version_source(artifact, value) {
            VersionSource::NotScalar => {
                issues.push(invalid_type("version", "a version string", value));
                return;
            }
            VersionSource::AmbiguousFloat(text) => (text, None),
            VersionSource::Text(text) => {
                if version_format_re().is_match(&text) {
                    return;
                }
                let normalized = normalize_version(&text);
                (text, normalized)
            }
        };
        let suggestion = match &normalized {
            Some(version) => format!("use `{version}`"),
            None => "use MAJOR.MINOR.PATCH as a quoted string".to_string(),
        };
        issues.push(
            Issue::new(RuleId::InvalidVersionFormat, "version")
                .expected("MAJOR.MINOR.PATCH[-tag]")
                .actual(text)
                .suggestion(suggestion)
                .fixable(normalized.is_some()),
        );
    }

    fn check_observability(&self, artifact: &Artifact, issues: &mut Vec<Issue>) {
        let events_path = observability_events_path();
        match artifact.root.get("observability") {
            None | Some(Value::Null) | Some(Value::Mapping(_)) => {}
            Some(other) => {
                issues.push(invalid_type("observability", "a mapping", other));
                return;
            }
        }
        match artifact.get(&events_path) {
            None | Some(Value::Null) => issues.push(missing_events()),
            Some(Value::Sequence(events)) if events.is_empty() => issues.push(missing_events()),
            Some(Value::Sequence(_)) => {}
            Some(other) => issues.push(invalid_type("observability.events", "a sequence", other)),
        }
    }

    fn check_error_states(&self, artifact: &Artifact, issues: &mut Vec<Issue>) {
        match artifact.root.get("errorStates") {
            None | Some(Value::Null) => issues.push(missing_error_states()),
            Some(Value::Sequence(states)) if states.is_empty() => {
                issues.push(missing_error_states())
            }
            Some(Value::Sequence(_)) => {}
            Some(other) => issues.push(invalid_type("errorStates", "a sequence", other)),
        }
    }

    fn check_annotations(&self, artifact: &Artifact, issues: &mut Vec<Issue>) {
        let framework = &self.framework.framework_marker;
        if !has_marker(&artifact.raw_text, framework) {
            issues.push(
                Issue::new(RuleId::MissingFrameworkAnnotation, "header")
                    .expected(format!("`{framework}` in the header"))
                    .actual("absent")
                    .suggestion(format!("add `# {framework} {}`", self.framework.version))
                    .fixable(true),
            );
        }
        let compliance = &self.framework.compliance_marker;
        if !has_marker(&artifact.raw_text, compliance) {
            issues.push(
                Issue::new(RuleId::MissingComplianceAnnotation, "header")
                    .expected(format!("`{compliance}` in the header"))
                    .actual("absent")
                    .suggestion(format!("add `# {compliance}`"))
                    .fixable(true),
            );
        }
    }

    fn check_rule_contracts(&self, artifact: &Artifact, issues: &mut Vec<Issue>) {
        let contracts = match artifact.root.get("ruleContracts") {
            None | Some(Value::Null) => return,
            Some(Value::Mapping(contracts)) => contracts,
            Some(other) => {
                issues.push(
                    Issue::new(RuleId::InvalidRuleContracts, "ruleContracts")
                        .expected("a mapping of named contracts")
                        .actual(value_kind(other))
                        .suggestion("rewrite `ruleContracts` as `name: {...}` entries"),
                );
                return;
            }
        };

        for (key, entry) in contracts {
            if entry.is_mapping() {
                continue;
            }
            let name = match key {
                Value::String(name) => name.clone(),
                other => version_text(other).unwrap_or_else(|| value_kind(other).to_string()),
            };
            // A repair addresses the entry by key path, so only plain string
            // names without dots can be fixed.
            let addressable =
                matches!(key, Value::String(name) if !name.is_empty() && !name.contains('.'));
            let fixable = entry.is_null() && addressable;
            let suggestion = if entry.is_null() {
                "replace the empty entry with `{}`"
            } else {
                "rewrite the entry as a mapping"
            };
            issues.push(
                Issue::new(RuleId::InvalidContractEntry, format!("ruleContracts.{name}"))
                    .subject(&name)
                    .expected("a mapping")
                    .actual(value_kind(entry))
                    .suggestion(suggestion)
                    .fixable(fixable),
            );
        }
    }
}

pub(crate) fn observability_events_path() -> KeyPath {
    KeyPath(vec!["observability".to_string(), "events".to_string()])
}

fn missing_events() -> Issue {
    Issue::new(RuleId::MissingObservability, "observability.events")
        .expected("at least one observability event")
        .actual("missing or empty")
        .suggestion("declare the lifecycle event the artifact emits")
        .fixable(true)
}

fn missing_error_states() -> Issue {
    Issue::new(RuleId::MissingErrorStates, "errorStates")
        .expected("at least one error state")
        .actual("missing or empty")
        .suggestion("declare how the artifact fails; the default needs approval")
        .fixable(true)
}

fn invalid_type(field: &str, expected: &str, found: &Value) -> Issue {
    Issue::new(RuleId::InvalidFieldType, field)
        .subject(field)
        .expected(expected)
        .actual(value_kind(found))
        .suggestion(format!("change `{field}` to {expected}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::HealthStatus;
    use std::path::PathBuf;
    use warden_core::Severity;

    const HEADER: &str = "# @blueprint-framework 1.0.0\n# @compliance-enforced\n";

    fn evaluate(body: &str) -> HealthReport {
        let raw = format!("{HEADER}{body}");
        let artifact = Artifact::parse(&PathBuf::from("blueprints/demo.yaml"), raw)
            .expect("artifact parses");
        RuleEvaluator::new(FrameworkConfig::default()).evaluate(&artifact)
    }

    fn ids(report: &HealthReport) -> Vec<&str> {
        report.issues.iter().map(|issue| issue.id.as_str()).collect()
    }

    const COMPLETE: &str = "id: demo\nname: Demo\nversion: 1.0.0\nobservability:\n  events: [demo.started]\nerrorStates: [timeout]\n";

    #[test]
    fn complete_artifact_is_clean() {
        let report = evaluate(COMPLETE);
        assert!(report.issues.is_empty(), "unexpected issues: {:?}", ids(&report));
        assert_eq!(report.score, 100);
        assert_eq!(report.status, HealthStatus::Healthy);
    }

    #[test]
    fn short_version_is_one_fixable_medium_issue() {
        let report = evaluate(
            "id: demo\nname: Demo\nversion: \"1.2\"\nobservability:\n  events: [a]\nerrorStates: [b]\n",
        );
        assert_eq!(ids(&report), vec!["invalid-version-format"]);
        let issue = &report.issues[0];
        assert_eq!(issue.severity, Severity::Medium);
        assert!(issue.auto_fixable);
        assert_eq!(issue.suggestion, "use `1.2.0`");
    }

    #[test]
    fn missing_error_states_and_events_scores_94() {
        let report = evaluate("id: demo\nname: Demo\nversion: 1.0.0\n");
        assert_eq!(ids(&report), vec!["missing-observability", "missing-error-states"]);
        assert_eq!(report.score, 94);
        assert_eq!(report.status, HealthStatus::Healthy);
    }

    #[test]
    fn evaluation_is_idempotent_apart_from_timestamp() {
        let first = evaluate("name: 3\nversion: v2\nruleContracts:\n  a: ~\n  b: 1\n");
        let mut second = evaluate("name: 3\nversion: v2\nruleContracts:\n  a: ~\n  b: 1\n");
        second.generated_at = first.generated_at;
        assert_eq!(first, second);
    }

    #[test]
    fn wrong_types_are_not_fixable() {
        let report = evaluate(
            "id: [x]\nname: Demo\nversion: true\nobservability: on\nerrorStates: nope\n",
        );
        assert_eq!(
            ids(&report),
            vec![
                "invalid-field-type.id",
                "invalid-field-type.version",
                "invalid-field-type.observability",
                "invalid-field-type.errorStates",
            ]
        );
        assert!(report.issues.iter().all(|issue| !issue.auto_fixable));
    }

    #[test]
    fn missing_header_markers_are_low_severity() {
        let artifact = Artifact::parse(Path::new("demo.yaml"), COMPLETE.to_string())
            .expect("artifact parses");
        let report = RuleEvaluator::new(FrameworkConfig::default()).evaluate(&artifact);
        assert_eq!(
            ids(&report),
            vec!["missing-framework-annotation", "missing-compliance-annotation"]
        );
        assert_eq!(report.score, 98);
    }

    #[test]
    fn contract_entries_are_checked_per_name() {
        let report = evaluate(&format!(
            "{COMPLETE}ruleContracts:\n  auth: {{}}\n  billing: ~\n  audit: strict\n"
        ));
        assert_eq!(
            ids(&report),
            vec!["invalid-contract-entry.billing", "invalid-contract-entry.audit"]
        );
        assert!(report.issues[0].auto_fixable);
        assert!(!report.issues[1].auto_fixable);

        let report = evaluate(&format!("{COMPLETE}ruleContracts: [a, b]\n"));
        assert_eq!(ids(&report), vec!["invalid-rule-contracts"]);
    }

    #[test]
    fn dotted_or_non_string_contract_names_are_not_fixable() {
        let report = evaluate(&format!(
            "{COMPLETE}ruleContracts:\n  auth.v2: ~\n  7: ~\n  plain: ~\n"
        ));
        let fixable: Vec<(&str, bool)> = report
            .issues
            .iter()
            .map(|issue| (issue.id.as_str(), issue.auto_fixable))
            .collect();
        assert_eq!(
            fixable,
            vec![
                ("invalid-contract-entry.auth.v2", false),
                ("invalid-contract-entry.7", false),
                ("invalid-contract-entry.plain", true),
            ]
        );
    }

    #[test]
    fn unquoted_float_version_keeps_its_spelling() {
        let report = evaluate(
            "id: demo\nname: Demo\nversion: 1.10   # minor ten\nobservability:\n  events: [a]\nerrorStates: [b]\n",
        );
        assert_eq!(ids(&report), vec!["invalid-version-format"]);
        assert_eq!(report.issues[0].actual, "1.10");
        assert_eq!(report.issues[0].suggestion, "use `1.10.0`");
        assert!(report.issues[0].auto_fixable);
    }

    #[test]
    fn unrecoverable_float_version_is_not_fixable() {
        let report = evaluate(
            "{id: demo, name: Demo, version: 1.10, observability: {events: [a]}, errorStates: [b]}\n",
        );
        assert_eq!(ids(&report), vec!["invalid-version-format"]);
        assert!(!report.issues[0].auto_fixable);
    }

    #[test]
    fn parse_failure_is_a_single_critical_issue() {
        let report = RuleEvaluator::new(FrameworkConfig::default()).parse_failure(
            Path::new("blueprints/broken.yaml"),
            "did not find expected node content",
            None,
        );
        assert_eq!(report.artifact_id, "broken");
        assert_eq!(ids(&report), vec!["parse-error"]);
        assert_eq!(report.status, HealthStatus::Corrupted);
    }

    #[test]
    fn version_normalization() {
        assert_eq!(normalize_version("1.2").as_deref(), Some("1.2.0"));
        assert_eq!(normalize_version("v2").as_deref(), Some("2.0.0"));
        assert_eq!(normalize_version("1.2-rc1").as_deref(), Some("1.2.0-rc1"));
        assert_eq!(normalize_version("3.4.5").as_deref(), Some("3.4.5"));
        assert_eq!(normalize_version("latest"), None);
    }
}
