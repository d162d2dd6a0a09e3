//! Issue: one detected rule violation on an artifact.

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use warden_core::Severity;

/// Typed rule identifier. Per-subject rules carry their subject in the
/// issue id (`invalid-field-type.name`), not in the rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RuleId {
    ParseError,
    MissingId,
    MissingName,
    MissingVersion,
    InvalidFieldType,
    MissingObservability,
    MissingErrorStates,
    MissingFrameworkAnnotation,
    MissingComplianceAnnotation,
    InvalidVersionFormat,
    InvalidRuleContracts,
    InvalidContractEntry,
}

impl RuleId {
    pub const ALL: [RuleId; 12] = [
        RuleId::ParseError,
        RuleId::MissingId,
        RuleId::MissingName,
        RuleId::MissingVersion,
        RuleId::InvalidFieldType,
        RuleId::MissingObservability,
        RuleId::MissingErrorStates,
        RuleId::MissingFrameworkAnnotation,
        RuleId::MissingComplianceAnnotation,
        RuleId::InvalidVersionFormat,
        RuleId::InvalidRuleContracts,
        RuleId::InvalidContractEntry,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::ParseError => "parse-error",
            Self::MissingId => "missing-id",
            Self::MissingName => "missing-name",
            Self::MissingVersion => "missing-version",
            Self::InvalidFieldType => "invalid-field-type",
            Self::MissingObservability => "missing-observability",
            Self::MissingErrorStates => "missing-error-states",
            Self::MissingFrameworkAnnotation => "missing-framework-annotation",
            Self::MissingComplianceAnnotation => "missing-compliance-annotation",
            Self::InvalidVersionFormat => "invalid-version-format",
            Self::InvalidRuleContracts => "invalid-rule-contracts",
            Self::InvalidContractEntry => "invalid-contract-entry",
        }
    }

    /// Rules that can produce an auto-fixable issue and therefore need a
    /// repair handler.
    pub fn repairable(self) -> bool {
        !matches!(
            self,
            Self::ParseError | Self::InvalidFieldType | Self::InvalidRuleContracts
        )
    }

    pub fn category(self) -> IssueCategory {
        match self {
            Self::ParseError | Self::InvalidFieldType => IssueCategory::SchemaViolation,
            Self::MissingId
            | Self::MissingName
            | Self::MissingVersion
            | Self::MissingObservability
            | Self::MissingErrorStates => IssueCategory::MissingRequired,
            Self::InvalidVersionFormat => IssueCategory::VersionMismatch,
            Self::MissingFrameworkAnnotation | Self::MissingComplianceAnnotation => {
                IssueCategory::AnnotationError
            }
            Self::InvalidRuleContracts | Self::InvalidContractEntry => {
                IssueCategory::ContractInconsistency
            }
        }
    }

    pub fn severity(self) -> Severity {
        match self {
            Self::ParseError => Severity::Critical,
            Self::MissingId
            | Self::MissingName
            | Self::MissingVersion
            | Self::InvalidFieldType
            | Self::InvalidRuleContracts => Severity::High,
            Self::MissingObservability
            | Self::MissingErrorStates
            | Self::InvalidVersionFormat
            | Self::InvalidContractEntry => Severity::Medium,
            Self::MissingFrameworkAnnotation | Self::MissingComplianceAnnotation => Severity::Low,
        }
    }
}

impl Display for RuleId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IssueCategory {
    SchemaViolation,
    MissingRequired,
    VersionMismatch,
    AnnotationError,
    ContractInconsistency,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Issue {
    pub id: String,
    pub rule: RuleId,
    pub category: IssueCategory,
    pub severity: Severity,
    pub location: String,
    pub expected: String,
    pub actual: String,
    pub suggestion: String,
    pub auto_fixable: bool,
}

impl Issue {
    /// Issue with category and severity taken from the rule table.
    pub fn new(rule: RuleId, location: impl Into<String>) -> Self {
        Self {
            id: rule.as_str().to_string(),
            rule,
            category: rule.category(),
            severity: rule.severity(),
            location: location.into(),
            expected: String::new(),
            actual: String::new(),
            suggestion: String::new(),
            auto_fixable: false,
        }
    }

    /// Suffix the id with a per-field or per-entry subject.
    pub fn subject(mut self, subject: &str) -> Self {
        self.id = format!("{}.{subject}", self.rule.as_str());
        self
    }

    pub fn expected(mut self, expected: impl Into<String>) -> Self {
        self.expected = expected.into();
        self
    }

    pub fn actual(mut self, actual: impl Into<String>) -> Self {
        self.actual = actual.into();
        self
    }

    pub fn suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = suggestion.into();
        self
    }

    pub fn fixable(mut self, auto_fixable: bool) -> Self {
        self.auto_fixable = auto_fixable;
        self
    }

    /// The part of the id after the rule, if any.
    pub fn subject_name(&self) -> Option<&str> {
        self.id
            .strip_prefix(self.rule.as_str())
            .and_then(|rest| rest.strip_prefix('.'))
    }
}
