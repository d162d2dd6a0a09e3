//! Per-artifact health report and scoring.

use crate::issue::Issue;
use crate::repair::RepairAction;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HealthStatus {
    Healthy,
    Warning,
    Critical,
    Corrupted,
}

impl HealthStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Healthy => "healthy",
            Self::Warning => "warning",
            Self::Critical => "critical",
            Self::Corrupted => "corrupted",
        }
    }

    /// `corrupted` and `critical` fail a run.
    pub fn is_failing(self) -> bool {
        matches!(self, Self::Critical | Self::Corrupted)
    }

    fn classify(score: u32, issues: &[Issue]) -> Self {
        if issues
            .iter()
            .any(|issue| issue.severity == warden_core::Severity::Critical)
        {
            Self::Corrupted
        } else if score >= 90 {
            Self::Healthy
        } else if score >= 70 {
            Self::Warning
        } else {
            Self::Critical
        }
    }
}

impl Display for HealthStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `max(0, 100 - sum of severity weights)`.
pub fn health_score(issues: &[Issue]) -> u32 {
    let penalty: u32 = issues.iter().map(|issue| issue.severity.weight()).sum();
    100u32.saturating_sub(penalty)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    pub artifact_id: String,
    pub file_path: String,
    pub status: HealthStatus,
    pub issues: Vec<Issue>,
    #[serde(default)]
    pub actions: Vec<RepairAction>,
    pub score: u32,
    pub generated_at: DateTime<Utc>,
    /// Digest of the bytes this report was computed from; the applier
    /// refuses to write when the file no longer matches.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_digest: Option<String>,
}

impl HealthReport {
    pub fn new(artifact_id: String, file_path: String, issues: Vec<Issue>) -> Self {
        let score = health_score(&issues);
        let status = HealthStatus::classify(score, &issues);
        Self {
            artifact_id,
            file_path,
            status,
            issues,
            actions: Vec::new(),
            score,
            generated_at: Utc::now(),
            source_digest: None,
        }
    }

    pub fn with_source_digest(mut self, digest: String) -> Self {
        self.source_digest = Some(digest);
        self
    }

    pub fn auto_fixable(&self) -> impl Iterator<Item = &Issue> {
        self.issues.iter().filter(|issue| issue.auto_fixable)
    }

    /// One human line, e.g. `checkout: healthy (score 94, 2 issue(s))`.
    pub fn summary_line(&self) -> String {
        format!(
            "{}: {} (score {}, {} issue(s))",
            self.artifact_id,
            self.status,
            self.score,
            self.issues.len()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::issue::RuleId;

    fn issues(rules: &[RuleId]) -> Vec<Issue> {
        rules.iter().map(|rule| Issue::new(*rule, "x")).collect()
    }

    #[test]
    fn score_is_bounded_and_monotone() {
        let mut accumulated = Vec::new();
        let mut previous = health_score(&accumulated);
        assert_eq!(previous, 100);
        for _ in 0..12 {
            accumulated.push(Issue::new(RuleId::MissingId, "id"));
            let score = health_score(&accumulated);
            assert!(score <= previous);
            assert!(score <= 100);
            previous = score;
        }
        assert_eq!(previous, 0);
    }

    #[test]
    fn two_medium_issues_stay_healthy() {
        let report = HealthReport::new(
            "demo".to_string(),
            "demo.yaml".to_string(),
            issues(&[RuleId::MissingObservability, RuleId::MissingErrorStates]),
        );
        assert_eq!(report.score, 94);
        assert_eq!(report.status, HealthStatus::Healthy);
    }

    #[test]
    fn status_thresholds() {
        // 100 - 7 - 3 = 90 stays healthy; one more low issue tips to warning.
        let report = HealthReport::new(
            "a".into(),
            "a.yaml".into(),
            issues(&[RuleId::MissingId, RuleId::InvalidVersionFormat]),
        );
        assert_eq!((report.score, report.status), (90, HealthStatus::Healthy));
        let report = HealthReport::new(
            "a".into(),
            "a.yaml".into(),
            issues(&[
                RuleId::MissingId,
                RuleId::InvalidVersionFormat,
                RuleId::MissingFrameworkAnnotation,
            ]),
        );
        assert_eq!((report.score, report.status), (89, HealthStatus::Warning));
        let report = HealthReport::new(
            "a".into(),
            "a.yaml".into(),
            issues(&[
                RuleId::MissingId,
                RuleId::MissingName,
                RuleId::MissingVersion,
                RuleId::InvalidRuleContracts,
                RuleId::InvalidVersionFormat,
            ]),
        );
        assert_eq!((report.score, report.status), (69, HealthStatus::Critical));
    }

    #[test]
    fn any_critical_issue_is_corrupted() {
        let report = HealthReport::new("a".into(), "a.yaml".into(), issues(&[RuleId::ParseError]));
        assert_eq!(report.score, 85);
        assert_eq!(report.status, HealthStatus::Corrupted);
        assert!(report.status.is_failing());
    }

    #[test]
    fn summary_line_format() {
        let report = HealthReport::new(
            "checkout".into(),
            "checkout.yaml".into(),
            issues(&[RuleId::MissingObservability]),
        );
        insta::assert_snapshot!(report.summary_line(), @"checkout: healthy (score 97, 1 issue(s))");
    }
}
