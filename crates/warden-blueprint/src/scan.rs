//! Repository-level scan and heal passes.
//!
//! Heal always re-reads each artifact after repair, so the final report
//! reflects what is on disk rather than what the planner intended.

use crate::apply::{RepairApplier, RepairOutcome};
use crate::artifact::Artifact;
use crate::repair::RepairPlanner;
use crate::report::{HealthReport, HealthStatus};
use crate::rules::RuleEvaluator;
use crate::store::{ArtifactStore, WalkFailure};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::path::Path;
use tracing::info;
use warden_core::{Severity, TelemetryEvent, TelemetrySink, emit, sha256_digest};

/// One evaluated artifact; `artifact` is `None` when it could not be parsed.
#[derive(Debug, Clone)]
pub struct ArtifactScan {
    pub report: HealthReport,
    pub artifact: Option<Artifact>,
}

pub fn scan_artifact(store: &ArtifactStore, evaluator: &RuleEvaluator, path: &Path) -> ArtifactScan {
    let raw = match store.read(path) {
        Ok(raw) => raw,
        Err(err) => {
            return ArtifactScan {
                report: evaluator.parse_failure(path, &err.to_string(), None),
                artifact: None,
            };
        }
    };
    let digest = sha256_digest(raw.as_bytes());
    match Artifact::parse(path, raw) {
        Ok(artifact) => ArtifactScan {
            report: evaluator.evaluate(&artifact),
            artifact: Some(artifact),
        },
        Err(err) => ArtifactScan {
            report: evaluator.parse_failure(path, &err.to_string(), Some(digest)),
            artifact: None,
        },
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanSummary {
    pub artifacts: usize,
    pub healthy: usize,
    pub warning: usize,
    pub critical: usize,
    pub corrupted: usize,
    pub total_issues: usize,
    pub auto_fixable: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worst_status: Option<HealthStatus>,
    pub average_score: f64,
}

impl ScanSummary {
    pub fn from_reports<'a>(reports: impl IntoIterator<Item = &'a HealthReport>) -> Self {
        let mut summary = Self::default();
        let mut score_total = 0u64;
        for report in reports {
            summary.artifacts += 1;
            match report.status {
                HealthStatus::Healthy => summary.healthy += 1,
                HealthStatus::Warning => summary.warning += 1,
                HealthStatus::Critical => summary.critical += 1,
                HealthStatus::Corrupted => summary.corrupted += 1,
            }
            summary.total_issues += report.issues.len();
            summary.auto_fixable += report.auto_fixable().count();
            summary.worst_status = summary.worst_status.max(Some(report.status));
            score_total += u64::from(report.score);
        }
        if summary.artifacts > 0 {
            summary.average_score = score_total as f64 / summary.artifacts as f64;
        }
        summary
    }

    pub fn is_failing(&self) -> bool {
        self.worst_status.is_some_and(HealthStatus::is_failing)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepositoryScan {
    pub reports: Vec<HealthReport>,
    pub summary: ScanSummary,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub walk_failures: Vec<WalkFailure>,
}

/// Evaluate every discovered artifact. Entries that cannot be walked are
/// carried in `walk_failures`; they never stop the scan.
pub fn scan_repository(
    store: &ArtifactStore,
    evaluator: &RuleEvaluator,
    telemetry: &dyn TelemetrySink,
) -> RepositoryScan {
    let discovery = store.discover();
    let reports: Vec<HealthReport> = discovery
        .files
        .iter()
        .map(|path| scan_artifact(store, evaluator, path).report)
        .collect();
    let summary = ScanSummary::from_reports(&reports);
    info!(
        artifacts = summary.artifacts,
        issues = summary.total_issues,
        walk_failures = discovery.failures.len(),
        "scan complete"
    );
    emit(
        telemetry,
        TelemetryEvent::new(
            "scan.completed",
            if summary.is_failing() {
                Severity::High
            } else {
                Severity::Low
            },
            json!({
                "artifacts": summary.artifacts,
                "totalIssues": summary.total_issues,
                "worstStatus": summary.worst_status,
                "walkFailures": discovery.failures.len(),
            }),
        ),
    );
    RepositoryScan {
        reports,
        summary,
        walk_failures: discovery.failures,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealOutcome {
    /// Evaluation before repair, with planned actions.
    pub before: HealthReport,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repair: Option<RepairOutcome>,
    /// Evaluation of the file as it is on disk afterwards.
    pub after: HealthReport,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealReport {
    pub artifacts: Vec<HealOutcome>,
    pub summary: ScanSummary,
    pub repaired: usize,
    pub failed: usize,
    pub pending_approval: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub walk_failures: Vec<WalkFailure>,
}

/// Evaluate and plan every artifact; with an applier, also repair and
/// re-evaluate. Without one this is a dry run that only reports the plan.
pub fn heal_repository(
    store: &ArtifactStore,
    evaluator: &RuleEvaluator,
    planner: &RepairPlanner,
    applier: Option<&RepairApplier>,
) -> HealReport {
    let discovery = store.discover();
    let mut artifacts = Vec::new();
    for path in discovery.files {
        let scan = scan_artifact(store, evaluator, &path);
        let before = match &scan.artifact {
            Some(artifact) => planner.plan_report(scan.report, artifact),
            None => scan.report,
        };

        let repair = match applier {
            Some(applier) if !before.actions.is_empty() => Some(applier.apply(&before)),
            _ => None,
        };
        let after = if repair.as_ref().is_some_and(|outcome| outcome.modified) {
            scan_artifact(store, evaluator, &path).report
        } else {
            let mut unchanged = before.clone();
            unchanged.actions.clear();
            unchanged
        };
        artifacts.push(HealOutcome {
            before,
            repair,
            after,
        });
    }

    let summary = ScanSummary::from_reports(artifacts.iter().map(|outcome| &outcome.after));
    let repaired = artifacts
        .iter()
        .filter(|outcome| outcome.repair.as_ref().is_some_and(|r| r.modified))
        .count();
    let failed = artifacts
        .iter()
        .filter(|outcome| outcome.repair.as_ref().is_some_and(RepairOutcome::failed))
        .count();
    let pending_approval = artifacts
        .iter()
        .map(|outcome| {
            outcome
                .before
                .actions
                .iter()
                .filter(|action| action.requires_approval)
                .count()
        })
        .sum();
    HealReport {
        artifacts,
        summary,
        repaired,
        failed,
        pending_approval,
        walk_failures: discovery.failures,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::sync::Arc;
    use warden_core::{FrameworkConfig, MemorySink, NullSink};

    fn setup(files: &[(&str, &str)]) -> (tempfile::TempDir, ArtifactStore) {
        let dir = tempfile::tempdir().expect("tempdir");
        let bp = dir.path().join("blueprints");
        fs::create_dir_all(&bp).expect("mkdir");
        for (name, text) in files {
            fs::write(bp.join(name), text).expect("write artifact");
        }
        let store = ArtifactStore::new(dir.path(), vec![bp], vec!["yaml".to_string()]);
        (dir, store)
    }

    const CLEAN: &str = "# @blueprint-framework 1.0.0\n# @compliance-enforced\nid: clean\nname: Clean\nversion: 1.0.0\nobservability:\n  events: [clean.started]\nerrorStates: [timeout]\n";

    #[test]
    fn scan_summarizes_worst_status() {
        let (_dir, store) = setup(&[("clean.yaml", CLEAN), ("broken.yaml", "id: [oops\n")]);
        let sink = MemorySink::new();
        let scan = scan_repository(&store, &RuleEvaluator::new(FrameworkConfig::default()), &sink);
        assert_eq!(scan.summary.artifacts, 2);
        assert_eq!(scan.summary.healthy, 1);
        assert_eq!(scan.summary.corrupted, 1);
        assert_eq!(scan.summary.worst_status, Some(HealthStatus::Corrupted));
        assert!(scan.summary.is_failing());
        assert_eq!(sink.event_types(), vec!["scan.completed".to_string()]);
    }

    #[test]
    fn empty_repository_is_not_failing() {
        let (_dir, store) = setup(&[]);
        let scan = scan_repository(&store, &RuleEvaluator::new(FrameworkConfig::default()), &NullSink);
        assert_eq!(scan.summary.artifacts, 0);
        assert_eq!(scan.summary.worst_status, None);
        assert!(!scan.summary.is_failing());
    }

    #[cfg(unix)]
    #[test]
    fn walk_failure_is_reported_alongside_reports() {
        let (dir, _) = setup(&[("clean.yaml", CLEAN)]);
        let dangling = dir.path().join("extra");
        std::os::unix::fs::symlink(dir.path().join("missing"), &dangling).expect("symlink");
        let store = ArtifactStore::new(
            dir.path(),
            vec![dir.path().join("blueprints"), dangling],
            vec!["yaml".to_string()],
        );
        let evaluator = RuleEvaluator::new(FrameworkConfig::default());

        let scan = scan_repository(&store, &evaluator, &NullSink);
        assert_eq!(scan.summary.healthy, 1);
        assert_eq!(scan.walk_failures.len(), 1);

        let planner = RepairPlanner::with_defaults(FrameworkConfig::default()).expect("planner");
        let heal = heal_repository(&store, &evaluator, &planner, None);
        assert_eq!(heal.artifacts.len(), 1);
        assert_eq!(heal.walk_failures, scan.walk_failures);
    }

    #[test]
    fn heal_without_applier_only_plans() {
        let (dir, store) = setup(&[("demo.yaml", "id: demo\n")]);
        let framework = FrameworkConfig::default();
        let planner = RepairPlanner::with_defaults(framework.clone()).expect("planner");
        let report = heal_repository(&store, &RuleEvaluator::new(framework), &planner, None);
        assert_eq!(report.repaired, 0);
        assert!(!report.artifacts[0].before.actions.is_empty());
        assert_eq!(
            fs::read_to_string(dir.path().join("blueprints/demo.yaml")).expect("read"),
            "id: demo\n"
        );
    }

    #[test]
    fn heal_repairs_and_reevaluates_from_disk() {
        let (dir, store) = setup(&[
            ("clean.yaml", CLEAN),
            ("demo.yaml", "id: demo\nname: Demo\n"),
            ("broken.yaml", "- not\n- a mapping\n"),
        ]);
        let framework = FrameworkConfig::default();
        let planner = RepairPlanner::with_defaults(framework.clone()).expect("planner");
        let applier = RepairApplier::new(
            store.clone(),
            dir.path().join(".warden/repair.lock"),
            dir.path().join(".warden/logs/repairs.jsonl"),
            "run-heal",
            Arc::new(NullSink),
        );
        let report = heal_repository(
            &store,
            &RuleEvaluator::new(framework),
            &planner,
            Some(&applier),
        );

        assert_eq!(report.repaired, 1);
        assert_eq!(report.failed, 0);
        let demo = report
            .artifacts
            .iter()
            .find(|outcome| outcome.after.artifact_id == "demo")
            .expect("demo outcome");
        // Only the approval-gated error-states fix remains.
        let remaining: Vec<_> = demo.after.issues.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(remaining, vec!["missing-error-states"]);
        assert_eq!(demo.after.score, 97);
        assert_eq!(report.summary.worst_status, Some(HealthStatus::Corrupted));
        assert_eq!(report.pending_approval, 1);
    }
}
