//! Prevention actions and the executor that runs them at most once.
//!
//! Every action an alert asks for is fingerprinted from the template, the
//! action, and the conditions that matched. The ledger records each decision;
//! a fingerprint with an `executed` record is skipped on later runs.

use crate::alert::PredictiveAlert;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeSet;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use warden_blueprint::{HealReport, RepairApplier, RepairPlanner, RuleEvaluator, heal_repository};
use warden_core::{
    CommandRunner, CommandSpec, PreventionMode, ResolvedPaths, Severity, TelemetryEvent,
    TelemetrySink, append_record, emit, read_records_from_path, sha256_digest, spawn_detached,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum PreventionAction {
    /// Run the repair applier over every artifact.
    RepairArtifacts,
    /// Blocking command; the configured timeout applies when unset.
    Command {
        program: String,
        #[serde(default)]
        args: Vec<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timeout_secs: Option<u64>,
    },
    /// Long-lived process, started detached and never waited on.
    Detached {
        program: String,
        #[serde(default)]
        args: Vec<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        log_file: Option<String>,
    },
}

impl PreventionAction {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::RepairArtifacts => "repair-artifacts",
            Self::Command { .. } => "command",
            Self::Detached { .. } => "detached",
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        match self {
            Self::RepairArtifacts => Ok(()),
            Self::Command {
                program,
                timeout_secs,
                ..
            } => {
                if program.trim().is_empty() {
                    return Err("command program is empty".to_string());
                }
                if *timeout_secs == Some(0) {
                    return Err("timeoutSecs must be at least 1".to_string());
                }
                Ok(())
            }
            Self::Detached { program, .. } if program.trim().is_empty() => {
                Err("detached program is empty".to_string())
            }
            Self::Detached { .. } => Ok(()),
        }
    }

    fn command_spec(program: &str, args: &[String]) -> CommandSpec {
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        CommandSpec::new(program, &args)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreventionStep {
    pub id: String,
    #[serde(default)]
    pub description: String,
    #[serde(flatten)]
    pub action: PreventionAction,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PreventionStatus {
    /// Prevention mode is `off`.
    Disabled,
    DryRun,
    Executed,
    /// Already executed for the same fingerprint.
    Skipped,
    Failed,
}

impl PreventionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Disabled => "disabled",
            Self::DryRun => "dry-run",
            Self::Executed => "executed",
            Self::Skipped => "skipped",
            Self::Failed => "failed",
        }
    }
}

impl Display for PreventionStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One ledger row: what was decided for one action of one alert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreventionRecord {
    pub run_id: String,
    pub alert_id: String,
    pub template_id: String,
    pub action_id: String,
    pub fingerprint: String,
    pub mode: PreventionMode,
    pub status: PreventionStatus,
    pub detail: String,
    pub timestamp: DateTime<Utc>,
}

/// `sha256:` over the template id, action id, and sorted matched conditions.
pub fn prevention_fingerprint(template_id: &str, action_id: &str, conditions: &[String]) -> String {
    let sorted: BTreeSet<&str> = conditions.iter().map(String::as_str).collect();
    let mut material = format!("{template_id}\n{action_id}\n");
    for condition in sorted {
        material.push_str(condition);
        material.push('\n');
    }
    sha256_digest(material.as_bytes())
}

/// Aggregate result of a repository-wide repair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RepairSummary {
    pub repaired: usize,
    pub failed: usize,
    pub pending_approval: usize,
}

impl From<&HealReport> for RepairSummary {
    fn from(report: &HealReport) -> Self {
        Self {
            repaired: report.repaired,
            failed: report.failed,
            pending_approval: report.pending_approval,
        }
    }
}

/// Seam between the `repair-artifacts` action and the blueprint pipeline.
pub trait RepairHook: Send + Sync {
    fn repair_all(&self) -> Result<RepairSummary, String>;
}

/// Repairs through the real evaluator, planner, and applier.
pub struct BlueprintRepairHook {
    evaluator: RuleEvaluator,
    planner: RepairPlanner,
    applier: RepairApplier,
}

impl BlueprintRepairHook {
    pub fn new(evaluator: RuleEvaluator, planner: RepairPlanner, applier: RepairApplier) -> Self {
        Self {
            evaluator,
            planner,
            applier,
        }
    }
}

impl RepairHook for BlueprintRepairHook {
    fn repair_all(&self) -> Result<RepairSummary, String> {
        let report = heal_repository(
            self.applier.store(),
            &self.evaluator,
            &self.planner,
            Some(&self.applier),
        );
        Ok(RepairSummary::from(&report))
    }
}

pub struct PreventionExecutor {
    mode: PreventionMode,
    root: PathBuf,
    ledger: PathBuf,
    detached_log_dir: PathBuf,
    run_id: String,
    command_timeout: Duration,
    runner: Arc<dyn CommandRunner>,
    repair: Option<Arc<dyn RepairHook>>,
    telemetry: Arc<dyn TelemetrySink>,
}

impl PreventionExecutor {
    pub fn new(
        paths: &ResolvedPaths,
        mode: PreventionMode,
        run_id: impl Into<String>,
        runner: Arc<dyn CommandRunner>,
        telemetry: Arc<dyn TelemetrySink>,
    ) -> Self {
        Self {
            mode,
            root: paths.root.clone(),
            ledger: paths.prevention_ledger.clone(),
            detached_log_dir: paths.detached_log_dir.clone(),
            run_id: run_id.into(),
            command_timeout: warden_core::command::DEFAULT_TIMEOUT,
            runner,
            repair: None,
            telemetry,
        }
    }

    pub fn with_repair_hook(mut self, hook: Arc<dyn RepairHook>) -> Self {
        self.repair = Some(hook);
        self
    }

    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    pub fn mode(&self) -> PreventionMode {
        self.mode
    }

    pub fn ledger_path(&self) -> &Path {
        &self.ledger
    }

    /// Decide, and in `execute` mode run, every prevention action of `alert`.
    pub fn execute(&self, alert: &PredictiveAlert) -> Vec<PreventionRecord> {
        if self.mode == PreventionMode::Off {
            return alert
                .prevention_actions
                .iter()
                .map(|step| {
                    self.record(
                        alert,
                        step,
                        PreventionStatus::Disabled,
                        "prevention mode is off".to_string(),
                    )
                })
                .collect();
        }

        let executed = match self.executed_fingerprints() {
            Ok(executed) => executed,
            Err(message) => {
                warn!(ledger = %self.ledger.display(), error = %message, "prevention ledger unreadable");
                return alert
                    .prevention_actions
                    .iter()
                    .map(|step| {
                        let record = self.record(
                            alert,
                            step,
                            PreventionStatus::Failed,
                            format!("prevention ledger unreadable: {message}"),
                        );
                        self.publish(&record);
                        record
                    })
                    .collect();
            }
        };

        let mut records = Vec::new();
        for step in &alert.prevention_actions {
            let fingerprint =
                prevention_fingerprint(&alert.pattern_id, &step.id, &alert.matched_conditions);
            let (status, detail) = if executed.contains(&fingerprint) {
                (
                    PreventionStatus::Skipped,
                    "already executed for the same evidence".to_string(),
                )
            } else if self.mode == PreventionMode::DryRun {
                (PreventionStatus::DryRun, format!("would run {}", self.describe(step)))
            } else {
                match self.run_action(step) {
                    Ok(detail) => (PreventionStatus::Executed, detail),
                    Err(detail) => (PreventionStatus::Failed, detail),
                }
            };
            let record = self.record(alert, step, status, detail);
            if let Err(err) = append_record(&self.ledger, &record) {
                warn!(ledger = %self.ledger.display(), error = %err, "failed to append prevention ledger");
            }
            self.publish(&record);
            records.push(record);
        }
        records
    }

    fn executed_fingerprints(&self) -> Result<BTreeSet<String>, String> {
        let records: Vec<PreventionRecord> =
            read_records_from_path(&self.ledger).map_err(|e| e.to_string())?;
        Ok(records
            .into_iter()
            .filter(|record| record.status == PreventionStatus::Executed)
            .map(|record| record.fingerprint)
            .collect())
    }

    fn describe(&self, step: &PreventionStep) -> String {
        match &step.action {
            PreventionAction::RepairArtifacts => "repair-artifacts".to_string(),
            PreventionAction::Command { program, args, .. } => {
                format!("`{}`", PreventionAction::command_spec(program, args).display())
            }
            PreventionAction::Detached { program, args, .. } => format!(
                "`{}` (detached)",
                PreventionAction::command_spec(program, args).display()
            ),
        }
    }

    fn run_action(&self, step: &PreventionStep) -> Result<String, String> {
        match &step.action {
            PreventionAction::RepairArtifacts => {
                let hook = self
                    .repair
                    .as_ref()
                    .ok_or_else(|| "no repair hook configured".to_string())?;
                let summary = hook.repair_all()?;
                if summary.failed > 0 {
                    return Err(format!(
                        "{} artifact repair(s) failed, {} repaired",
                        summary.failed, summary.repaired
                    ));
                }
                Ok(format!(
                    "repaired {} artifact(s), {} action(s) pending approval",
                    summary.repaired, summary.pending_approval
                ))
            }
            PreventionAction::Command {
                program,
                args,
                timeout_secs,
            } => {
                let timeout = timeout_secs
                    .map(Duration::from_secs)
                    .unwrap_or(self.command_timeout);
                let spec = PreventionAction::command_spec(program, args).with_timeout(timeout);
                let outcome = self.runner.run(&spec, &self.root);
                match outcome.failure_message() {
                    Some(message) => Err(message),
                    None => Ok(format!("`{}` succeeded in {}ms", spec.display(), outcome.elapsed_ms)),
                }
            }
            PreventionAction::Detached {
                program,
                args,
                log_file,
            } => {
                let spec = PreventionAction::command_spec(program, args);
                let log_path = match log_file {
                    Some(path) if Path::new(path).is_absolute() => PathBuf::from(path),
                    Some(path) => self.root.join(path),
                    None => self.detached_log_dir.join(format!("{}.log", step.id)),
                };
                let pid = spawn_detached(&spec, &self.root, &log_path)
                    .map_err(|e| format!("failed to start `{}`: {e}", spec.display()))?;
                Ok(format!(
                    "started `{}` as pid {pid}, output in {}",
                    spec.display(),
                    log_path.display()
                ))
            }
        }
    }

    fn record(
        &self,
        alert: &PredictiveAlert,
        step: &PreventionStep,
        status: PreventionStatus,
        detail: String,
    ) -> PreventionRecord {
        PreventionRecord {
            run_id: self.run_id.clone(),
            alert_id: alert.id.clone(),
            template_id: alert.pattern_id.clone(),
            action_id: step.id.clone(),
            fingerprint: prevention_fingerprint(
                &alert.pattern_id,
                &step.id,
                &alert.matched_conditions,
            ),
            mode: self.mode,
            status,
            detail,
            timestamp: Utc::now(),
        }
    }

    fn publish(&self, record: &PreventionRecord) {
        info!(
            template = %record.template_id,
            action = %record.action_id,
            status = %record.status,
            "prevention decision"
        );
        let severity = match record.status {
            PreventionStatus::Failed => Severity::High,
            PreventionStatus::Executed => Severity::Medium,
            _ => Severity::Low,
        };
        emit(
            self.telemetry.as_ref(),
            TelemetryEvent::new(
                format!("prevention.{}", record.status),
                severity,
                json!({
                    "alertId": record.alert_id,
                    "templateId": record.template_id,
                    "actionId": record.action_id,
                    "fingerprint": record.fingerprint,
                    "detail": record.detail,
                }),
            ),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use warden_core::{CommandOutcome, CommandStatus, MemorySink, TimeToViolation, WardenConfig};

    #[derive(Default)]
    struct RecordingRunner {
        calls: Mutex<Vec<String>>,
        fail: bool,
    }

    impl CommandRunner for RecordingRunner {
        fn run(&self, spec: &CommandSpec, _cwd: &Path) -> CommandOutcome {
            if let Ok(mut calls) = self.calls.lock() {
                calls.push(spec.display());
            }
            CommandOutcome {
                command: spec.display(),
                status: if self.fail {
                    CommandStatus::Failed { code: Some(2) }
                } else {
                    CommandStatus::Succeeded
                },
                stdout: String::new(),
                stderr: String::new(),
                elapsed_ms: 3,
            }
        }
    }

    struct CountingRepair(Mutex<usize>);

    impl RepairHook for CountingRepair {
        fn repair_all(&self) -> Result<RepairSummary, String> {
            let mut calls = self.0.lock().map_err(|e| e.to_string())?;
            *calls += 1;
            Ok(RepairSummary {
                repaired: 2,
                failed: 0,
                pending_approval: 1,
            })
        }
    }

    fn alert(steps: Vec<PreventionStep>) -> PredictiveAlert {
        PredictiveAlert {
            id: "alert-1".to_string(),
            pattern_id: "framework-core-drift".to_string(),
            risk_level: Severity::Critical,
            confidence: 0.9,
            evidence: vec!["blueprint files modified".to_string()],
            matched_conditions: vec!["staged".to_string(), "blueprints-modified".to_string()],
            time_to_violation: TimeToViolation::Immediate,
            prevention_actions: steps,
            auto_preventable: true,
        }
    }

    fn command_step() -> PreventionStep {
        PreventionStep {
            id: "lint".to_string(),
            description: "lint".to_string(),
            action: PreventionAction::Command {
                program: "make".to_string(),
                args: vec!["lint".to_string()],
                timeout_secs: Some(5),
            },
        }
    }

    fn repair_step() -> PreventionStep {
        PreventionStep {
            id: "repair".to_string(),
            description: String::new(),
            action: PreventionAction::RepairArtifacts,
        }
    }

    fn executor(
        dir: &Path,
        mode: PreventionMode,
        runner: Arc<RecordingRunner>,
        sink: Arc<MemorySink>,
    ) -> PreventionExecutor {
        let paths = WardenConfig::default().resolve_paths(dir);
        PreventionExecutor::new(&paths, mode, "run-1", runner, sink)
    }

    #[test]
    fn steps_parse_from_flat_catalog_json() {
        let step: PreventionStep = serde_json::from_value(json!({
            "id": "serve",
            "kind": "detached",
            "program": "warden",
            "args": ["monitor"],
            "logFile": "logs/serve.log"
        }))
        .expect("step parses");
        assert_eq!(
            step.action,
            PreventionAction::Detached {
                program: "warden".to_string(),
                args: vec!["monitor".to_string()],
                log_file: Some("logs/serve.log".to_string()),
            }
        );
        assert_eq!(step.action.kind(), "detached");
    }

    #[test]
    fn fingerprint_ignores_condition_order() {
        let a = prevention_fingerprint("t", "a", &["x".to_string(), "y".to_string()]);
        let b = prevention_fingerprint("t", "a", &["y".to_string(), "x".to_string()]);
        let c = prevention_fingerprint("t", "b", &["x".to_string(), "y".to_string()]);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.starts_with("sha256:"));
    }

    #[test]
    fn dry_run_records_without_running() {
        let dir = tempfile::tempdir().expect("tempdir");
        let runner = Arc::new(RecordingRunner::default());
        let sink = Arc::new(MemorySink::new());
        let exec = executor(dir.path(), PreventionMode::DryRun, runner.clone(), sink.clone());

        let records = exec.execute(&alert(vec![command_step()]));
        assert_eq!(records[0].status, PreventionStatus::DryRun);
        assert_eq!(records[0].detail, "would run `make lint`");
        assert!(runner.calls.lock().expect("calls").is_empty());
        assert_eq!(sink.event_types(), vec!["prevention.dry-run".to_string()]);

        // A dry run does not count as executed.
        let exec = executor(dir.path(), PreventionMode::Execute, runner.clone(), sink);
        assert_eq!(exec.execute(&alert(vec![command_step()]))[0].status, PreventionStatus::Executed);
    }

    #[test]
    fn execute_runs_once_per_fingerprint() {
        let dir = tempfile::tempdir().expect("tempdir");
        let runner = Arc::new(RecordingRunner::default());
        let sink = Arc::new(MemorySink::new());
        let exec = executor(dir.path(), PreventionMode::Execute, runner.clone(), sink);

        let first = exec.execute(&alert(vec![command_step()]));
        assert_eq!(first[0].status, PreventionStatus::Executed);
        let second = exec.execute(&alert(vec![command_step()]));
        assert_eq!(second[0].status, PreventionStatus::Skipped);
        assert_eq!(first[0].fingerprint, second[0].fingerprint);
        assert_eq!(runner.calls.lock().expect("calls").len(), 1);

        let ledger: Vec<PreventionRecord> =
            read_records_from_path(exec.ledger_path()).expect("ledger");
        assert_eq!(ledger.len(), 2);
    }

    #[test]
    fn failed_actions_are_retried() {
        let dir = tempfile::tempdir().expect("tempdir");
        let runner = Arc::new(RecordingRunner {
            fail: true,
            ..RecordingRunner::default()
        });
        let sink = Arc::new(MemorySink::new());
        let exec = executor(dir.path(), PreventionMode::Execute, runner.clone(), sink.clone());

        assert_eq!(exec.execute(&alert(vec![command_step()]))[0].status, PreventionStatus::Failed);
        assert_eq!(exec.execute(&alert(vec![command_step()]))[0].status, PreventionStatus::Failed);
        assert_eq!(runner.calls.lock().expect("calls").len(), 2);
        assert_eq!(sink.event_types()[0], "prevention.failed");
    }

    #[test]
    fn off_mode_writes_nothing() {
        let dir = tempfile::tempdir().expect("tempdir");
        let runner = Arc::new(RecordingRunner::default());
        let sink = Arc::new(MemorySink::new());
        let exec = executor(dir.path(), PreventionMode::Off, runner, sink.clone());
        let records = exec.execute(&alert(vec![command_step()]));
        assert_eq!(records[0].status, PreventionStatus::Disabled);
        assert!(!exec.ledger_path().exists());
        assert!(sink.events().is_empty());
    }

    #[test]
    fn repair_action_uses_the_hook() {
        let dir = tempfile::tempdir().expect("tempdir");
        let runner = Arc::new(RecordingRunner::default());
        let sink = Arc::new(MemorySink::new());
        let hook = Arc::new(CountingRepair(Mutex::new(0)));

        let without = executor(dir.path(), PreventionMode::Execute, runner.clone(), sink.clone());
        let records = without.execute(&alert(vec![repair_step()]));
        assert_eq!(records[0].status, PreventionStatus::Failed);
        assert_eq!(records[0].detail, "no repair hook configured");

        let with = executor(dir.path(), PreventionMode::Execute, runner, sink)
            .with_repair_hook(hook.clone());
        let records = with.execute(&alert(vec![repair_step()]));
        assert_eq!(records[0].status, PreventionStatus::Executed);
        assert_eq!(records[0].detail, "repaired 2 artifact(s), 1 action(s) pending approval");
        assert_eq!(*hook.0.lock().expect("calls"), 1);
    }

    #[test]
    fn invalid_actions_fail_validation() {
        assert!(PreventionAction::Command {
            program: " ".to_string(),
            args: Vec::new(),
            timeout_secs: None,
        }
        .validate()
        .is_err());
        assert!(PreventionAction::Command {
            program: "make".to_string(),
            args: Vec::new(),
            timeout_secs: Some(0),
        }
        .validate()
        .is_err());
        assert!(PreventionAction::RepairArtifacts.validate().is_ok());
    }

    #[cfg(unix)]
    #[test]
    fn detached_action_writes_to_its_log() {
        let dir = tempfile::tempdir().expect("tempdir");
        let runner = Arc::new(RecordingRunner::default());
        let sink = Arc::new(MemorySink::new());
        let exec = executor(dir.path(), PreventionMode::Execute, runner.clone(), sink);
        let step = PreventionStep {
            id: "background".to_string(),
            description: String::new(),
            action: PreventionAction::Detached {
                program: "sh".to_string(),
                args: vec!["-c".to_string(), "true".to_string()],
                log_file: None,
            },
        };
        let records = exec.execute(&alert(vec![step]));
        assert_eq!(records[0].status, PreventionStatus::Executed);
        assert!(dir.path().join(".warden/logs/detached/background.log").exists());
        assert!(runner.calls.lock().expect("calls").is_empty());
    }
}
