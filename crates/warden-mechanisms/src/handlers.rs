//! Built-in mechanism handlers.
//!
//! Each handler drives one real component through its public entry point
//! against a throwaway repository, then reports what it observed. External
//! commands are never run: handlers inject a command runner that refuses or
//! counts instead.

use crate::catalog::MechanismError;
use crate::registry::{HandlerRegistry, MechanismHandler, Observation, observation};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value, json};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tempfile::TempDir;
use warden_blueprint::{
    Artifact, ArtifactStore, HealthReport, KeyPath, RepairApplier, RepairPlanner, RuleEvaluator,
    heal_repository, read_repair_log, scan_artifact,
};
use warden_core::{
    CommandOutcome, CommandRunner, CommandSpec, CommandStatus, FrameworkConfig, NullSink,
    PreventionMode, RepoLock, ResolvedPaths, Severity, TimeToViolation, WardenConfig,
    read_records_from_path,
};
use warden_patterns::{HistoricalEvent, PatternStore};
use warden_predict::{
    Catalog, CompliancePattern, PredictiveAlert, PredictiveMonitor, PreventionAction,
    PreventionExecutor, PreventionRecord, PreventionStep, ProbeContext, RepoState,
};

pub const RULE_EVALUATOR: &str = "blueprint.rule-evaluator";
pub const REPAIR_APPLIER: &str = "blueprint.repair-applier";
pub const ATOMIC_ROLLBACK: &str = "blueprint.atomic-rollback";
pub const PATTERN_STORE: &str = "patterns.store";
pub const PREDICTIVE_MONITOR: &str = "predict.monitor";
pub const PREVENTION_IDEMPOTENCE: &str = "predict.prevention-idempotence";

const RUN_ID: &str = "mechanism-validation";
const DEFAULT_FILE_NAME: &str = "fixture.yaml";
const MAX_PREVENTION_RUNS: usize = 20;

/// Registry with every built-in handler.
pub fn builtin_registry(framework: &FrameworkConfig) -> HandlerRegistry {
    let mut registry = HandlerRegistry::new();
    registry
        .register(RULE_EVALUATOR, Arc::new(RuleEvaluatorMechanism::new(framework.clone())))
        .register(REPAIR_APPLIER, Arc::new(RepairApplierMechanism::new(framework.clone())))
        .register(ATOMIC_ROLLBACK, Arc::new(AtomicRollbackMechanism::new(framework.clone())))
        .register(PATTERN_STORE, Arc::new(PatternStoreMechanism))
        .register(PREDICTIVE_MONITOR, Arc::new(MonitorMechanism::new(framework.clone())))
        .register(PREVENTION_IDEMPOTENCE, Arc::new(PreventionIdempotenceMechanism));
    registry
}

fn text<'a>(fixture: &'a Value, key: &str) -> Result<&'a str, MechanismError> {
    fixture
        .get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| MechanismError::Fixture(format!("`{key}` must be a string")))
}

/// Optional typed field; absent and `null` both read as `None`.
fn field<T: DeserializeOwned>(fixture: &Value, key: &str) -> Result<Option<T>, MechanismError> {
    match fixture.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => serde_json::from_value(value.clone())
            .map(Some)
            .map_err(|e| MechanismError::Fixture(format!("`{key}`: {e}"))),
    }
}

fn file_name(fixture: &Value) -> Result<String, MechanismError> {
    let name = field::<String>(fixture, "fileName")?.unwrap_or_else(|| DEFAULT_FILE_NAME.to_string());
    let plain = Path::new(&name)
        .file_name()
        .is_some_and(|base| base.to_str() == Some(name.as_str()));
    if !plain {
        return Err(MechanismError::Fixture(format!(
            "`fileName` must be a plain file name, got `{name}`"
        )));
    }
    Ok(name)
}

fn execution(error: impl std::fmt::Display) -> MechanismError {
    MechanismError::Execution(error.to_string())
}

/// Evaluate YAML text as if it were a file called `name`.
fn evaluate_text(evaluator: &RuleEvaluator, name: &str, yaml: &str) -> HealthReport {
    let path = Path::new(name);
    match Artifact::parse(path, yaml.to_string()) {
        Ok(artifact) => evaluator.evaluate(&artifact),
        Err(err) => evaluator.parse_failure(path, &err.to_string(), None),
    }
}

/// Throwaway repository with the default layout.
struct Sandbox {
    _dir: TempDir,
    paths: ResolvedPaths,
    store: ArtifactStore,
}

impl Sandbox {
    fn new() -> Result<Self, MechanismError> {
        let dir = tempfile::tempdir().map_err(execution)?;
        let paths = WardenConfig::default().resolve_paths(dir.path());
        let store = ArtifactStore::from_paths(&paths);
        Ok(Self {
            _dir: dir,
            paths,
            store,
        })
    }

    fn write_artifact(&self, name: &str, text: &str) -> Result<PathBuf, MechanismError> {
        let root = self
            .paths
            .blueprint_roots
            .first()
            .ok_or_else(|| execution("no blueprint root configured"))?;
        fs::create_dir_all(root).map_err(execution)?;
        let path = root.join(name);
        fs::write(&path, text).map_err(execution)?;
        Ok(path)
    }

    fn applier(&self) -> RepairApplier {
        RepairApplier::new(
            self.store.clone(),
            &self.paths.lock_file,
            &self.paths.repair_log,
            RUN_ID,
            Arc::new(NullSink),
        )
    }

    fn repair_log_entries(&self) -> Result<usize, MechanismError> {
        read_repair_log(&self.paths.repair_log)
            .map(|entries| entries.len())
            .map_err(execution)
    }
}

/// Refuses every command.
struct OfflineRunner;

impl CommandRunner for OfflineRunner {
    fn run(&self, spec: &CommandSpec, _cwd: &Path) -> CommandOutcome {
        CommandOutcome {
            command: spec.display(),
            status: CommandStatus::Unavailable {
                message: "external commands are disabled during mechanism validation".to_string(),
            },
            stdout: String::new(),
            stderr: String::new(),
            elapsed_ms: 0,
        }
    }
}

/// Succeeds without running anything and counts calls.
#[derive(Default)]
struct CountingRunner {
    calls: AtomicUsize,
}

impl CommandRunner for CountingRunner {
    fn run(&self, spec: &CommandSpec, _cwd: &Path) -> CommandOutcome {
        self.calls.fetch_add(1, Ordering::SeqCst);
        CommandOutcome {
            command: spec.display(),
            status: CommandStatus::Succeeded,
            stdout: String::new(),
            stderr: String::new(),
            elapsed_ms: 0,
        }
    }
}

/// Fixture `{fileName?, yaml}`.
pub struct RuleEvaluatorMechanism {
    evaluator: RuleEvaluator,
}

impl RuleEvaluatorMechanism {
    pub fn new(framework: FrameworkConfig) -> Self {
        Self {
            evaluator: RuleEvaluator::new(framework),
        }
    }
}

impl MechanismHandler for RuleEvaluatorMechanism {
    fn run(&self, fixture: &Value) -> Result<Observation, MechanismError> {
        let name = file_name(fixture)?;
        let yaml = text(fixture, "yaml")?;
        let first = evaluate_text(&self.evaluator, &name, yaml);
        let second = evaluate_text(&self.evaluator, &name, yaml);
        let issue_ids: Vec<&str> = first.issues.iter().map(|issue| issue.id.as_str()).collect();
        Ok(observation([
            ("status", json!(first.status)),
            ("score", json!(first.score)),
            ("issueCount", json!(first.issues.len())),
            ("issueIds", json!(issue_ids)),
            ("autoFixable", json!(first.auto_fixable().count())),
            (
                "deterministic",
                json!(first.issues == second.issues && first.score == second.score),
            ),
        ]))
    }
}

/// Fixture `{fileName?, yaml, inspect?: [keyPath]}`; heals twice.
pub struct RepairApplierMechanism {
    evaluator: RuleEvaluator,
    framework: FrameworkConfig,
}

impl RepairApplierMechanism {
    pub fn new(framework: FrameworkConfig) -> Self {
        Self {
            evaluator: RuleEvaluator::new(framework.clone()),
            framework,
        }
    }
}

impl MechanismHandler for RepairApplierMechanism {
    fn run(&self, fixture: &Value) -> Result<Observation, MechanismError> {
        let name = file_name(fixture)?;
        let yaml = text(fixture, "yaml")?;
        let inspect: Vec<String> = field(fixture, "inspect")?.unwrap_or_default();

        let sandbox = Sandbox::new()?;
        let path = sandbox.write_artifact(&name, yaml)?;
        let planner = RepairPlanner::with_defaults(self.framework.clone()).map_err(execution)?;
        let applier = sandbox.applier();

        let first = heal_repository(&sandbox.store, &self.evaluator, &planner, Some(&applier));
        let second = heal_repository(&sandbox.store, &self.evaluator, &planner, Some(&applier));
        let outcome = first
            .artifacts
            .first()
            .ok_or_else(|| execution("fixture artifact was not discovered"))?;
        let repair = outcome.repair.as_ref();

        let mut observed = observation([
            ("modified", json!(repair.is_some_and(|r| r.modified))),
            ("applied", json!(repair.map_or(0, |r| r.applied.len()))),
            ("pendingApproval", json!(first.pending_approval)),
            ("failed", json!(first.failed > 0)),
            ("statusBefore", json!(outcome.before.status)),
            ("statusAfter", json!(outcome.after.status)),
            ("scoreAfter", json!(outcome.after.score)),
            ("repairLogEntries", json!(sandbox.repair_log_entries()?)),
            ("idempotent", json!(second.repaired == 0 && second.failed == 0)),
        ]);

        if !inspect.is_empty() {
            let artifact = sandbox.store.load(&path).map_err(execution)?;
            for key in inspect {
                let key_path = KeyPath::parse(&key)
                    .map_err(|e| MechanismError::Fixture(e.to_string()))?;
                let value = match artifact.get(&key_path) {
                    Some(value) => serde_json::to_value(value).map_err(execution)?,
                    None => Value::Null,
                };
                observed.insert(format!("after.{key}"), value);
            }
        }
        Ok(observed)
    }
}

/// Fixture `{fileName?, yaml, concurrentEdit?, holdLock?}`.
///
/// Plans repairs for `yaml`, then disturbs the repository before applying:
/// `concurrentEdit` rewrites the file, `holdLock` keeps the repository lock.
pub struct AtomicRollbackMechanism {
    evaluator: RuleEvaluator,
    framework: FrameworkConfig,
}

impl AtomicRollbackMechanism {
    pub fn new(framework: FrameworkConfig) -> Self {
        Self {
            evaluator: RuleEvaluator::new(framework.clone()),
            framework,
        }
    }
}

impl MechanismHandler for AtomicRollbackMechanism {
    fn run(&self, fixture: &Value) -> Result<Observation, MechanismError> {
        let name = file_name(fixture)?;
        let yaml = text(fixture, "yaml")?;
        let concurrent_edit: Option<String> = field(fixture, "concurrentEdit")?;
        let hold_lock = field::<bool>(fixture, "holdLock")?.unwrap_or(false);

        let sandbox = Sandbox::new()?;
        let path = sandbox.write_artifact(&name, yaml)?;
        let planner = RepairPlanner::with_defaults(self.framework.clone()).map_err(execution)?;
        let scan = scan_artifact(&sandbox.store, &self.evaluator, &path);
        let artifact = scan
            .artifact
            .ok_or_else(|| MechanismError::Fixture("`yaml` must parse".to_string()))?;
        let report = planner.plan_report(scan.report, &artifact);

        if let Some(edit) = &concurrent_edit {
            fs::write(&path, edit).map_err(execution)?;
        }
        let guard = if hold_lock {
            Some(RepoLock::acquire(&sandbox.paths.lock_file).map_err(execution)?)
        } else {
            None
        };
        let outcome = sandbox.applier().apply(&report);
        drop(guard);

        let expected_bytes = concurrent_edit.as_deref().unwrap_or(yaml);
        let on_disk = fs::read_to_string(&path).map_err(execution)?;
        Ok(observation([
            ("failed", json!(outcome.failed())),
            ("modified", json!(outcome.modified)),
            ("bytesPreserved", json!(on_disk == expected_bytes)),
            ("lockReleased", json!(!sandbox.paths.lock_file.exists())),
            ("repairLogEntries", json!(sandbox.repair_log_entries()?)),
        ]))
    }
}

/// Fixture `{events: [HistoricalEvent]}`.
pub struct PatternStoreMechanism;

impl MechanismHandler for PatternStoreMechanism {
    fn run(&self, fixture: &Value) -> Result<Observation, MechanismError> {
        let events: Vec<HistoricalEvent> = field(fixture, "events")?.unwrap_or_default();

        let mut forward = PatternStore::new();
        forward.ingest(events.clone());
        let mut reversed = PatternStore::new();
        reversed.ingest(events.into_iter().rev().collect());

        let patterns = forward.patterns();
        let frequencies: Map<String, Value> = patterns
            .iter()
            .map(|pattern| (pattern.id.clone(), json!(pattern.frequency)))
            .collect();
        let confidences: Map<String, Value> = patterns
            .iter()
            .map(|pattern| (pattern.id.clone(), json!(pattern.confidence)))
            .collect();
        Ok(observation([
            ("patternCount", json!(patterns.len())),
            ("rejected", json!(forward.stats().rejected)),
            (
                "recurring",
                json!(patterns.iter().filter(|pattern| pattern.is_recurring()).count()),
            ),
            ("frequencies", Value::Object(frequencies)),
            ("confidences", Value::Object(confidences)),
            ("insights", json!(forward.insights().len())),
            ("orderIndependent", json!(patterns == reversed.patterns())),
        ]))
    }
}

/// Fixture `{changedFiles?, stagedFiles?, vcsAvailable?, lastValidation?,
/// now?, events?, artifacts?: [{fileName?, yaml}], templates?}`.
pub struct MonitorMechanism {
    evaluator: RuleEvaluator,
}

impl MonitorMechanism {
    pub fn new(framework: FrameworkConfig) -> Self {
        Self {
            evaluator: RuleEvaluator::new(framework),
        }
    }
}

impl MechanismHandler for MonitorMechanism {
    fn run(&self, fixture: &Value) -> Result<Observation, MechanismError> {
        let repo = RepoState {
            changed_files: field(fixture, "changedFiles")?.unwrap_or_default(),
            staged_files: field(fixture, "stagedFiles")?.unwrap_or_default(),
            last_validation: field(fixture, "lastValidation")?,
            document_mtimes: BTreeMap::new(),
            vcs_available: field(fixture, "vcsAvailable")?.unwrap_or(true),
            collection_errors: Vec::new(),
        };
        let now: DateTime<Utc> = field(fixture, "now")?.unwrap_or_else(Utc::now);

        let events: Vec<HistoricalEvent> = field(fixture, "events")?.unwrap_or_default();
        let mut store = PatternStore::new();
        store.ingest(events);
        let patterns = store.patterns();

        let artifacts: Vec<Value> = field(fixture, "artifacts")?.unwrap_or_default();
        let health = artifacts
            .iter()
            .map(|artifact| -> Result<HealthReport, MechanismError> {
                let name = file_name(artifact)?;
                Ok(evaluate_text(&self.evaluator, &name, text(artifact, "yaml")?))
            })
            .collect::<Result<Vec<_>, MechanismError>>()?;

        let catalog = match field::<Vec<CompliancePattern>>(fixture, "templates")? {
            Some(templates) => {
                Catalog::new(templates).map_err(|e| MechanismError::Fixture(e.to_string()))?
            }
            None => Catalog::builtin().map_err(execution)?,
        };

        let ctx = ProbeContext {
            root: Path::new("."),
            repo: &repo,
            patterns: &patterns,
            health: &health,
            runner: &OfflineRunner,
            command_timeout: Duration::from_secs(1),
            now,
        };
        let result = PredictiveMonitor::new(catalog).monitor(&ctx);
        let mut alert_patterns: Vec<&str> = result
            .alerts
            .iter()
            .map(|alert| alert.pattern_id.as_str())
            .collect();
        alert_patterns.sort_unstable();
        Ok(observation([
            ("status", json!(result.status)),
            ("overallRiskScore", json!(result.overall_risk_score)),
            ("alertCount", json!(result.alerts.len())),
            ("alertPatterns", json!(alert_patterns)),
            (
                "criticalAlerts",
                json!(result
                    .alerts
                    .iter()
                    .filter(|alert| alert.risk_level == Severity::Critical)
                    .count()),
            ),
            (
                "autoPreventable",
                json!(result.alerts.iter().filter(|alert| alert.auto_preventable).count()),
            ),
            ("probeErrors", json!(result.probe_errors.len())),
        ]))
    }
}

/// Fixture `{mode?, runs?, conditions?}`; repeats one alert `runs` times.
pub struct PreventionIdempotenceMechanism;

impl MechanismHandler for PreventionIdempotenceMechanism {
    fn run(&self, fixture: &Value) -> Result<Observation, MechanismError> {
        let mode: PreventionMode = field(fixture, "mode")?.unwrap_or(PreventionMode::Execute);
        let runs: usize = field(fixture, "runs")?.unwrap_or(2);
        if runs == 0 || runs > MAX_PREVENTION_RUNS {
            return Err(MechanismError::Fixture(format!(
                "`runs` must be within 1..={MAX_PREVENTION_RUNS}"
            )));
        }
        let conditions: Vec<String> = field(fixture, "conditions")?
            .unwrap_or_else(|| vec!["self-test".to_string()]);

        let sandbox = Sandbox::new()?;
        let runner = Arc::new(CountingRunner::default());
        let executor = PreventionExecutor::new(
            &sandbox.paths,
            mode,
            RUN_ID,
            runner.clone(),
            Arc::new(NullSink),
        );
        let alert = PredictiveAlert {
            id: "self-test".to_string(),
            pattern_id: "self-test".to_string(),
            risk_level: Severity::Critical,
            confidence: 1.0,
            evidence: Vec::new(),
            matched_conditions: conditions,
            time_to_violation: TimeToViolation::Immediate,
            prevention_actions: vec![PreventionStep {
                id: "self-test-command".to_string(),
                description: "counted, never executed".to_string(),
                action: PreventionAction::Command {
                    program: "warden-self-test".to_string(),
                    args: Vec::new(),
                    timeout_secs: Some(1),
                },
            }],
            auto_preventable: true,
        };

        let statuses: Vec<&str> = (0..runs)
            .flat_map(|_| executor.execute(&alert))
            .map(|record| record.status.as_str())
            .collect();
        let ledger: Vec<PreventionRecord> =
            read_records_from_path(executor.ledger_path()).map_err(execution)?;
        Ok(observation([
            ("statuses", json!(statuses)),
            ("commandRuns", json!(runner.calls.load(Ordering::SeqCst))),
            ("ledgerRecords", json!(ledger.len())),
        ]))
    }
}
