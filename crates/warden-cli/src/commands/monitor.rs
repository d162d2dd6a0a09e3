use crate::support::{
    Context, PAYLOAD_SCHEMA, exit_error, ok_or_fail, print_json_or_exit, result_label,
};
use chrono::Utc;
use serde_json::json;
use std::sync::Arc;
use tracing::warn;
use warden_blueprint::{
    ArtifactStore, RepairApplier, RepairPlanner, RuleEvaluator, scan_repository,
};
use warden_core::{PreventionMode, SystemCommandRunner};
use warden_patterns::PatternStore;
use warden_predict::{
    AlertHistory, BlueprintRepairHook, Catalog, MonitoringResult, PredictiveMonitor,
    PreventionExecutor, ProbeContext, RepoState,
};

const CHECK_KIND: &str = "warden.monitor.v1";

pub fn run(ctx: &Context, auto_prevent: bool, json_output: bool) {
    let config = &ctx.config;
    let catalog_path = config.monitor.catalog.as_deref().map(|path| ctx.resolve(path));
    let catalog = Catalog::load(catalog_path.as_deref()).unwrap_or_else(|e| exit_error(e));
    let timeout = config.command_timeout();
    let runner = Arc::new(SystemCommandRunner);

    let store = ArtifactStore::from_paths(&ctx.paths);
    let evaluator = RuleEvaluator::new(config.framework.clone());
    let health = scan_repository(&store, &evaluator, ctx.telemetry.as_ref()).reports;
    let pattern_store = PatternStore::from_events_dir(&ctx.paths.events_dir);
    let patterns = pattern_store.patterns();
    let repo = RepoState::collect(
        &ctx.paths.root,
        &ctx.paths.validation_log,
        &catalog.documents(),
        runner.as_ref(),
        timeout,
    );

    let mode = if auto_prevent {
        PreventionMode::Execute
    } else {
        config.monitor.prevention
    };
    let planner =
        RepairPlanner::with_defaults(config.framework.clone()).unwrap_or_else(|e| exit_error(e));
    let applier = RepairApplier::new(
        store.clone(),
        ctx.paths.lock_file.clone(),
        ctx.paths.repair_log.clone(),
        ctx.run_id.clone(),
        ctx.telemetry.clone(),
    );
    let executor = PreventionExecutor::new(
        &ctx.paths,
        mode,
        ctx.run_id.clone(),
        runner.clone(),
        ctx.telemetry.clone(),
    )
    .with_command_timeout(timeout)
    .with_repair_hook(Arc::new(BlueprintRepairHook::new(
        evaluator.clone(),
        planner,
        applier,
    )));

    let probe_ctx = ProbeContext {
        root: &ctx.paths.root,
        repo: &repo,
        patterns: &patterns,
        health: &health,
        runner: runner.as_ref(),
        command_timeout: timeout,
        now: Utc::now(),
    };
    let result = PredictiveMonitor::new(catalog).run(&probe_ctx, &executor, ctx.telemetry.as_ref());

    let history = AlertHistory::new(&ctx.paths.alert_history, config.monitor.alert_history_limit);
    if let Err(err) = history.record(&ctx.run_id, &result.alerts, result.evaluated_at) {
        warn!(path = %history.path().display(), error = %err, "failed to update alert history");
    }

    let failing = result.status.is_failing();
    if json_output {
        let payload = json!({
            "schema": PAYLOAD_SCHEMA,
            "checkKind": CHECK_KIND,
            "runId": ctx.run_id,
            "preventionMode": mode,
            "result": result_label(failing),
            "repoState": repo,
            "monitoring": result,
        });
        print_json_or_exit(&payload, "monitor");
    } else {
        print_human(&result, &repo, mode, failing);
    }

    if failing {
        std::process::exit(1);
    }
}

fn print_human(result: &MonitoringResult, repo: &RepoState, mode: PreventionMode, failing: bool) {
    println!(
        "{} [{}] (prevention={})",
        result.summary_line(),
        ok_or_fail(failing),
        mode.as_str()
    );
    for alert in &result.alerts {
        println!(
            "  - {} {} (confidence {:.2}, {}{})",
            alert.pattern_id,
            alert.risk_level.as_str(),
            alert.confidence,
            alert.time_to_violation.window(),
            if alert.auto_preventable {
                ", auto-preventable"
            } else {
                ""
            }
        );
        for line in &alert.evidence {
            println!("      {line}");
        }
    }
    for record in &result.preventions {
        println!(
            "  > {}/{}: {} ({})",
            record.template_id, record.action_id, record.status, record.detail
        );
    }
    for failure in &result.probe_errors {
        println!(
            "  ! {}/{}: {}",
            failure.template_id, failure.condition_id, failure.message
        );
    }
    for error in &repo.collection_errors {
        println!("  ! repository state: {error}");
    }
}
