use crate::support::{
    Context, PAYLOAD_SCHEMA, exit_error, ok_or_fail, print_json_or_exit, result_label,
};
use serde_json::json;
use warden_blueprint::{
    ArtifactStore, HealOutcome, RepairApplier, RepairPlanner, RuleEvaluator, heal_repository,
};

const CHECK_KIND: &str = "warden.heal.v1";

pub fn run(ctx: &Context, fix: bool, json_output: bool) {
    let framework = &ctx.config.framework;
    let store = ArtifactStore::from_paths(&ctx.paths);
    let evaluator = RuleEvaluator::new(framework.clone());
    let planner = RepairPlanner::with_defaults(framework.clone()).unwrap_or_else(|e| exit_error(e));
    let applier = fix.then(|| {
        RepairApplier::new(
            store.clone(),
            ctx.paths.lock_file.clone(),
            ctx.paths.repair_log.clone(),
            ctx.run_id.clone(),
            ctx.telemetry.clone(),
        )
    });

    let report = heal_repository(&store, &evaluator, &planner, applier.as_ref());
    let failing = report.summary.is_failing();
    let mode = if fix { "fix" } else { "plan" };

    if json_output {
        let payload = json!({
            "schema": PAYLOAD_SCHEMA,
            "checkKind": CHECK_KIND,
            "runId": ctx.run_id,
            "mode": mode,
            "result": result_label(failing),
            "repaired": report.repaired,
            "failed": report.failed,
            "pendingApproval": report.pending_approval,
            "summary": report.summary,
            "artifacts": report.artifacts,
            "walkFailures": report.walk_failures,
        });
        print_json_or_exit(&payload, "heal");
    } else {
        println!(
            "[heal] {} (mode={mode}, artifacts={}, repaired={}, failed={}, pendingApproval={})",
            ok_or_fail(failing),
            report.summary.artifacts,
            report.repaired,
            report.failed,
            report.pending_approval
        );
        for outcome in &report.artifacts {
            print_outcome(outcome, fix);
        }
        for failure in &report.walk_failures {
            println!("  ! {failure}");
        }
    }

    if failing {
        std::process::exit(1);
    }
}

fn print_outcome(outcome: &HealOutcome, fix: bool) {
    println!("  - {}", outcome.after.summary_line());
    match &outcome.repair {
        Some(repair) => {
            for applied in &repair.applied {
                println!("      applied {}: {}", applied.issue_id, applied.description);
            }
            for action in &repair.pending_approval {
                println!("      needs approval {}: {}", action.issue_id, action.description);
            }
            if let Some(failure) = &repair.failure {
                println!("      failed: {}", failure.message);
            }
            if let Some(log_error) = &repair.log_error {
                println!("      repair log: {log_error}");
            }
        }
        None if !fix => {
            for action in &outcome.before.actions {
                let approval = if action.requires_approval {
                    " (needs approval)"
                } else {
                    ""
                };
                println!("      plan {}: {}{approval}", action.issue_id, action.description);
            }
        }
        None => {}
    }
}
