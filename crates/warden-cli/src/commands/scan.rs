use crate::support::{Context, PAYLOAD_SCHEMA, ok_or_fail, print_json_or_exit, result_label};
use serde_json::json;
use warden_blueprint::{ArtifactStore, RuleEvaluator, scan_repository};

const CHECK_KIND: &str = "warden.scan.v1";

pub fn run(ctx: &Context, json_output: bool) {
    let store = ArtifactStore::from_paths(&ctx.paths);
    let evaluator = RuleEvaluator::new(ctx.config.framework.clone());
    let scan = scan_repository(&store, &evaluator, ctx.telemetry.as_ref());
    let failing = scan.summary.is_failing();

    if json_output {
        let payload = json!({
            "schema": PAYLOAD_SCHEMA,
            "checkKind": CHECK_KIND,
            "runId": ctx.run_id,
            "result": result_label(failing),
            "summary": scan.summary,
            "reports": scan.reports,
            "walkFailures": scan.walk_failures,
        });
        print_json_or_exit(&payload, "scan");
    } else {
        println!(
            "[scan] {} (artifacts={}, issues={}, autoFixable={}, averageScore={:.1})",
            ok_or_fail(failing),
            scan.summary.artifacts,
            scan.summary.total_issues,
            scan.summary.auto_fixable,
            scan.summary.average_score
        );
        for report in &scan.reports {
            println!("  - {}", report.summary_line());
            for issue in &report.issues {
                let fix = if issue.auto_fixable { ", fixable" } else { "" };
                println!(
                    "      {} ({}{fix}): {}",
                    issue.id,
                    issue.severity.as_str(),
                    issue.suggestion
                );
            }
        }
        for failure in &scan.walk_failures {
            println!("  ! {failure}");
        }
    }

    if failing {
        std::process::exit(1);
    }
}
