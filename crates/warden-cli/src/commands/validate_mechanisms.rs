use crate::support::{Context, PAYLOAD_SCHEMA, exit_error, print_json_or_exit, result_label};
use serde_json::json;
use tracing::warn;
use warden_core::{TelemetryEvent, emit};
use warden_mechanisms::{
    MechanismCatalog, MechanismValidator, SystematicValidationReport, builtin_registry,
    record_feedback, report_severity,
};

const CHECK_KIND: &str = "warden.validate_mechanisms.v1";

pub fn run(ctx: &Context, catalog_arg: Option<String>, json_output: bool) {
    let catalog_path = catalog_arg
        .as_deref()
        .or(ctx.config.mechanisms.catalog.as_deref())
        .map(|path| ctx.resolve(path));
    let catalog = MechanismCatalog::load(catalog_path.as_deref()).unwrap_or_else(|e| exit_error(e));
    let validator = MechanismValidator::new(catalog, builtin_registry(&ctx.config.framework));
    let report = validator.validate_all();

    let feedback = match record_feedback(
        &report,
        &ctx.run_id,
        &ctx.paths.events_dir,
        &ctx.paths.validation_log,
    ) {
        Ok(outcome) => Some(outcome),
        Err(err) => {
            warn!(error = %err, "failed to record validation feedback");
            None
        }
    };
    emit(
        ctx.telemetry.as_ref(),
        TelemetryEvent::new(
            "validation.completed",
            report_severity(&report),
            json!({
                "overallStatus": report.overall_status,
                "mechanisms": report.summary.mechanisms,
                "testsFailed": report.summary.tests_failed,
            }),
        ),
    );

    let failing = report.is_failing();
    if json_output {
        let payload = json!({
            "schema": PAYLOAD_SCHEMA,
            "checkKind": CHECK_KIND,
            "runId": ctx.run_id,
            "result": result_label(failing),
            "report": report,
            "feedback": feedback,
        });
        print_json_or_exit(&payload, "validate-mechanisms");
    } else {
        print_human(&report);
    }

    if failing {
        std::process::exit(1);
    }
}

fn print_human(report: &SystematicValidationReport) {
    println!("{}", report.summary_line());
    for result in &report.results {
        println!(
            "  - {} {} ({}/{} scenario(s), {})",
            result.mechanism_id,
            result.status.as_str().to_ascii_uppercase(),
            result.tests_passed,
            result.tests_run,
            result.criticality.as_str()
        );
        for error in &result.errors {
            println!("      error: {error}");
        }
        for warning in &result.warnings {
            println!("      warning: {warning}");
        }
    }
}
