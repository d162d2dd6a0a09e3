use crate::support::{Context, PAYLOAD_SCHEMA, print_json_or_exit};
use serde_json::json;
use warden_core::{Severity, TelemetryEvent, emit};
use warden_patterns::PatternStore;

const CHECK_KIND: &str = "warden.patterns.v1";

pub fn run(ctx: &Context, json_output: bool) {
    let store = PatternStore::from_events_dir(&ctx.paths.events_dir);
    let patterns = store.patterns();
    let insights = store.insights();
    let stats = store.stats();
    let recurring = patterns.iter().filter(|pattern| pattern.is_recurring()).count();

    emit(
        ctx.telemetry.as_ref(),
        TelemetryEvent::new(
            "patterns.analyzed",
            Severity::Low,
            json!({
                "patterns": patterns.len(),
                "recurring": recurring,
                "rejected": stats.rejected,
                "loadErrors": store.load_errors().len(),
            }),
        ),
    );

    if json_output {
        let payload = json!({
            "schema": PAYLOAD_SCHEMA,
            "checkKind": CHECK_KIND,
            "runId": ctx.run_id,
            "eventsDir": ctx.paths.events_dir.display().to_string(),
            "stats": stats,
            "patterns": patterns,
            "insights": insights,
            "loadErrors": store.load_errors(),
        });
        print_json_or_exit(&payload, "patterns");
        return;
    }

    println!(
        "[patterns] OK (patterns={}, recurring={recurring}, records={}, rejected={})",
        patterns.len(),
        stats.records,
        stats.rejected
    );
    for pattern in &patterns {
        println!(
            "  - {} x{} (confidence {:.2}, {})",
            pattern.id,
            pattern.frequency,
            pattern.confidence,
            pattern.severity.as_str()
        );
    }
    for insight in &insights {
        println!("  * {}", insight.message);
    }
    for error in store.load_errors() {
        println!("  ! {error}");
    }
}
