use serde_json::Value;
use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use warden_core::{JsonlSink, NullSink, ResolvedPaths, TelemetrySink, WardenConfig, new_run_id};

pub const PAYLOAD_SCHEMA: u64 = 1;

/// Everything a subcommand needs, loaded once per invocation.
pub struct Context {
    pub config: WardenConfig,
    pub paths: ResolvedPaths,
    pub run_id: String,
    pub telemetry: Arc<dyn TelemetrySink>,
}

impl Context {
    /// `path` as given when absolute, else under the repository root.
    pub fn resolve(&self, path: &str) -> PathBuf {
        let candidate = PathBuf::from(path);
        if candidate.is_absolute() {
            candidate
        } else {
            self.paths.root.join(candidate)
        }
    }
}

pub fn load_context_or_exit(root: &str, config_path: Option<&str>) -> Context {
    let root = PathBuf::from(root);
    if !root.is_dir() {
        exit_error(format!("repository root not found: {}", root.display()));
    }
    let config = WardenConfig::load(&root, config_path.map(Path::new)).unwrap_or_else(|e| exit_error(e));
    let paths = config.resolve_paths(&root);
    let telemetry: Arc<dyn TelemetrySink> = if config.telemetry.enabled {
        Arc::new(JsonlSink::new(paths.telemetry_log.clone()))
    } else {
        Arc::new(NullSink)
    };
    Context {
        config,
        paths,
        run_id: new_run_id(),
        telemetry,
    }
}

/// Print `error: ...` and exit with the usage/config failure code.
pub fn exit_error(message: impl Display) -> ! {
    eprintln!("error: {message}");
    std::process::exit(2);
}

pub fn print_json_or_exit(payload: &Value, label: &str) {
    let rendered = serde_json::to_string_pretty(payload)
        .unwrap_or_else(|err| exit_error(format!("failed to render {label} payload: {err}")));
    println!("{rendered}");
}

pub fn ok_or_fail(failing: bool) -> &'static str {
    if failing { "FAIL" } else { "OK" }
}

pub fn result_label(failing: bool) -> &'static str {
    if failing { "rejected" } else { "accepted" }
}
