//! # warden-core
//!
//! Shared vocabulary and plumbing for the Warden compliance pipeline.
//!
//! This crate provides:
//! - `Severity` and the confidence/time-window buckets every component scores with
//! - `WardenConfig` (`.warden/config.toml`) and resolved repository paths
//! - JSONL append/read helpers for the append-only logs
//! - atomic file replacement and the repository write lock
//! - a blocking external command runner with explicit timeouts
//! - the injected telemetry sink
//!
//! It intentionally knows nothing about blueprints, patterns, or alerts.
//! Those concerns live in the component crates that depend on it.

pub mod atomic;
pub mod command;
pub mod config;
pub mod confidence;
pub mod digest;
pub mod jsonl;
pub mod severity;
pub mod telemetry;

pub use atomic::{AtomicWriteError, LockError, RepoLock, write_atomic};
pub use command::{
    CommandOutcome, CommandRunner, CommandSpec, CommandStatus, SystemCommandRunner,
    spawn_detached,
};
pub use config::{
    CONFIG_RELATIVE_PATH, ConfigError, FrameworkConfig, PreventionMode, ResolvedPaths,
    WardenConfig,
};
pub use confidence::{CONFIDENCE_STEP, TimeToViolation, reinforce, round_confidence, tenths};
pub use digest::sha256_digest;
pub use jsonl::{
    JsonlError, LenientRead, append_record, read_records, read_records_from_path,
    read_records_lenient,
};
pub use severity::Severity;
pub use telemetry::{
    JsonlSink, MemorySink, NullSink, TelemetryError, TelemetryEvent, TelemetrySink, emit,
};

/// Fresh identifier correlating every log record written by one invocation.
pub fn new_run_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
