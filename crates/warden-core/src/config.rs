//! `.warden/config.toml`: framework identity, repository paths, and run policy.
//!
//! Every field has a default, so a repository without a config file gets the
//! conventional layout:
//!
//! ```text
//! blueprints/**/*.yaml          artifacts under governance
//! .warden/events/*.jsonl        historical violation/drift records
//! .warden/logs/repairs.jsonl    append-only repair audit trail
//! .warden/logs/prevention.jsonl prevention ledger
//! .warden/logs/validation.jsonl mechanism validation runs
//! .warden/alerts.json           bounded alert history
//! ```

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

pub const CONFIG_RELATIVE_PATH: &str = ".warden/config.toml";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config file not found: {0}")]
    NotFound(String),

    #[error("failed to read config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid toml at {path}: {source}")]
    ParseToml {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid config value `{field}`: {message}")]
    Invalid { field: String, message: String },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WardenConfig {
    pub framework: FrameworkConfig,
    pub paths: PathsConfig,
    pub commands: CommandsConfig,
    pub monitor: MonitorConfig,
    pub mechanisms: MechanismsConfig,
    pub telemetry: TelemetryConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FrameworkConfig {
    pub name: String,
    /// Version written into artifacts that are missing one.
    pub version: String,
    /// Header marker proving the artifact is framework-managed.
    pub framework_marker: String,
    /// Header marker proving compliance enforcement is enabled.
    pub compliance_marker: String,
}

impl Default for FrameworkConfig {
    fn default() -> Self {
        Self {
            name: "blueprint-framework".to_string(),
            version: "1.0.0".to_string(),
            framework_marker: "@blueprint-framework".to_string(),
            compliance_marker: "@compliance-enforced".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PathsConfig {
    pub blueprints: Vec<String>,
    pub extensions: Vec<String>,
    pub events_dir: String,
    pub repair_log: String,
    pub prevention_ledger: String,
    pub validation_log: String,
    pub alert_history: String,
    pub telemetry_log: String,
    pub lock_file: String,
    pub detached_log_dir: String,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            blueprints: vec!["blueprints".to_string()],
            extensions: vec!["yaml".to_string(), "yml".to_string()],
            events_dir: ".warden/events".to_string(),
            repair_log: ".warden/logs/repairs.jsonl".to_string(),
            prevention_ledger: ".warden/logs/prevention.jsonl".to_string(),
            validation_log: ".warden/logs/validation.jsonl".to_string(),
            alert_history: ".warden/alerts.json".to_string(),
            telemetry_log: ".warden/logs/telemetry.jsonl".to_string(),
            lock_file: ".warden/repair.lock".to_string(),
            detached_log_dir: ".warden/logs/detached".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CommandsConfig {
    pub timeout_secs: u64,
}

impl Default for CommandsConfig {
    fn default() -> Self {
        Self { timeout_secs: 30 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MonitorConfig {
    pub alert_history_limit: usize,
    pub prevention: PreventionMode,
    /// Optional JSON file replacing the built-in compliance-pattern catalog.
    pub catalog: Option<String>,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            alert_history_limit: 100,
            prevention: PreventionMode::DryRun,
            catalog: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MechanismsConfig {
    /// Optional JSON file replacing the built-in mechanism catalog.
    pub catalog: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TelemetryConfig {
    pub enabled: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// What the monitor does with critical, auto-preventable alerts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PreventionMode {
    Off,
    #[default]
    DryRun,
    Execute,
}

impl PreventionMode {
    pub fn as_str(self) -> &'static str {
        match self {
            PreventionMode::Off => "off",
            PreventionMode::DryRun => "dry-run",
            PreventionMode::Execute => "execute",
        }
    }
}

impl Display for PreventionMode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PreventionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "off" => Ok(PreventionMode::Off),
            "dry-run" | "dry_run" => Ok(PreventionMode::DryRun),
            "execute" => Ok(PreventionMode::Execute),
            other => Err(format!(
                "unknown prevention mode `{other}` (expected off, dry-run, or execute)"
            )),
        }
    }
}

impl WardenConfig {
    /// Parse config text without touching the filesystem.
    pub fn from_toml_str(text: &str, origin: &str) -> Result<Self, ConfigError> {
        let config: WardenConfig = toml::from_str(text).map_err(|source| ConfigError::ParseToml {
            path: origin.to_string(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load config for `repo_root`.
    ///
    /// An explicit path must exist. Without one, `.warden/config.toml` is used
    /// when present and defaults otherwise.
    pub fn load(repo_root: &Path, explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let path = match explicit {
            Some(path) => {
                let path = resolve_under(repo_root, path);
                if !path.exists() {
                    return Err(ConfigError::NotFound(path.display().to_string()));
                }
                path
            }
            None => {
                let path = repo_root.join(CONFIG_RELATIVE_PATH);
                if !path.exists() {
                    tracing::debug!(root = %repo_root.display(), "no config file; using defaults");
                    return Ok(Self::default());
                }
                path
            }
        };

        let text = fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&text, &path.display().to_string())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.commands.timeout_secs == 0 {
            return Err(invalid("commands.timeout_secs", "must be at least 1"));
        }
        if self.monitor.alert_history_limit == 0 {
            return Err(invalid("monitor.alert_history_limit", "must be at least 1"));
        }
        if self.paths.blueprints.is_empty() {
            return Err(invalid("paths.blueprints", "at least one root is required"));
        }
        if self.paths.extensions.is_empty() {
            return Err(invalid("paths.extensions", "at least one extension is required"));
        }
        if self.framework.framework_marker.trim().is_empty()
            || self.framework.compliance_marker.trim().is_empty()
        {
            return Err(invalid("framework", "header markers must be non-empty"));
        }
        if self.framework.framework_marker == self.framework.compliance_marker {
            return Err(invalid("framework", "header markers must differ"));
        }
        Ok(())
    }

    pub fn resolve_paths(&self, repo_root: &Path) -> ResolvedPaths {
        let paths = &self.paths;
        ResolvedPaths {
            root: repo_root.to_path_buf(),
            blueprint_roots: paths
                .blueprints
                .iter()
                .map(|root| resolve_under(repo_root, Path::new(root)))
                .collect(),
            extensions: paths
                .extensions
                .iter()
                .map(|ext| ext.trim_start_matches('.').to_ascii_lowercase())
                .collect(),
            events_dir: resolve_under(repo_root, Path::new(&paths.events_dir)),
            repair_log: resolve_under(repo_root, Path::new(&paths.repair_log)),
            prevention_ledger: resolve_under(repo_root, Path::new(&paths.prevention_ledger)),
            validation_log: resolve_under(repo_root, Path::new(&paths.validation_log)),
            alert_history: resolve_under(repo_root, Path::new(&paths.alert_history)),
            telemetry_log: resolve_under(repo_root, Path::new(&paths.telemetry_log)),
            lock_file: resolve_under(repo_root, Path::new(&paths.lock_file)),
            detached_log_dir: resolve_under(repo_root, Path::new(&paths.detached_log_dir)),
        }
    }

    pub fn command_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.commands.timeout_secs)
    }
}

fn invalid(field: &str, message: &str) -> ConfigError {
    ConfigError::Invalid {
        field: field.to_string(),
        message: message.to_string(),
    }
}

fn resolve_under(root: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    }
}

/// Config paths resolved against one repository root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPaths {
    pub root: PathBuf,
    pub blueprint_roots: Vec<PathBuf>,
    pub extensions: Vec<String>,
    pub events_dir: PathBuf,
    pub repair_log: PathBuf,
    pub prevention_ledger: PathBuf,
    pub validation_log: PathBuf,
    pub alert_history: PathBuf,
    pub telemetry_log: PathBuf,
    pub lock_file: PathBuf,
    pub detached_log_dir: PathBuf,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_config_file_yields_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = WardenConfig::load(dir.path(), None).expect("defaults load");
        assert_eq!(config, WardenConfig::default());
        assert_eq!(config.commands.timeout_secs, 30);
        assert_eq!(config.monitor.alert_history_limit, 100);
        assert_eq!(config.monitor.prevention, PreventionMode::DryRun);
    }

    #[test]
    fn partial_config_overrides_only_named_fields() {
        let text = r#"
[framework]
version = "3.2.1"

[monitor]
prevention = "execute"
"#;
        let config = WardenConfig::from_toml_str(text, "inline").expect("config parses");
        assert_eq!(config.framework.version, "3.2.1");
        assert_eq!(config.framework.framework_marker, "@blueprint-framework");
        assert_eq!(config.monitor.prevention, PreventionMode::Execute);
        assert_eq!(config.paths.events_dir, ".warden/events");
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let err = WardenConfig::from_toml_str("[commands]\ntimeout_secs = 0\n", "inline")
            .expect_err("zero timeout is invalid");
        assert!(matches!(err, ConfigError::Invalid { ref field, .. } if field == "commands.timeout_secs"));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = WardenConfig::from_toml_str("[monitor]\nalert_limit = 5\n", "inline")
            .expect_err("typo must not be silently ignored");
        assert!(matches!(err, ConfigError::ParseToml { .. }));
    }

    #[test]
    fn explicit_missing_path_is_an_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = WardenConfig::load(dir.path(), Some(Path::new("nope.toml")))
            .expect_err("explicit config must exist");
        assert!(matches!(err, ConfigError::NotFound(_)));
    }

    #[test]
    fn paths_resolve_against_root() {
        let root = Path::new("/repo");
        let resolved = WardenConfig::default().resolve_paths(root);
        assert_eq!(resolved.blueprint_roots, vec![PathBuf::from("/repo/blueprints")]);
        assert_eq!(resolved.lock_file, PathBuf::from("/repo/.warden/repair.lock"));
        assert_eq!(resolved.extensions, vec!["yaml".to_string(), "yml".to_string()]);
    }
}
