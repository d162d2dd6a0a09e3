//! Blocking external commands with an explicit timeout.
//!
//! A missing tool, a non-zero exit, and a timeout all come back as a
//! [`CommandOutcome`] rather than an error: callers treat them as a failed
//! probe or action, never as a crash.

use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::Read;
use std::path::Path;
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Default timeout for generic commands.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandSpec {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT.as_secs()
}

impl CommandSpec {
    pub fn new(program: impl Into<String>, args: &[&str]) -> Self {
        Self {
            program: program.into(),
            args: args.iter().map(|arg| arg.to_string()).collect(),
            timeout_secs: default_timeout_secs(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_secs = timeout.as_secs().max(1);
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }

    /// `program arg1 arg2` for logs and evidence.
    pub fn display(&self) -> String {
        if self.args.is_empty() {
            self.program.clone()
        } else {
            format!("{} {}", self.program, self.args.join(" "))
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum CommandStatus {
    Succeeded,
    Failed { code: Option<i32> },
    TimedOut { after_secs: u64 },
    Unavailable { message: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandOutcome {
    pub command: String,
    pub status: CommandStatus,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub stdout: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub stderr: String,
    pub elapsed_ms: u64,
}

impl CommandOutcome {
    pub fn success(&self) -> bool {
        matches!(self.status, CommandStatus::Succeeded)
    }

    /// One-line description of a non-successful outcome.
    pub fn failure_message(&self) -> Option<String> {
        match &self.status {
            CommandStatus::Succeeded => None,
            CommandStatus::Failed { code } => {
                let stderr = self.stderr.trim();
                let code = code.map_or_else(|| "signal".to_string(), |c| c.to_string());
                if stderr.is_empty() {
                    Some(format!("`{}` exited with {code}", self.command))
                } else {
                    Some(format!("`{}` exited with {code}: {stderr}", self.command))
                }
            }
            CommandStatus::TimedOut { after_secs } => Some(format!(
                "`{}` timed out after {after_secs}s",
                self.command
            )),
            CommandStatus::Unavailable { message } => {
                Some(format!("`{}` unavailable: {message}", self.command))
            }
        }
    }
}

/// Seam for running external commands, so probes and actions can be
/// exercised without touching the host.
pub trait CommandRunner: Send + Sync {
    fn run(&self, spec: &CommandSpec, cwd: &Path) -> CommandOutcome;
}

/// Runs commands on the host with a polling timeout.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemCommandRunner;

impl CommandRunner for SystemCommandRunner {
    fn run(&self, spec: &CommandSpec, cwd: &Path) -> CommandOutcome {
        let started = Instant::now();
        let command = spec.display();
        let elapsed_ms = |started: Instant| started.elapsed().as_millis() as u64;

        let mut child = match Command::new(&spec.program)
            .args(&spec.args)
            .current_dir(cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
        {
            Ok(child) => child,
            Err(err) => {
                debug!(command = %command, error = %err, "command unavailable");
                return CommandOutcome {
                    command,
                    status: CommandStatus::Unavailable {
                        message: err.to_string(),
                    },
                    stdout: String::new(),
                    stderr: String::new(),
                    elapsed_ms: elapsed_ms(started),
                };
            }
        };

        // Drain pipes on helper threads so a chatty child cannot block on a full pipe.
        let stdout_reader = child.stdout.take().map(|mut pipe| {
            thread::spawn(move || {
                let mut buf = Vec::new();
                let _ = pipe.read_to_end(&mut buf);
                buf
            })
        });
        let stderr_reader = child.stderr.take().map(|mut pipe| {
            thread::spawn(move || {
                let mut buf = Vec::new();
                let _ = pipe.read_to_end(&mut buf);
                buf
            })
        });

        let timeout = spec.timeout();
        let status = loop {
            match child.try_wait() {
                Ok(Some(exit)) => {
                    break if exit.success() {
                        CommandStatus::Succeeded
                    } else {
                        CommandStatus::Failed { code: exit.code() }
                    };
                }
                Ok(None) if started.elapsed() >= timeout => {
                    let _ = child.kill();
                    let _ = child.wait();
                    warn!(command = %command, timeout_secs = timeout.as_secs(), "command timed out");
                    break CommandStatus::TimedOut {
                        after_secs: timeout.as_secs(),
                    };
                }
                Ok(None) => thread::sleep(POLL_INTERVAL),
                Err(err) => {
                    let _ = child.kill();
                    let _ = child.wait();
                    break CommandStatus::Unavailable {
                        message: err.to_string(),
                    };
                }
            }
        };

        let elapsed = elapsed_ms(started);
        // Grandchildren may still hold the pipes after a kill; never wait on them.
        let drained = !matches!(status, CommandStatus::TimedOut { .. });
        let collect = |reader: Option<thread::JoinHandle<Vec<u8>>>| {
            reader
                .filter(|_| drained)
                .and_then(|handle| handle.join().ok())
                .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
                .unwrap_or_default()
        };

        CommandOutcome {
            command,
            status,
            stdout: collect(stdout_reader),
            stderr: collect(stderr_reader),
            elapsed_ms: elapsed,
        }
    }
}

/// Start a long-lived process without waiting on it.
///
/// Output goes to `log_path`; the returned pid is the only handle kept.
pub fn spawn_detached(
    spec: &CommandSpec,
    cwd: &Path,
    log_path: &Path,
) -> Result<u32, std::io::Error> {
    if let Some(parent) = log_path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)?;
    }
    let log = OpenOptions::new().create(true).append(true).open(log_path)?;
    let log_err = log.try_clone()?;
    let child = Command::new(&spec.program)
        .args(&spec.args)
        .current_dir(cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::from(log))
        .stderr(Stdio::from(log_err))
        .spawn()?;
    Ok(child.id())
}
