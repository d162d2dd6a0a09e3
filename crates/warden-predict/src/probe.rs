//! Typed boolean probes over repository state, learned patterns, and
//! artifact health.
//!
//! A probe that cannot be evaluated (git missing, document absent, command
//! timing out) returns an error. The monitor counts it as "not satisfied"
//! and records the error; it never aborts the run.

use crate::repo_state::RepoState;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use globset::{Glob, GlobMatcher};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use warden_blueprint::{HealthReport, HealthStatus};
use warden_core::{CommandRunner, CommandSpec};
use warden_patterns::Pattern;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "probe", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum Probe {
    /// Any changed file matches `glob`.
    FileModified { glob: String },
    /// The index has staged changes.
    StagedChanges,
    /// At least `min_count` changed files match `glob`.
    RelatedFilesChanged { glob: String, min_count: usize },
    /// No validation run recorded within `max_age_hours`.
    NoRecentValidation { max_age_hours: i64 },
    /// `path` was last modified more than `max_age_days` ago.
    DocumentationStale { path: String, max_age_days: i64 },
    /// A learned pattern has recurred; any pattern when `pattern_id` is unset.
    RecurringPattern {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pattern_id: Option<String>,
    },
    /// A pattern whose id starts with `prefix` has at least `min_confidence`.
    PatternConfidence { prefix: String, min_confidence: f64 },
    /// Some artifact currently carries an issue with this id.
    ArtifactIssue { issue_id: String },
    /// At least `min_count` artifacts are not healthy.
    UnhealthyArtifacts { min_count: usize },
    /// The command exits non-zero (or times out).
    CommandFails {
        program: String,
        #[serde(default)]
        args: Vec<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProbeError {
    #[error("invalid glob `{glob}`: {message}")]
    InvalidGlob { glob: String, message: String },

    #[error("version control state unavailable")]
    VcsUnavailable,

    #[error("document `{0}` not found")]
    MissingDocument(String),

    #[error("{0}")]
    Command(String),

    #[error("invalid probe parameter: {0}")]
    InvalidParameter(String),
}

/// Everything a probe may look at. Built once per monitoring run.
pub struct ProbeContext<'a> {
    pub root: &'a Path,
    pub repo: &'a RepoState,
    pub patterns: &'a [Pattern],
    pub health: &'a [HealthReport],
    pub runner: &'a dyn CommandRunner,
    pub command_timeout: Duration,
    pub now: DateTime<Utc>,
}

/// Result of one satisfied-or-not probe, with the detail that explains it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeOutcome {
    pub satisfied: bool,
    pub detail: String,
}

impl ProbeOutcome {
    fn new(satisfied: bool, detail: impl Into<String>) -> Self {
        Self {
            satisfied,
            detail: detail.into(),
        }
    }
}

impl Probe {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::FileModified { .. } => "file-modified",
            Self::StagedChanges => "staged-changes",
            Self::RelatedFilesChanged { .. } => "related-files-changed",
            Self::NoRecentValidation { .. } => "no-recent-validation",
            Self::DocumentationStale { .. } => "documentation-stale",
            Self::RecurringPattern { .. } => "recurring-pattern",
            Self::PatternConfidence { .. } => "pattern-confidence",
            Self::ArtifactIssue { .. } => "artifact-issue",
            Self::UnhealthyArtifacts { .. } => "unhealthy-artifacts",
            Self::CommandFails { .. } => "command-fails",
        }
    }

    /// Reject parameters that can never evaluate. Run at catalog load.
    pub fn validate(&self) -> Result<(), ProbeError> {
        match self {
            Self::FileModified { glob } | Self::RelatedFilesChanged { glob, .. } => {
                matcher(glob).map(|_| ())
            }
            Self::NoRecentValidation { max_age_hours } if *max_age_hours <= 0 => Err(
                ProbeError::InvalidParameter("maxAgeHours must be positive".to_string()),
            ),
            Self::DocumentationStale { max_age_days, .. } if *max_age_days <= 0 => Err(
                ProbeError::InvalidParameter("maxAgeDays must be positive".to_string()),
            ),
            Self::PatternConfidence { min_confidence, .. }
                if !(0.0..=1.0).contains(min_confidence) =>
            {
                Err(ProbeError::InvalidParameter(
                    "minConfidence must be within [0, 1]".to_string(),
                ))
            }
            Self::CommandFails { program, .. } if program.trim().is_empty() => Err(
                ProbeError::InvalidParameter("command program is empty".to_string()),
            ),
            _ => Ok(()),
        }
    }

    /// Document paths this probe needs modification times for.
    pub fn document(&self) -> Option<&str> {
        match self {
            Self::DocumentationStale { path, .. } => Some(path),
            _ => None,
        }
    }

    pub fn evaluate(&self, ctx: &ProbeContext<'_>) -> Result<ProbeOutcome, ProbeError> {
        match self {
            Self::FileModified { glob } => {
                let matched = changed_matching(ctx, glob)?;
                Ok(ProbeOutcome::new(
                    !matched.is_empty(),
                    match matched.first() {
                        Some(first) => format!("{first} modified"),
                        None => format!("no changes under {glob}"),
                    },
                ))
            }
            Self::StagedChanges => {
                require_vcs(ctx)?;
                let count = ctx.repo.staged_files.len();
                Ok(ProbeOutcome::new(count > 0, format!("{count} staged file(s)")))
            }
            Self::RelatedFilesChanged { glob, min_count } => {
                let matched = changed_matching(ctx, glob)?;
                Ok(ProbeOutcome::new(
                    matched.len() >= *min_count,
                    format!("{} changed file(s) match {glob}", matched.len()),
                ))
            }
            Self::NoRecentValidation { max_age_hours } => Ok(match ctx.repo.last_validation {
                None => ProbeOutcome::new(true, "no validation run recorded"),
                Some(last) => {
                    let age = ctx.now.signed_duration_since(last);
                    ProbeOutcome::new(
                        age > ChronoDuration::hours(*max_age_hours),
                        format!("last validation {}h ago", age.num_hours()),
                    )
                }
            }),
            Self::DocumentationStale { path, max_age_days } => {
                let Some(Some(modified)) = ctx.repo.document_mtimes.get(path) else {
                    return Err(ProbeError::MissingDocument(path.clone()));
                };
                let age = ctx.now.signed_duration_since(*modified);
                Ok(ProbeOutcome::new(
                    age > ChronoDuration::days(*max_age_days),
                    format!("{path} last modified {}d ago", age.num_days()),
                ))
            }
            Self::RecurringPattern { pattern_id } => {
                let recurring = ctx.patterns.iter().find(|pattern| {
                    pattern.is_recurring()
                        && pattern_id.as_ref().is_none_or(|id| *id == pattern.id)
                });
                Ok(match recurring {
                    Some(pattern) => ProbeOutcome::new(
                        true,
                        format!("{} seen {} times", pattern.id, pattern.frequency),
                    ),
                    None => ProbeOutcome::new(false, "no recurring pattern"),
                })
            }
            Self::PatternConfidence {
                prefix,
                min_confidence,
            } => {
                let strongest = ctx
                    .patterns
                    .iter()
                    .filter(|pattern| pattern.id.starts_with(prefix.as_str()))
                    .max_by(|a, b| a.confidence.total_cmp(&b.confidence));
                Ok(match strongest {
                    Some(pattern) => ProbeOutcome::new(
                        pattern.confidence >= *min_confidence,
                        format!("{} at confidence {}", pattern.id, pattern.confidence),
                    ),
                    None => ProbeOutcome::new(false, format!("no pattern with prefix {prefix}")),
                })
            }
            Self::ArtifactIssue { issue_id } => {
                let affected: Vec<&str> = ctx
                    .health
                    .iter()
                    .filter(|report| report.issues.iter().any(|issue| issue.id == *issue_id))
                    .map(|report| report.artifact_id.as_str())
                    .collect();
                Ok(ProbeOutcome::new(
                    !affected.is_empty(),
                    format!("{issue_id} on {} artifact(s)", affected.len()),
                ))
            }
            Self::UnhealthyArtifacts { min_count } => {
                let unhealthy = ctx
                    .health
                    .iter()
                    .filter(|report| report.status != HealthStatus::Healthy)
                    .count();
                Ok(ProbeOutcome::new(
                    unhealthy >= *min_count,
                    format!("{unhealthy} unhealthy artifact(s)"),
                ))
            }
            Self::CommandFails { program, args } => {
                let args: Vec<&str> = args.iter().map(String::as_str).collect();
                let spec = CommandSpec::new(program.clone(), &args).with_timeout(ctx.command_timeout);
                let outcome = ctx.runner.run(&spec, ctx.root);
                match &outcome.status {
                    warden_core::CommandStatus::Unavailable { message } => {
                        Err(ProbeError::Command(format!("`{}` unavailable: {message}", spec.display())))
                    }
                    _ => Ok(match outcome.failure_message() {
                        Some(message) => ProbeOutcome::new(true, message),
                        None => ProbeOutcome::new(false, format!("`{}` succeeded", spec.display())),
                    }),
                }
            }
        }
    }
}

fn matcher(glob: &str) -> Result<GlobMatcher, ProbeError> {
    Glob::new(glob)
        .map(|glob| glob.compile_matcher())
        .map_err(|e| ProbeError::InvalidGlob {
            glob: glob.to_string(),
            message: e.to_string(),
        })
}

fn require_vcs(ctx: &ProbeContext<'_>) -> Result<(), ProbeError> {
    if ctx.repo.vcs_available {
        Ok(())
    } else {
        Err(ProbeError::VcsUnavailable)
    }
}

fn changed_matching<'a>(ctx: &ProbeContext<'a>, glob: &str) -> Result<Vec<&'a str>, ProbeError> {
    require_vcs(ctx)?;
    let matcher = matcher(glob)?;
    Ok(ctx
        .repo
        .changed_files
        .iter()
        .filter(|path| matcher.is_match(path.as_str()))
        .map(String::as_str)
        .collect())
}
