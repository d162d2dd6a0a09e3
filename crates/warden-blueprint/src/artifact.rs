//! Blueprint artifact: a YAML mapping addressable by dotted key paths, plus
//! the raw text its header annotations live in.

use serde_yaml::{Mapping, Value};
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ArtifactError {
    #[error("{path}: malformed YAML: {message}")]
    Malformed { path: String, message: String },

    #[error("{path}: document root must be a mapping (found {found})")]
    NotAMapping { path: String, found: String },

    #[error("invalid key path `{0}`")]
    InvalidPath(String),

    #[error("cannot descend into `{prefix}`: value is {found}, not a mapping")]
    PathBlocked { prefix: String, found: String },

    #[error("failed to render YAML: {0}")]
    Render(String),
}

/// Dotted key path into an artifact, e.g. `observability.events`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct KeyPath(pub(crate) Vec<String>);

impl KeyPath {
    pub fn parse(path: &str) -> Result<Self, ArtifactError> {
        let segments: Vec<String> = path.split('.').map(str::to_string).collect();
        if segments.iter().any(|segment| segment.trim().is_empty()) {
            return Err(ArtifactError::InvalidPath(path.to_string()));
        }
        Ok(Self(segments))
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }
}

impl Display for KeyPath {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0.join("."))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Artifact {
    pub id: String,
    pub file_path: PathBuf,
    pub root: Mapping,
    pub raw_text: String,
}

impl Artifact {
    /// Parse raw text read from `file_path`.
    ///
    /// The id is the document's `id` string when present, else the file stem
    /// (with a trailing `.blueprint` dropped).
    pub fn parse(file_path: &Path, raw_text: String) -> Result<Self, ArtifactError> {
        let display = file_path.display().to_string();
        let value: Value =
            serde_yaml::from_str(&raw_text).map_err(|e| ArtifactError::Malformed {
                path: display.clone(),
                message: e.to_string(),
            })?;
        let root = match value {
            Value::Mapping(mapping) => mapping,
            other => {
                return Err(ArtifactError::NotAMapping {
                    path: display,
                    found: value_kind(&other).to_string(),
                });
            }
        };

        let id = match root.get("id") {
            Some(Value::String(id)) if !id.trim().is_empty() => id.trim().to_string(),
            _ => fallback_id(file_path),
        };

        Ok(Self {
            id,
            file_path: file_path.to_path_buf(),
            root,
            raw_text,
        })
    }

    pub fn get(&self, path: &KeyPath) -> Option<&Value> {
        let (last, parents) = path.segments().split_last()?;
        let mut current = &self.root;
        for segment in parents {
            current = current.get(segment.as_str())?.as_mapping()?;
        }
        current.get(last.as_str())
    }

    /// Set a leaf, creating intermediate mappings. Returns the previous value.
    pub fn set(&mut self, path: &KeyPath, value: Value) -> Result<Option<Value>, ArtifactError> {
        let parent = self.parent_mut(path, true)?;
        let Some(parent) = parent else {
            return Ok(None);
        };
        let last = leaf(path)?;
        Ok(parent.insert(Value::String(last.to_string()), value))
    }

    /// Delete a leaf. Missing intermediate keys are not an error.
    pub fn remove(&mut self, path: &KeyPath) -> Result<Option<Value>, ArtifactError> {
        let parent = self.parent_mut(path, false)?;
        let Some(parent) = parent else {
            return Ok(None);
        };
        let last = leaf(path)?;
        Ok(parent.remove(last))
    }

    fn parent_mut(
        &mut self,
        path: &KeyPath,
        create: bool,
    ) -> Result<Option<&mut Mapping>, ArtifactError> {
        let segments = path.segments();
        let parents = &segments[..segments.len().saturating_sub(1)];
        let mut current = &mut self.root;
        for (depth, segment) in parents.iter().enumerate() {
            if !current.contains_key(segment.as_str()) || current.get(segment.as_str()) == Some(&Value::Null) {
                if !create {
                    return Ok(None);
                }
                current.insert(
                    Value::String(segment.clone()),
                    Value::Mapping(Mapping::new()),
                );
            }
            current = match current.get_mut(segment.as_str()) {
                Some(Value::Mapping(mapping)) => mapping,
                Some(other) => {
                    return Err(ArtifactError::PathBlocked {
                        prefix: segments[..=depth].join("."),
                        found: value_kind(other).to_string(),
                    });
                }
                None => return Ok(None),
            };
        }
        Ok(Some(current))
    }

    /// Header lines (leading `#` comments) followed by the re-serialized body.
    pub fn render(&self, extra_header: &[String]) -> Result<String, ArtifactError> {
        let body = serde_yaml::to_string(&Value::Mapping(self.root.clone()))
            .map_err(|e| ArtifactError::Render(e.to_string()))?;
        let mut out = String::new();
        for line in self.raw_text.lines().take(header_len(&self.raw_text)) {
            out.push_str(line);
            out.push('\n');
        }
        for line in extra_header {
            out.push_str(line);
            out.push('\n');
        }
        out.push_str(&body);
        Ok(out)
    }
}

fn leaf(path: &KeyPath) -> Result<&str, ArtifactError> {
    path.segments()
        .last()
        .map(String::as_str)
        .ok_or_else(|| ArtifactError::InvalidPath(path.to_string()))
}

pub(crate) fn fallback_id(file_path: &Path) -> String {
    let stem = file_path
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "artifact".to_string());
    stem.strip_suffix(".blueprint")
        .map(str::to_string)
        .unwrap_or(stem)
}

pub(crate) fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Sequence(_) => "a sequence",
        Value::Mapping(_) => "a mapping",
        Value::Tagged(_) => "a tagged value",
    }
}

/// Number of leading comment lines.
fn header_len(raw: &str) -> usize {
    raw.lines()
        .take_while(|line| line.trim_start().starts_with('#'))
        .count()
}

/// Marker annotations are plain substrings of the raw text.
pub fn has_marker(raw: &str, marker: &str) -> bool {
    raw.contains(marker)
}

/// Insert `line` before the first non-comment line, keeping the rest verbatim.
pub fn insert_header_line(raw: &str, line: &str) -> String {
    let split = header_len(raw);
    let mut out = String::with_capacity(raw.len() + line.len() + 1);
    let mut inserted = false;
    for (index, existing) in raw.split_inclusive('\n').enumerate() {
        if index == split {
            out.push_str(line);
            out.push('\n');
            inserted = true;
        }
        out.push_str(existing);
    }
    if !inserted {
        if !out.is_empty() && !out.ends_with('\n') {
            out.push('\n');
        }
        out.push_str(line);
        out.push('\n');
    }
    out
}
