//! Artifact store: the only code that touches blueprint files directly.

use crate::artifact::{Artifact, ArtifactError};
use std::fs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;
use warden_core::{AtomicWriteError, ResolvedPaths, write_atomic};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{path}: binary content (NUL byte)")]
    Binary { path: String },

    #[error("{path}: not valid UTF-8")]
    NotUtf8 { path: String },

    #[error(transparent)]
    Parse(#[from] ArtifactError),

    #[error(transparent)]
    Write(#[from] AtomicWriteError),
}

/// A directory entry under a blueprint root that could not be walked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("failed to walk {root}: {message}")]
pub struct WalkFailure {
    pub root: String,
    pub message: String,
}

/// Discovered artifact files plus the entries that could not be walked.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Discovery {
    pub files: Vec<PathBuf>,
    pub failures: Vec<WalkFailure>,
}

#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
    blueprint_roots: Vec<PathBuf>,
    extensions: Vec<String>,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>, blueprint_roots: Vec<PathBuf>, extensions: Vec<String>) -> Self {
        Self {
            root: root.into(),
            blueprint_roots,
            extensions: extensions
                .into_iter()
                .map(|ext| ext.trim_start_matches('.').to_ascii_lowercase())
                .collect(),
        }
    }

    pub fn from_paths(paths: &ResolvedPaths) -> Self {
        Self::new(
            paths.root.clone(),
            paths.blueprint_roots.clone(),
            paths.extensions.clone(),
        )
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Every artifact file under the configured roots, sorted. Absent roots
    /// are skipped; an entry that cannot be walked is recorded and the walk
    /// continues.
    pub fn discover(&self) -> Discovery {
        let mut discovery = Discovery::default();
        for root in &self.blueprint_roots {
            if fs::symlink_metadata(root).is_err() {
                debug!(root = %root.display(), "blueprint root missing; skipping");
                continue;
            }
            for entry in WalkDir::new(root).follow_links(false) {
                let entry = match entry {
                    Ok(entry) => entry,
                    Err(err) => {
                        warn!(root = %root.display(), error = %err, "skipping unwalkable entry");
                        discovery.failures.push(WalkFailure {
                            root: root.display().to_string(),
                            message: err.to_string(),
                        });
                        continue;
                    }
                };
                if entry.file_type().is_file() && self.matches_extension(entry.path()) {
                    discovery.files.push(entry.into_path());
                }
            }
        }
        discovery.files.sort();
        discovery.files.dedup();
        discovery
    }

    fn matches_extension(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| {
                let ext = ext.to_ascii_lowercase();
                self.extensions.iter().any(|allowed| *allowed == ext)
            })
    }

    pub fn read(&self, path: &Path) -> Result<String, StoreError> {
        let bytes = fs::read(path).map_err(|source| StoreError::Read {
            path: path.display().to_string(),
            source,
        })?;
        if bytes.contains(&0) {
            return Err(StoreError::Binary {
                path: path.display().to_string(),
            });
        }
        String::from_utf8(bytes).map_err(|_| StoreError::NotUtf8 {
            path: path.display().to_string(),
        })
    }

    pub fn load(&self, path: &Path) -> Result<Artifact, StoreError> {
        let raw = self.read(path)?;
        Ok(Artifact::parse(path, raw)?)
    }

    pub fn write(&self, path: &Path, text: &str) -> Result<(), StoreError> {
        write_atomic(path, text.as_bytes())?;
        Ok(())
    }

    /// Path relative to the repository root, for display.
    pub fn relative<'a>(&self, path: &'a Path) -> &'a Path {
        path.strip_prefix(&self.root).unwrap_or(path)
    }
}
