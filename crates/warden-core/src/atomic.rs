//! Atomic file replacement and the per-repository write lock.
//!
//! Writes go to a sibling temp file, are fsynced, then renamed over the
//! target. A failure at any step leaves the target's bytes untouched.

use chrono::Utc;
use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Debug, thiserror::Error)]
pub enum AtomicWriteError {
    #[error("failed to prepare {path}: {message}")]
    Prepare { path: String, message: String },

    #[error("failed to write temp file {path}: {message}")]
    Write { path: String, message: String },

    #[error("failed to rename {from} -> {to}: {message}")]
    Rename {
        from: String,
        to: String,
        message: String,
    },
}

/// Replace `path` with `bytes` via write-to-temp then rename.
pub fn write_atomic(path: impl AsRef<Path>, bytes: &[u8]) -> Result<(), AtomicWriteError> {
    let path = path.as_ref();
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).map_err(|e| AtomicWriteError::Prepare {
            path: parent.display().to_string(),
            message: e.to_string(),
        })?;
    }

    let tmp_path = tmp_write_path(path);
    let write_result = (|| -> std::io::Result<()> {
        let mut file = File::create(&tmp_path)?;
        file.write_all(bytes)?;
        file.flush()?;
        file.sync_all()?;
        Ok(())
    })();

    if let Err(error) = write_result {
        let _ = fs::remove_file(&tmp_path);
        return Err(AtomicWriteError::Write {
            path: tmp_path.display().to_string(),
            message: error.to_string(),
        });
    }

    fs::rename(&tmp_path, path).map_err(|e| {
        let _ = fs::remove_file(&tmp_path);
        AtomicWriteError::Rename {
            from: tmp_path.display().to_string(),
            to: path.display().to_string(),
            message: e.to_string(),
        }
    })?;

    // Directory fsync is best-effort; the rename itself already happened.
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
        && let Ok(dir) = File::open(parent)
    {
        let _ = dir.sync_all();
    }

    Ok(())
}

fn tmp_write_path(path: &Path) -> PathBuf {
    let unique = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let mut tmp: OsString = path.as_os_str().to_os_string();
    tmp.push(format!(".tmp.{}.{}", std::process::id(), unique));
    PathBuf::from(tmp)
}

#[derive(Debug, thiserror::Error)]
pub enum LockError {
    #[error("repository lock busy: {lock_path}")]
    Busy { lock_path: String },

    #[error("failed to acquire repository lock {lock_path}: {message}")]
    Io { lock_path: String, message: String },
}

/// Exclusive single-writer lock for one repository.
///
/// Acquired with `create_new`, so a second holder fails fast with
/// [`LockError::Busy`]. The lock file is removed when the guard drops.
#[derive(Debug)]
pub struct RepoLock {
    lock_path: PathBuf,
    _file: File,
}

impl RepoLock {
    pub fn acquire(lock_path: impl AsRef<Path>) -> Result<Self, LockError> {
        let lock_path = lock_path.as_ref().to_path_buf();
        if let Some(parent) = lock_path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(|e| LockError::Io {
                lock_path: lock_path.display().to_string(),
                message: e.to_string(),
            })?;
        }

        match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&lock_path)
        {
            Ok(mut file) => {
                let _ = writeln!(
                    file,
                    "pid={}\nutc={}",
                    std::process::id(),
                    Utc::now().to_rfc3339()
                );
                Ok(Self {
                    lock_path,
                    _file: file,
                })
            }
            Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => Err(LockError::Busy {
                lock_path: lock_path.display().to_string(),
            }),
            Err(err) => Err(LockError::Io {
                lock_path: lock_path.display().to_string(),
                message: err.to_string(),
            }),
        }
    }

    pub fn path(&self) -> &Path {
        &self.lock_path
    }
}

impl Drop for RepoLock {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.lock_path);
    }
}
