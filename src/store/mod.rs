//! Crash-safe file storage under a sandboxed data directory.
//!
//! The store owns two directory trees: the data directory, holding the live
//! files, and a backup directory mirroring its structure. All access goes
//! through client-supplied relative paths that are validated lexically
//! ([`path::sanitize`]) before the filesystem is touched at all.
//!
//! # Write protocol
//!
//! 1. Acquire the per-file advisory lock (`<path>.lock`, bounded wait).
//! 2. Back up the current contents as a timestamped generation and prune to
//!    the newest [`backup::MAX_GENERATIONS`].
//! 3. Write the new contents to a temp file in the target's own directory,
//!    fsync it, atomically rename it over the target, fsync the directory.
//!
//! A crash at any point leaves either the old file or the new file, never a
//! torn mix, and the previous contents survive as a backup generation.

pub mod backup;
pub mod fsync;
pub mod lock;
pub mod path;

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;
use tracing::{info, warn};

use fsync::{fsync_dir, fsync_file};
use lock::{FileLock, LockError};
use path::PathError;

/// Bound on waiting for another writer to release a file.
pub const LOCK_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    InvalidPath(#[from] PathError),

    #[error(transparent)]
    Lock(#[from] LockError),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("background write task failed: {0}")]
    Background(String),
}

impl IntoResponse for StoreError {
    fn into_response(self) -> Response {
        let status = match &self {
            StoreError::InvalidPath(_) => StatusCode::BAD_REQUEST,
            StoreError::Lock(_) | StoreError::Io(_) | StoreError::Background(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        (status, Json(json!({ "detail": self.to_string() }))).into_response()
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Handle on the data and backup trees. Cheap to clone.
#[derive(Debug, Clone)]
pub struct FileStore {
    data_dir: PathBuf,
    backup_dir: PathBuf,
}

impl FileStore {
    pub fn new(data_dir: impl Into<PathBuf>, backup_dir: impl Into<PathBuf>) -> Self {
        FileStore {
            data_dir: data_dir.into(),
            backup_dir: backup_dir.into(),
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Reads a file's contents. `Ok(None)` if the file does not exist.
    pub async fn read(&self, raw_path: &str) -> Result<Option<String>> {
        let target = self.resolve(raw_path)?;

        let contents = tokio::task::spawn_blocking(move || -> Result<Option<String>> {
            if !target.exists() {
                return Ok(None);
            }
            Ok(Some(fs::read_to_string(&target)?))
        })
        .await
        .map_err(join_error)??;

        Ok(contents)
    }

    /// Writes a file crash-safely, backing up any previous contents.
    pub async fn write(&self, raw_path: &str, contents: String) -> Result<()> {
        let relative = path::sanitize(raw_path)?;
        let target = self.data_dir.join(&relative);
        let backup_dir = match relative.parent() {
            Some(parent) => self.backup_dir.join(parent),
            None => self.backup_dir.clone(),
        };
        let raw_path = raw_path.to_string();

        tokio::task::spawn_blocking(move || -> Result<()> {
            let parent = target.parent().unwrap_or(Path::new("."));
            fs::create_dir_all(parent)?;

            let _lock = FileLock::acquire(&target, LOCK_TIMEOUT)?;

            // Backup failure is not fatal; the write still proceeds.
            if let Err(err) = backup::backup_current(&target, &backup_dir) {
                warn!(path = %raw_path, error = %err, "backup failed, continuing with write");
            }

            let file_name = target
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let mut temp = tempfile::Builder::new()
                .prefix(&format!("{file_name}."))
                .suffix(".tmp")
                .tempfile_in(parent)?;
            temp.write_all(contents.as_bytes())?;
            fsync_file(temp.as_file())?;
            temp.persist(&target).map_err(|err| err.error)?;
            fsync_dir(parent)?;

            info!(path = %raw_path, bytes = contents.len(), "wrote file");
            Ok(())
        })
        .await
        .map_err(join_error)?
    }

    /// Deletes a file. Succeeds whether or not the file existed.
    pub async fn delete(&self, raw_path: &str) -> Result<()> {
        let target = self.resolve(raw_path)?;

        tokio::task::spawn_blocking(move || -> Result<()> {
            if target.exists() {
                fs::remove_file(&target)?;
                if let Some(parent) = target.parent() {
                    fsync_dir(parent)?;
                }
            }
            Ok(())
        })
        .await
        .map_err(join_error)?
    }

    fn resolve(&self, raw_path: &str) -> Result<PathBuf> {
        Ok(self.data_dir.join(path::sanitize(raw_path)?))
    }
}

fn join_error(err: tokio::task::JoinError) -> StoreError {
    StoreError::Background(err.to_string())
}
