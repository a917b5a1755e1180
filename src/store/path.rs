//! Lexical sandboxing of client-supplied file paths.
//!
//! Validation happens purely on the path string, before any filesystem
//! access: a hostile path must be rejected without ever touching disk.
//! Accepted paths come back as normalized relative paths that the store
//! joins under its data directory.

use std::path::{Component, Path, PathBuf};

use thiserror::Error;

/// Extensions the store will read or write. Compared case-insensitively.
pub const ALLOWED_EXTENSIONS: [&str; 3] = ["txt", "json", "jsonl"];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathError {
    /// The path escapes the data directory (absolute, or `..` climbing past
    /// the root).
    #[error("path escapes the data directory: {0}")]
    Traversal(String),

    /// The extension is not on the allow-list.
    #[error("file extension is not allowed: {0}")]
    ExtensionNotAllowed(String),

    /// The path names no file at all.
    #[error("empty file path")]
    Empty,
}

/// Validates a client-supplied path and normalizes it to a relative path.
///
/// Purely lexical: `.` components are dropped, `..` components pop the
/// previous component and reject the path if there is nothing left to pop.
/// Absolute paths are rejected outright. The final component must carry an
/// allow-listed extension.
pub fn sanitize(raw: &str) -> Result<PathBuf, PathError> {
    if raw.trim().is_empty() {
        return Err(PathError::Empty);
    }

    let mut normalized = PathBuf::new();
    for component in Path::new(raw).components() {
        match component {
            Component::Normal(part) => normalized.push(part),
            Component::CurDir => {}
            Component::ParentDir => {
                if !normalized.pop() {
                    return Err(PathError::Traversal(raw.to_string()));
                }
            }
            Component::RootDir | Component::Prefix(_) => {
                return Err(PathError::Traversal(raw.to_string()));
            }
        }
    }

    if normalized.as_os_str().is_empty() {
        return Err(PathError::Empty);
    }

    let extension = normalized
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase);
    match extension {
        Some(ext) if ALLOWED_EXTENSIONS.contains(&ext.as_str()) => Ok(normalized),
        _ => Err(PathError::ExtensionNotAllowed(raw.to_string())),
    }
}
