//! Low-level fsync helpers for durability.
//!
//! Renaming a file updates its directory entry; without an fsync on the
//! directory the rename may not survive a power loss even though the file
//! contents were synced. Writers therefore sync both.

use std::fs::{File, OpenOptions};
use std::io;
use std::path::Path;

/// Syncs a file's contents and metadata to disk (`fsync(2)`).
pub fn fsync_file(file: &File) -> io::Result<()> {
    file.sync_all()
}

/// Syncs a directory so that entry creations and renames are durable.
///
/// Opening read-only is sufficient for fsync.
pub fn fsync_dir(dir_path: &Path) -> io::Result<()> {
    let dir = OpenOptions::new().read(true).open(dir_path)?;
    dir.sync_all()
}
