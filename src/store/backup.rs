//! Timestamped backup generations for store files.
//!
//! Before a file is overwritten, its current contents are copied into the
//! backup tree under the same relative directory, named
//! `{stem}.{UTC timestamp}{suffix}.bak`. The timestamp has microsecond
//! precision and hyphenated time separators, so plain lexical ordering of
//! file names is chronological. At most [`MAX_GENERATIONS`] backups are kept
//! per (stem, suffix) pair; older generations are pruned.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::Utc;
use tracing::debug;

/// Backup generations retained per (stem, suffix) pair.
pub const MAX_GENERATIONS: usize = 30;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H-%M-%S%.6fZ";

/// Copies `target` into `backup_dir` as a new timestamped generation, then
/// prunes old generations. No-op if `target` does not exist.
///
/// Returns the path of the new backup, if one was made.
pub fn backup_current(target: &Path, backup_dir: &Path) -> io::Result<Option<PathBuf>> {
    if !target.exists() {
        return Ok(None);
    }

    let (stem, suffix) = stem_and_suffix(target);
    fs::create_dir_all(backup_dir)?;

    let timestamp = Utc::now().format(TIMESTAMP_FORMAT);
    let backup_path = backup_dir.join(format!("{stem}.{timestamp}{suffix}.bak"));
    fs::copy(target, &backup_path)?;
    debug!(backup = %backup_path.display(), "backed up previous file contents");

    prune(backup_dir, &stem, &suffix)?;
    Ok(Some(backup_path))
}

/// Deletes all but the newest [`MAX_GENERATIONS`] backups for one
/// (stem, suffix) pair. Individual deletion failures are skipped; pruning is
/// best effort.
fn prune(backup_dir: &Path, stem: &str, suffix: &str) -> io::Result<()> {
    let prefix = format!("{stem}.");
    let suffix_match = format!("{suffix}.bak");

    let mut names: Vec<String> = fs::read_dir(backup_dir)?
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_ok_and(|t| t.is_file()))
        .filter_map(|entry| entry.file_name().into_string().ok())
        .filter(|name| name.starts_with(&prefix) && name.ends_with(&suffix_match))
        .collect();

    // Lexical order is chronological thanks to the timestamp format.
    names.sort_unstable_by(|a, b| b.cmp(a));
    for name in names.into_iter().skip(MAX_GENERATIONS) {
        let _ = fs::remove_file(backup_dir.join(name));
    }
    Ok(())
}

/// Splits `notes.json` into `("notes", ".json")`. A file with no extension
/// gets an empty suffix.
fn stem_and_suffix(target: &Path) -> (String, String) {
    let stem = target
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let suffix = target
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();
    (stem, suffix)
}
