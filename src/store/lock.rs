//! Per-file advisory write locks.
//!
//! Each target file is guarded by a sibling `<name>.lock` file holding an
//! exclusive advisory lock. Acquisition polls rather than blocks so a stuck
//! writer cannot wedge the process indefinitely.

use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use fs2::FileExt;
use thiserror::Error;
use tracing::debug;

/// How often acquisition retries while the lock is held elsewhere.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Debug, Error)]
pub enum LockError {
    #[error("timed out acquiring write lock for {path}")]
    Timeout { path: PathBuf },

    #[error("lock I/O error: {0}")]
    Io(#[from] io::Error),
}

/// An exclusive advisory lock on `<target>.lock`, released on drop.
#[derive(Debug)]
pub struct FileLock {
    file: File,
    lock_path: PathBuf,
}

impl FileLock {
    /// Acquires the lock for `target`, polling until `timeout` elapses.
    ///
    /// Blocking call; run it on a blocking thread.
    pub fn acquire(target: &Path, timeout: Duration) -> Result<FileLock, LockError> {
        let lock_path = lock_path_for(target);
        let deadline = Instant::now() + timeout;

        loop {
            let file = OpenOptions::new()
                .create(true)
                .truncate(false)
                .write(true)
                .open(&lock_path)?;

            match file.try_lock_exclusive() {
                Ok(()) => {
                    return Ok(FileLock {
                        file,
                        lock_path,
                    });
                }
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => {
                    if Instant::now() >= deadline {
                        return Err(LockError::Timeout { path: lock_path });
                    }
                    debug!(path = %lock_path.display(), "lock held elsewhere, retrying");
                    std::thread::sleep(POLL_INTERVAL);
                }
                Err(err) => return Err(LockError::Io(err)),
            }
        }
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        // Unlock before removing so a waiter polling the same path never
        // observes a locked-but-deleted file.
        let _ = fs2::FileExt::unlock(&self.file);
        let _ = std::fs::remove_file(&self.lock_path);
    }
}

fn lock_path_for(target: &Path) -> PathBuf {
    let mut os = target.as_os_str().to_os_string();
    os.push(".lock");
    PathBuf::from(os)
}
