//! The pending-request registry: at most one in-flight upstream call per
//! fingerprint.
//!
//! # Protocol
//!
//! 1. `acquire` decides, under a single short-held lock, whether the caller
//!    leads (performs the upstream call) or follows (awaits the broadcast).
//! 2. The leader calls `complete` exactly once with the outcome — success or
//!    a synthesized error snapshot. The completion signal is a
//!    [`tokio::sync::watch`] channel, so every current *and* late-arriving
//!    waiter observes the same value.
//! 3. Completed entries linger for a grace window before removal, so a
//!    follower that looked up the fingerprint just before completion can
//!    still subscribe and read the result. Removal is guarded by the entry's
//!    creation timestamp: a fresh entry that reused the fingerprint after
//!    cleanup is never removed by a stale cleanup task.
//!
//! A follower's wait may time out independently; that never cancels the
//! leader's call or any other follower's wait.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::watch;
use tracing::debug;

use super::fingerprint::Fingerprint;
use crate::types::ResponseSnapshot;

/// How long a completed entry lingers before removal, giving late-arriving
/// followers a window to pick up the result.
pub const CLEANUP_GRACE: Duration = Duration::from_secs(5);

/// Errors observed by a waiting follower.
///
/// Distinct from any upstream error outcome: an upstream failure arrives as a
/// normal [`ResponseSnapshot`] carrying a 502/500 status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum WaitError {
    /// The wait bound elapsed before the leader completed.
    #[error("timed out waiting for the in-flight upstream call")]
    Timeout,

    /// The pending entry disappeared without ever completing.
    #[error("the in-flight upstream call was abandoned")]
    Abandoned,
}

/// Outcome of registering a fingerprint.
#[derive(Debug)]
pub enum Acquired {
    /// No call is in flight: the caller must perform the upstream call and
    /// then invoke [`PendingRegistry::complete`].
    Leader,

    /// A call is already in flight: the caller awaits its outcome.
    Follower(WaitHandle),
}

/// A subscription to an in-flight call's completion signal.
#[derive(Debug)]
pub struct WaitHandle {
    rx: watch::Receiver<Option<ResponseSnapshot>>,
}

impl WaitHandle {
    /// Awaits the broadcast outcome, bounded by `timeout`.
    ///
    /// Timing out does not affect the leader or other waiters.
    pub async fn wait(mut self, timeout: Duration) -> Result<ResponseSnapshot, WaitError> {
        match tokio::time::timeout(timeout, self.rx.wait_for(|v| v.is_some())).await {
            Ok(Ok(value)) => value.clone().ok_or(WaitError::Abandoned),
            Ok(Err(_)) => Err(WaitError::Abandoned),
            Err(_) => Err(WaitError::Timeout),
        }
    }
}

struct PendingEntry {
    created_at: DateTime<Utc>,
    tx: watch::Sender<Option<ResponseSnapshot>>,
}

impl PendingEntry {
    fn is_complete(&self) -> bool {
        self.tx.borrow().is_some()
    }
}

/// Singleflight coordinator. Cheap to clone; all clones share one registry.
#[derive(Clone, Default)]
pub struct PendingRegistry {
    inner: Arc<Mutex<HashMap<Fingerprint, PendingEntry>>>,
}

impl PendingRegistry {
    pub fn new() -> Self {
        PendingRegistry::default()
    }

    /// Registers interest in a fingerprint.
    ///
    /// Decision and registry mutation happen under one lock acquisition, so
    /// two near-simultaneous callers can never both become leader. An entry
    /// that completed but has not yet been cleaned up does not block a new
    /// leader: the fresh attempt replaces it.
    pub fn acquire(&self, fingerprint: &Fingerprint) -> Acquired {
        let mut map = self.lock_map();

        if let Some(entry) = map.get(fingerprint) {
            if !entry.is_complete() {
                return Acquired::Follower(WaitHandle {
                    rx: entry.tx.subscribe(),
                });
            }
        }

        let (tx, _rx) = watch::channel(None);
        map.insert(
            fingerprint.clone(),
            PendingEntry {
                created_at: Utc::now(),
                tx,
            },
        );
        Acquired::Leader
    }

    /// Records the leader's outcome and wakes every waiter.
    ///
    /// Fires the completion signal exactly once and schedules removal of the
    /// entry after [`CLEANUP_GRACE`]. The cleanup task compares the entry's
    /// creation timestamp so it never removes a newer entry that reused the
    /// same fingerprint.
    pub fn complete(&self, fingerprint: &Fingerprint, result: ResponseSnapshot) {
        let created_at = {
            let map = self.lock_map();
            match map.get(fingerprint) {
                Some(entry) => {
                    entry.tx.send_replace(Some(result));
                    entry.created_at
                }
                // Entry vanished before completion; nothing to wake.
                None => return,
            }
        };

        let registry = self.clone();
        let fingerprint = fingerprint.clone();
        tokio::spawn(async move {
            tokio::time::sleep(CLEANUP_GRACE).await;
            registry.remove_if_created_at(&fingerprint, created_at);
        });
    }

    /// Returns a wait handle if an entry exists for `fingerprint` and has not
    /// completed yet. Used by last-result lookup to join an in-flight call
    /// without ever becoming a leader.
    pub fn subscribe_in_flight(&self, fingerprint: &Fingerprint) -> Option<WaitHandle> {
        let map = self.lock_map();
        map.get(fingerprint)
            .filter(|entry| !entry.is_complete())
            .map(|entry| WaitHandle {
                rx: entry.tx.subscribe(),
            })
    }

    /// Number of live entries (complete or not). Intended for tests and
    /// observability.
    pub fn len(&self) -> usize {
        self.lock_map().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock_map().is_empty()
    }

    fn remove_if_created_at(&self, fingerprint: &Fingerprint, created_at: DateTime<Utc>) {
        let mut map = self.lock_map();
        let matches = map
            .get(fingerprint)
            .is_some_and(|entry| entry.created_at == created_at && entry.is_complete());
        if matches {
            map.remove(fingerprint);
            debug!(fingerprint = %fingerprint, "removed completed pending entry");
        }
    }

    fn lock_map(&self) -> MutexGuard<'_, HashMap<Fingerprint, PendingEntry>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
