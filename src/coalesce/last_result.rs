//! Single-slot cache of the most recent successful upstream exchange.
//!
//! A client that fired a relay request and then lost the response (page
//! reload, dropped connection) can ask for the last result of the *same*
//! logical request without triggering a new upstream call. Only successful
//! exchanges (status < 400) are recorded; an upstream failure leaves the
//! previous success in place.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};

use crate::types::{ChatRequest, ResponseSnapshot};

/// The cached exchange: the request that produced it plus its response.
#[derive(Debug, Clone, PartialEq)]
pub struct LastResultRecord {
    pub request: ChatRequest,
    pub response: ResponseSnapshot,
    pub stored_at: DateTime<Utc>,
}

/// Holds at most one completed exchange. Cheap to clone; all clones share the
/// same slot.
#[derive(Clone, Default)]
pub struct LastResultCache {
    slot: Arc<Mutex<Option<LastResultRecord>>>,
}

impl LastResultCache {
    pub fn new() -> Self {
        LastResultCache::default()
    }

    /// Records a completed exchange, replacing any previous record.
    ///
    /// Error responses are dropped: a failed retry must not evict the last
    /// good answer.
    pub fn record(&self, request: &ChatRequest, response: &ResponseSnapshot) {
        if !response.is_cacheable() {
            return;
        }
        *self.lock_slot() = Some(LastResultRecord {
            request: request.clone(),
            response: response.clone(),
            stored_at: Utc::now(),
        });
    }

    /// Returns the cached response if `request` matches the cached request
    /// field for field.
    pub fn matching(&self, request: &ChatRequest) -> Option<ResponseSnapshot> {
        self.lock_slot()
            .as_ref()
            .filter(|record| record.request == *request)
            .map(|record| record.response.clone())
    }

    /// Copy of the current record, regardless of which request produced it.
    pub fn snapshot(&self) -> Option<LastResultRecord> {
        self.lock_slot().clone()
    }

    fn lock_slot(&self) -> MutexGuard<'_, Option<LastResultRecord>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
