//! In-memory ring buffer of inbound webhook deliveries.
//!
//! Deliveries are kept only for polling by the frontend; nothing here is
//! persisted. The buffer holds the newest [`MAX_RECORDS`] entries, and every
//! delivery gets a monotonically increasing id so identical payloads remain
//! distinguishable and clients can poll incrementally with `sinceId`.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

/// Newest deliveries retained.
pub const MAX_RECORDS: usize = 30;

/// One accepted delivery.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InboxRecord {
    pub id: u64,
    pub received_at: DateTime<Utc>,
    pub data: Value,
}

#[derive(Default)]
struct InboxState {
    next_id: u64,
    records: VecDeque<InboxRecord>,
}

/// Shared inbox handle. Cheap to clone.
#[derive(Clone, Default)]
pub struct NotificationInbox {
    state: Arc<Mutex<InboxState>>,
}

impl NotificationInbox {
    pub fn new() -> Self {
        NotificationInbox::default()
    }

    /// Accepts a delivery, assigning it the next id and evicting the oldest
    /// record beyond the capacity.
    pub fn push(&self, data: Value) -> InboxRecord {
        let mut state = self.lock_state();
        state.next_id += 1;
        let record = InboxRecord {
            id: state.next_id,
            received_at: Utc::now(),
            data,
        };
        state.records.push_back(record.clone());
        while state.records.len() > MAX_RECORDS {
            state.records.pop_front();
        }
        record
    }

    pub fn len(&self) -> usize {
        self.lock_state().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock_state().records.is_empty()
    }

    /// Id and arrival time of the newest record, if any.
    pub fn last_meta(&self) -> Option<(u64, DateTime<Utc>)> {
        self.lock_state()
            .records
            .back()
            .map(|r| (r.id, r.received_at))
    }

    /// The newest `limit` records, optionally restricted to ids greater than
    /// `since_id`, in arrival order.
    pub fn records(&self, limit: usize, since_id: Option<u64>) -> Vec<InboxRecord> {
        let state = self.lock_state();
        let filtered: Vec<&InboxRecord> = state
            .records
            .iter()
            .filter(|r| since_id.map_or(true, |since| r.id > since))
            .collect();
        let skip = filtered.len().saturating_sub(limit);
        filtered.into_iter().skip(skip).cloned().collect()
    }

    fn lock_state(&self) -> MutexGuard<'_, InboxState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
