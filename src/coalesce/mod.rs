//! Singleflight coalescing for upstream relay calls.
//!
//! Concurrent identical relay requests would otherwise each hit the (slow,
//! often metered) upstream API. This module deduplicates them: the first
//! caller to register a fingerprint becomes the *leader* and performs the
//! real call; everyone else becomes a *follower* and awaits the broadcast
//! outcome. A single-slot cache of the most recent successful exchange lets
//! a client that lost a response recover it without re-invoking upstream.

pub mod fingerprint;
pub mod last_result;
pub mod registry;

pub use fingerprint::Fingerprint;
pub use last_result::{LastResultCache, LastResultRecord};
pub use registry::{Acquired, PendingRegistry, WaitError, WaitHandle};
