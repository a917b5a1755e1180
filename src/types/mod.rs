//! Shared wire types for the relay.
//!
//! The backend is a pure relay: payloads pass through untouched, and upstream
//! responses are captured as [`ResponseSnapshot`] values so they can be
//! broadcast to coalesced waiters and replayed from the last-result cache.

pub mod request;
pub mod snapshot;

pub use request::ChatRequest;
pub use snapshot::ResponseSnapshot;
