//! chat-relay - a local backend for a chat-completion frontend.
//!
//! This library provides the coalescing upstream relay, the crash-safe file
//! store, and the webhook plumbing behind the HTTP API.

pub mod coalesce;
pub mod config;
pub mod inbox;
pub mod relay;
pub mod server;
pub mod store;
pub mod types;
pub mod upstream;
