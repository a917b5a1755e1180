//! Seams for outbound HTTP.
//!
//! Handlers and the relay core are written against these traits so tests can
//! substitute scripted invokers and count calls; production wires in
//! [`HttpInvoker`]. The trait methods return `impl Future` rather than using
//! `async fn` so the `Send` bound is explicit at the seam.

pub mod http;

pub use http::HttpInvoker;

use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use serde_json::Value;
use thiserror::Error;

use crate::types::{ChatRequest, ResponseSnapshot};

/// An outbound call failed before an HTTP response arrived.
///
/// Responses *with* a status code, however unhappy, are not errors here: they
/// come back as ordinary [`ResponseSnapshot`] values.
#[derive(Debug, Clone, Error)]
pub enum UpstreamError {
    /// Connection, DNS, TLS, timeout, or a malformed URL.
    #[error("upstream transport error: {0}")]
    Transport(String),
}

/// Performs the chat-completion call against the configured upstream.
pub trait UpstreamInvoker {
    fn invoke_chat(
        &self,
        request: &ChatRequest,
        timeout: Duration,
    ) -> impl Future<Output = Result<ResponseSnapshot, UpstreamError>> + Send;
}

/// Posts JSON to an arbitrary URL with caller-supplied headers. Used for
/// outgoing webhook forwarding.
pub trait WebhookInvoker {
    fn post_json(
        &self,
        url: &str,
        headers: &HashMap<String, String>,
        body: &Value,
        timeout: Duration,
    ) -> impl Future<Output = Result<ResponseSnapshot, UpstreamError>> + Send;
}
