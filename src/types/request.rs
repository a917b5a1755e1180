//! Inbound relay request shape.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A chat-completion relay request.
///
/// The payload is forwarded to the upstream API verbatim; the backend never
/// inspects or rewrites it. Field-for-field equality of two `ChatRequest`
/// values is what the last-result cache uses to decide whether a stored
/// response belongs to the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatRequest {
    /// Base URL of the OpenAI-compatible API.
    pub base_url: String,

    /// API key, sent as a bearer token.
    pub api_key: String,

    /// Opaque request payload, forwarded as-is.
    pub payload: Value,
}
