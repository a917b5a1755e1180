//! Captured upstream responses.

use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A captured upstream response.
///
/// Exactly one of `json` / `text` is meaningful: bodies declared as
/// `application/json` that parse cleanly land in `json`, everything else in
/// `text`. Snapshots are value types — they are cloned freely when broadcast
/// to coalesced waiters, so readers never observe a half-written response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseSnapshot {
    /// HTTP status code reported by the upstream (or synthesized on failure).
    pub status_code: u16,

    /// Content type of the body, as reported by the upstream.
    pub content_type: String,

    /// Parsed JSON body, if the upstream declared and delivered valid JSON.
    pub json: Option<Value>,

    /// Raw text body for everything else.
    pub text: Option<String>,
}

impl ResponseSnapshot {
    /// Creates a snapshot carrying a JSON body.
    pub fn json(status_code: u16, body: Value) -> Self {
        ResponseSnapshot {
            status_code,
            content_type: "application/json".to_string(),
            json: Some(body),
            text: None,
        }
    }

    /// Creates a snapshot carrying a raw text body.
    pub fn text(status_code: u16, content_type: impl Into<String>, body: impl Into<String>) -> Self {
        ResponseSnapshot {
            status_code,
            content_type: content_type.into(),
            json: None,
            text: Some(body.into()),
        }
    }

    /// Synthesizes a 502 snapshot for an upstream transport failure.
    ///
    /// Delivered to the leader and all followers exactly like a real answer,
    /// so followers never re-issue the call.
    pub fn bad_gateway(detail: impl std::fmt::Display) -> Self {
        ResponseSnapshot::json(502, serde_json::json!({ "error": detail.to_string() }))
    }

    /// Synthesizes a 500 snapshot for an unexpected internal failure.
    pub fn internal_error(detail: impl std::fmt::Display) -> Self {
        ResponseSnapshot::json(500, serde_json::json!({ "error": detail.to_string() }))
    }

    /// Whether this snapshot may be stored as the last completed result.
    ///
    /// Error responses (status >= 400) are never cached.
    pub fn is_cacheable(&self) -> bool {
        self.status_code < 400
    }
}

impl IntoResponse for ResponseSnapshot {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.status_code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let content_type = if self.content_type.is_empty() {
            "application/json".to_string()
        } else {
            self.content_type
        };

        let body: Vec<u8> = match (self.json, self.text) {
            (Some(value), _) => serde_json::to_vec(&value).unwrap_or_default(),
            (None, Some(text)) => text.into_bytes(),
            (None, None) => Vec::new(),
        };

        (status, [(header::CONTENT_TYPE, content_type)], body).into_response()
    }
}
