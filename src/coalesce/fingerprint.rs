//! Deterministic request fingerprints.
//!
//! Two relay requests coalesce onto one upstream call exactly when their
//! fingerprints match. The fingerprint embeds the full canonical content of
//! the request (no hashing): trimmed base URL, trimmed API key, and the
//! payload serialized with recursively sorted keys and minimal separators,
//! joined with `|`. Embedding the content trades memory for simplicity —
//! there is nothing to collide.

use std::fmt;

use serde_json::Value;

use crate::types::ChatRequest;

/// A deterministic key identifying a logically equivalent relay request.
///
/// Stable across process restarts: the construction depends only on request
/// content, never on addresses or random state.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Builds the fingerprint for a chat-completion relay request.
    pub fn for_chat(request: &ChatRequest) -> Self {
        Fingerprint(format!(
            "{}|{}|{}",
            request.base_url.trim(),
            request.api_key.trim(),
            canonical_payload(&request.payload)
        ))
    }

    /// Returns the key as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Serializes a payload canonically: object keys sorted recursively, `,` and
/// `:` separators, no whitespace.
///
/// Scalars that somehow fail to serialize fall back to their `Display`
/// rendering, which is stable for `serde_json::Value`.
pub fn canonical_payload(payload: &Value) -> String {
    let mut out = String::new();
    write_canonical(payload, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();

            out.push('{');
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_scalar(&Value::String((*key).clone()), out);
                out.push(':');
                if let Some(child) = map.get(*key) {
                    write_canonical(child, out);
                }
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => write_scalar(scalar, out),
    }
}

fn write_scalar(value: &Value, out: &mut String) {
    match serde_json::to_string(value) {
        Ok(encoded) => out.push_str(&encoded),
        Err(_) => out.push_str(&value.to_string()),
    }
}
