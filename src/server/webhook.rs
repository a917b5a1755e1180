//! Webhook endpoints, outbound and inbound.
//!
//! Outbound: `POST /api/webhook/post` forwards a JSON payload to a
//! destination URL that must match the configured webhook URL; only the
//! upstream status code is returned, never the body.
//!
//! Inbound: `GET|POST /webhook` accepts deliveries into the in-memory inbox
//! when enabled; `GET /api/webhook/incoming` is the polling endpoint.

use std::collections::HashMap;

use axum::body::Bytes;
use axum::extract::{Query, RawQuery, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use thiserror::Error;
use tracing::{info, warn};
use url::Url;

use super::{AppState, Invoker};
use crate::config::{normalize_url, Settings};
use crate::inbox;
use crate::upstream::UpstreamError;

#[derive(Debug, Error)]
pub enum WebhookError {
    /// Destination is not an absolute http(s) URL.
    #[error("invalid webhook URL: {0}")]
    InvalidUrl(String),

    /// Destination does not match the configured webhook URL.
    #[error("security error: webhook URL mismatch")]
    UrlMismatch,

    /// Inbound deliveries are disabled by settings.
    #[error("incoming webhook is disabled by settings")]
    IncomingDisabled,

    /// Inbound POST body was not valid JSON.
    #[error("invalid JSON body")]
    InvalidJson,

    /// Forwarding failed before an HTTP response arrived.
    #[error("upstream request failed: {0}")]
    Upstream(#[from] UpstreamError),
}

impl IntoResponse for WebhookError {
    fn into_response(self) -> Response {
        let status = match &self {
            WebhookError::InvalidUrl(_) | WebhookError::InvalidJson => StatusCode::BAD_REQUEST,
            WebhookError::UrlMismatch | WebhookError::IncomingDisabled => StatusCode::FORBIDDEN,
            WebhookError::Upstream(_) => StatusCode::BAD_GATEWAY,
        };
        (status, Json(json!({ "detail": self.to_string() }))).into_response()
    }
}

#[derive(Debug, Deserialize)]
pub struct WebhookPostRequest {
    pub url: String,
    pub payload: Value,
    #[serde(default)]
    pub headers: Option<HashMap<String, String>>,
    /// Seconds; the configured default applies when absent.
    #[serde(default)]
    pub timeout: Option<f64>,
}

/// `POST /api/webhook/post`.
///
/// Responds with the upstream's status code and an empty body; the upstream
/// body goes to the log only.
pub async fn post_handler<U: Invoker>(
    State(state): State<AppState<U>>,
    Json(request): Json<WebhookPostRequest>,
) -> Result<Response, WebhookError> {
    let destination = Url::parse(request.url.trim())
        .map_err(|_| WebhookError::InvalidUrl(request.url.clone()))?;
    if !matches!(destination.scheme(), "http" | "https") {
        return Err(WebhookError::InvalidUrl(request.url.clone()));
    }

    let settings = Settings::load(state.data_dir());
    if let Some(expected) = settings.webhook_url() {
        if normalize_url(&request.url) != normalize_url(expected) {
            warn!(provided = %request.url, "rejecting webhook to unconfigured URL");
            return Err(WebhookError::UrlMismatch);
        }
    }

    let timeout = match request.timeout {
        Some(secs) if secs.is_finite() && secs > 0.0 => std::time::Duration::from_secs_f64(secs),
        _ => settings.webhook_timeout(),
    };
    let headers = request.headers.unwrap_or_default();

    let upstream = state
        .invoker()
        .post_json(request.url.trim(), &headers, &request.payload, timeout)
        .await?;
    info!(
        status = upstream.status_code,
        "webhook forwarded; returning status only"
    );

    let status =
        StatusCode::from_u16(upstream.status_code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    Ok(status.into_response())
}

/// `GET /webhook` — accepts a delivery encoded as query parameters.
pub async fn incoming_get_handler<U: Invoker>(
    State(state): State<AppState<U>>,
    RawQuery(query): RawQuery,
) -> Result<Json<Value>, WebhookError> {
    ensure_incoming_enabled(&state)?;
    let data = query_to_json(query.as_deref().unwrap_or(""));
    Ok(accept(&state, data))
}

/// `POST /webhook` — accepts a JSON delivery body.
pub async fn incoming_post_handler<U: Invoker>(
    State(state): State<AppState<U>>,
    body: Bytes,
) -> Result<Json<Value>, WebhookError> {
    ensure_incoming_enabled(&state)?;
    let data: Value = serde_json::from_slice(&body).map_err(|_| WebhookError::InvalidJson)?;
    Ok(accept(&state, data))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncomingListQuery {
    /// Lenient strings: unparsable values fall back to defaults instead of
    /// rejecting the poll.
    pub limit: Option<String>,
    pub since_id: Option<String>,
}

/// `GET /api/webhook/incoming` — polling endpoint.
///
/// Metadata is reported even while inbound deliveries are disabled; only the
/// record list is withheld.
pub async fn incoming_list_handler<U: Invoker>(
    State(state): State<AppState<U>>,
    Query(query): Query<IncomingListQuery>,
) -> Json<Value> {
    let enabled = Settings::load(state.data_dir()).incoming_webhook_enabled();

    let limit = query
        .limit
        .as_deref()
        .and_then(|raw| raw.trim().parse::<usize>().ok())
        .unwrap_or(inbox::MAX_RECORDS)
        .clamp(1, inbox::MAX_RECORDS);
    let since_id = query
        .since_id
        .as_deref()
        .and_then(|raw| raw.trim().parse::<u64>().ok());

    let records = if enabled {
        state.inbox().records(limit, since_id)
    } else {
        Vec::new()
    };
    let last = state.inbox().last_meta();

    Json(json!({
        "enabled": enabled,
        "size": state.inbox().len(),
        "maxSize": inbox::MAX_RECORDS,
        "lastId": last.map(|(id, _)| id),
        "lastReceivedAt": last.map(|(_, at)| at),
        "records": records,
    }))
}

fn ensure_incoming_enabled<U: Invoker>(state: &AppState<U>) -> Result<(), WebhookError> {
    if Settings::load(state.data_dir()).incoming_webhook_enabled() {
        Ok(())
    } else {
        Err(WebhookError::IncomingDisabled)
    }
}

fn accept<U: Invoker>(state: &AppState<U>, data: Value) -> Json<Value> {
    let record = state.inbox().push(data);
    info!(id = record.id, "accepted incoming webhook delivery");
    Json(json!({
        "success": true,
        "id": record.id,
        "receivedAt": record.received_at,
        "size": state.inbox().len(),
    }))
}

/// Converts a raw query string into a JSON object. Repeated keys collapse
/// into arrays; single occurrences stay scalar strings.
fn query_to_json(query: &str) -> Value {
    let mut object: Map<String, Value> = Map::new();
    for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
        let key = key.into_owned();
        let value = Value::String(value.into_owned());
        match object.get_mut(&key) {
            None => {
                object.insert(key, value);
            }
            Some(Value::Array(items)) => items.push(value),
            Some(existing) => {
                let first = existing.take();
                *existing = Value::Array(vec![first, value]);
            }
        }
    }
    Value::Object(object)
}
