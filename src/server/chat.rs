//! Chat-completion relay endpoints.
//!
//! `POST /api/ai/chat/completions` forwards the payload verbatim to the
//! OpenAI-compatible upstream, coalescing concurrent identical requests onto
//! one call. `POST /api/ai/chat/completions/last` replays the most recent
//! completed result for the same logical request, or joins it if it is still
//! in flight.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;
use tracing::warn;

use super::{AppState, Invoker};
use crate::coalesce::registry::WaitError;
use crate::config::{normalize_url, Settings};
use crate::types::ChatRequest;

#[derive(Debug, Error)]
pub enum ChatError {
    /// The request's base URL does not match the configured one.
    #[error("security error: base URL mismatch")]
    BaseUrlMismatch,

    /// A coalesced wait outlived its bound while the upstream call was still
    /// running.
    #[error("upstream request still in progress (timeout)")]
    WaitTimeout,

    /// The in-flight call vanished without producing a result.
    #[error("no result available after waiting")]
    NoResult,
}

impl From<WaitError> for ChatError {
    fn from(err: WaitError) -> Self {
        match err {
            WaitError::Timeout => ChatError::WaitTimeout,
            WaitError::Abandoned => ChatError::NoResult,
        }
    }
}

impl IntoResponse for ChatError {
    fn into_response(self) -> Response {
        let status = match &self {
            ChatError::BaseUrlMismatch => StatusCode::FORBIDDEN,
            ChatError::WaitTimeout => StatusCode::GATEWAY_TIMEOUT,
            ChatError::NoResult => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(json!({ "detail": self.to_string() }))).into_response()
    }
}

/// `POST /api/ai/chat/completions`.
///
/// The relayed upstream status and body come back as-is; an upstream
/// transport failure arrives as a 502 JSON body produced by the relay core.
pub async fn completions_handler<U: Invoker>(
    State(state): State<AppState<U>>,
    Json(request): Json<ChatRequest>,
) -> Result<Response, ChatError> {
    let settings = Settings::load(state.data_dir());
    check_base_url(&settings, &request)?;

    let snapshot = state
        .relay()
        .relay(
            &request,
            settings.relay_timeout(),
            settings.follower_wait_timeout(),
        )
        .await?;
    Ok(snapshot.into_response())
}

/// `POST /api/ai/chat/completions/last`.
///
/// 204 when there is neither a cached result nor an in-flight call for this
/// exact request. Never invokes the upstream.
pub async fn last_handler<U: Invoker>(
    State(state): State<AppState<U>>,
    Json(request): Json<ChatRequest>,
) -> Result<Response, ChatError> {
    let settings = Settings::load(state.data_dir());
    check_base_url(&settings, &request)?;

    match state
        .relay()
        .last_result(&request, settings.follower_wait_timeout())
        .await
    {
        Some(snapshot) => Ok(snapshot.into_response()),
        None => Ok(StatusCode::NO_CONTENT.into_response()),
    }
}

/// Rejects requests whose base URL differs from the configured one. Skipped
/// entirely when no base URL is configured.
fn check_base_url(settings: &Settings, request: &ChatRequest) -> Result<(), ChatError> {
    if let Some(expected) = settings.base_url() {
        if normalize_url(&request.base_url) != normalize_url(expected) {
            warn!(provided = %request.base_url, "rejecting request with mismatched base URL");
            return Err(ChatError::BaseUrlMismatch);
        }
    }
    Ok(())
}
