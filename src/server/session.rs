//! Active frontend session slot.
//!
//! The frontend may run in several tabs; exactly one of them should drive
//! side effects. `POST /api/browser/active` claims the slot and the others
//! poll `GET /api/browser/active` to learn who holds it. Purely in-memory.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;

use super::{AppState, Invoker};

/// The session currently holding the slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveSession {
    pub session_id: String,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session_id must be a non-empty string")]
    EmptySessionId,
}

impl IntoResponse for SessionError {
    fn into_response(self) -> Response {
        (
            StatusCode::BAD_REQUEST,
            Json(json!({ "detail": self.to_string() })),
        )
            .into_response()
    }
}

#[derive(Debug, Deserialize)]
pub struct SetActiveSessionRequest {
    pub session_id: String,
}

/// `POST /api/browser/active`.
pub async fn set_handler<U: Invoker>(
    State(state): State<AppState<U>>,
    Json(request): Json<SetActiveSessionRequest>,
) -> Result<Json<Value>, SessionError> {
    let session_id = request.session_id.trim();
    if session_id.is_empty() {
        return Err(SessionError::EmptySessionId);
    }

    let session = ActiveSession {
        session_id: session_id.to_string(),
        updated_at: Utc::now(),
    };
    state.set_active_session(session.clone());

    Ok(Json(json!({
        "success": true,
        "session_id": session.session_id,
        "updated_at": session.updated_at,
    })))
}

/// `GET /api/browser/active` — polling endpoint.
pub async fn get_handler<U: Invoker>(State(state): State<AppState<U>>) -> Json<Value> {
    match state.active_session() {
        Some(session) => Json(json!({
            "active": true,
            "session_id": session.session_id,
            "updated_at": session.updated_at,
        })),
        None => Json(json!({
            "active": false,
            "session_id": null,
            "updated_at": null,
        })),
    }
}
