//! Health check endpoint for liveness probes.

use axum::Json;
use serde_json::{json, Value};

/// Health check handler.
///
/// Reports the service name and version along with a static "healthy" status;
/// reaching the handler at all is the liveness signal.
pub async fn health_handler() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "service": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
