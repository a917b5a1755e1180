//! File store endpoints.
//!
//! Thin wrappers over [`crate::store::FileStore`]: the store does all
//! validation and durability work, these handlers only shape the JSON
//! envelope the frontend expects. Absent files read back as `null` rather
//! than an error.

use axum::extract::State;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{AppState, Invoker};
use crate::store;

#[derive(Debug, Deserialize)]
pub struct FileReadRequest {
    pub file_path: String,
}

#[derive(Debug, Deserialize)]
pub struct FileWriteRequest {
    pub file_path: String,
    pub content: String,
}

#[derive(Debug, Deserialize)]
pub struct FileDeleteRequest {
    pub file_path: String,
}

/// `POST /api/files/read` — returns the file contents, or `null` when the
/// file does not exist.
pub async fn read_handler<U: Invoker>(
    State(state): State<AppState<U>>,
    Json(request): Json<FileReadRequest>,
) -> store::Result<Json<Value>> {
    let content = state.store().read(&request.file_path).await?;
    Ok(Json(json!({
        "success": true,
        "content": content,
        "file_path": request.file_path,
    })))
}

/// `POST /api/files/write` — crash-safe write with backup rotation.
pub async fn write_handler<U: Invoker>(
    State(state): State<AppState<U>>,
    Json(request): Json<FileWriteRequest>,
) -> store::Result<Json<Value>> {
    let content_length = request.content.len();
    state.store().write(&request.file_path, request.content).await?;
    Ok(Json(json!({
        "success": true,
        "file_path": request.file_path,
        "content_length": content_length,
    })))
}

/// `POST /api/files/delete` — idempotent delete.
pub async fn delete_handler<U: Invoker>(
    State(state): State<AppState<U>>,
    Json(request): Json<FileDeleteRequest>,
) -> store::Result<Json<Value>> {
    state.store().delete(&request.file_path).await?;
    Ok(Json(json!({
        "success": true,
        "file_path": request.file_path,
    })))
}
