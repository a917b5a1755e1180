//! HTTP boundary for the relay backend.
//!
//! This module wires the relay core, the file store, the webhook inbox, and
//! the session slot into an axum router:
//!
//! - `POST /api/ai/chat/completions` — coalescing upstream relay
//! - `POST /api/ai/chat/completions/last` — replay of the last result
//! - `POST /api/files/{read,write,delete}` — crash-safe file store
//! - `POST /api/webhook/post` — outbound webhook forwarding
//! - `GET|POST /webhook`, `GET /api/webhook/incoming` — inbound webhooks
//! - `GET|POST /api/browser/active` — active session slot
//! - `GET /api/health` — liveness
//!
//! The state is generic over the invoker so integration tests drive the
//! whole router against a scripted upstream.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub mod chat;
pub mod files;
pub mod health;
pub mod session;
pub mod webhook;

pub use health::health_handler;

use crate::inbox::NotificationInbox;
use crate::relay::RelayService;
use crate::store::FileStore;
use crate::upstream::{UpstreamInvoker, WebhookInvoker};
use session::ActiveSession;

/// Everything a production invoker must satisfy to back the router.
pub trait Invoker: UpstreamInvoker + WebhookInvoker + Clone + Send + Sync + 'static {}

impl<T> Invoker for T where T: UpstreamInvoker + WebhookInvoker + Clone + Send + Sync + 'static {}

/// Shared application state, passed to handlers via axum's `State`.
pub struct AppState<U> {
    inner: Arc<AppStateInner<U>>,
}

impl<U> Clone for AppState<U> {
    fn clone(&self) -> Self {
        AppState {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct AppStateInner<U> {
    /// Data directory; also where `settings.json` lives.
    data_dir: PathBuf,
    store: FileStore,
    relay: RelayService<U>,
    invoker: U,
    inbox: NotificationInbox,
    session: Mutex<Option<ActiveSession>>,
}

impl<U: Invoker> AppState<U> {
    pub fn new(
        data_dir: impl Into<PathBuf>,
        backup_dir: impl Into<PathBuf>,
        invoker: U,
    ) -> Self {
        let data_dir = data_dir.into();
        AppState {
            inner: Arc::new(AppStateInner {
                store: FileStore::new(data_dir.clone(), backup_dir.into()),
                relay: RelayService::new(invoker.clone()),
                invoker,
                inbox: NotificationInbox::new(),
                session: Mutex::new(None),
                data_dir,
            }),
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.inner.data_dir
    }

    pub fn store(&self) -> &FileStore {
        &self.inner.store
    }

    pub fn relay(&self) -> &RelayService<U> {
        &self.inner.relay
    }

    pub fn invoker(&self) -> &U {
        &self.inner.invoker
    }

    pub fn inbox(&self) -> &NotificationInbox {
        &self.inner.inbox
    }

    pub fn active_session(&self) -> Option<ActiveSession> {
        self.inner
            .session
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn set_active_session(&self, session: ActiveSession) {
        *self
            .inner
            .session
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(session);
    }
}

/// Builds the axum router with all endpoints and the trace/CORS layers.
pub fn build_router<U: Invoker>(state: AppState<U>) -> Router {
    Router::new()
        .route("/api/health", get(health_handler))
        .route("/api/files/read", post(files::read_handler::<U>))
        .route("/api/files/write", post(files::write_handler::<U>))
        .route("/api/files/delete", post(files::delete_handler::<U>))
        .route(
            "/api/ai/chat/completions",
            post(chat::completions_handler::<U>),
        )
        .route(
            "/api/ai/chat/completions/last",
            post(chat::last_handler::<U>),
        )
        .route("/api/webhook/post", post(webhook::post_handler::<U>))
        .route(
            "/webhook",
            get(webhook::incoming_get_handler::<U>).post(webhook::incoming_post_handler::<U>),
        )
        .route(
            "/api/webhook/incoming",
            get(webhook::incoming_list_handler::<U>),
        )
        .route(
            "/api/browser/active",
            get(session::get_handler::<U>).post(session::set_handler::<U>),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[cfg(test)]
mod integration_tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use serde_json::{json, Value};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tempfile::tempdir;
    use tower::ServiceExt;

    use crate::types::{ChatRequest, ResponseSnapshot};
    use crate::upstream::UpstreamError;

    #[derive(Clone)]
    struct MockInvoker {
        chat_calls: Arc<AtomicUsize>,
        chat_response: ResponseSnapshot,
        webhook_status: u16,
        webhook_calls: Arc<Mutex<Vec<(String, Value)>>>,
    }

    impl Default for MockInvoker {
        fn default() -> Self {
            MockInvoker {
                chat_calls: Arc::new(AtomicUsize::new(0)),
                chat_response: ResponseSnapshot::json(
                    200,
                    json!({"choices": [{"message": {"content": "hi"}}]}),
                ),
                webhook_status: 200,
                webhook_calls: Arc::new(Mutex::new(Vec::new())),
            }
        }
    }

    impl UpstreamInvoker for MockInvoker {
        async fn invoke_chat(
            &self,
            _request: &ChatRequest,
            _timeout: Duration,
        ) -> Result<ResponseSnapshot, UpstreamError> {
            self.chat_calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.chat_response.clone())
        }
    }

    impl WebhookInvoker for MockInvoker {
        async fn post_json(
            &self,
            url: &str,
            _headers: &HashMap<String, String>,
            body: &Value,
            _timeout: Duration,
        ) -> Result<ResponseSnapshot, UpstreamError> {
            self.webhook_calls
                .lock()
                .unwrap()
                .push((url.to_string(), body.clone()));
            Ok(ResponseSnapshot::json(self.webhook_status, json!({})))
        }
    }

    fn test_state() -> (AppState<MockInvoker>, MockInvoker, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let invoker = MockInvoker::default();
        let state = AppState::new(
            dir.path().join("data"),
            dir.path().join("backup"),
            invoker.clone(),
        );
        std::fs::create_dir_all(state.data_dir()).unwrap();
        (state, invoker, dir)
    }

    fn write_settings(state: &AppState<MockInvoker>, settings: Value) {
        std::fs::write(
            state.data_dir().join("settings.json"),
            serde_json::to_vec(&settings).unwrap(),
        )
        .unwrap();
    }

    fn json_request(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_vec(&body).unwrap()))
            .unwrap()
    }

    fn get_request(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn chat_body(n: u32) -> Value {
        json!({
            "base_url": "https://api.example.test/v1",
            "api_key": "secret",
            "payload": {"model": "gpt-test", "n": n}
        })
    }

    // ─── Health ───

    #[tokio::test]
    async fn health_returns_healthy_json() {
        let (state, _invoker, _dir) = test_state();
        let response = build_router(state)
            .oneshot(get_request("/api/health"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["status"], "healthy");
    }

    // ─── Files ───

    #[tokio::test]
    async fn files_write_read_delete_cycle() {
        let (state, _invoker, _dir) = test_state();
        let app = build_router(state);

        let response = app
            .clone()
            .oneshot(json_request(
                "/api/files/write",
                json!({"file_path": "notes/today.txt", "content": "hello"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["content_length"], 5);

        let response = app
            .clone()
            .oneshot(json_request(
                "/api/files/read",
                json!({"file_path": "notes/today.txt"}),
            ))
            .await
            .unwrap();
        let body = body_json(response).await;
        assert_eq!(body["content"], "hello");

        let response = app
            .clone()
            .oneshot(json_request(
                "/api/files/delete",
                json!({"file_path": "notes/today.txt"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .oneshot(json_request(
                "/api/files/read",
                json!({"file_path": "notes/today.txt"}),
            ))
            .await
            .unwrap();
        let body = body_json(response).await;
        assert_eq!(body["content"], Value::Null);
    }

    #[tokio::test]
    async fn files_traversal_is_rejected() {
        let (state, _invoker, _dir) = test_state();
        let app = build_router(state);

        for uri in ["/api/files/read", "/api/files/write", "/api/files/delete"] {
            let mut body = json!({"file_path": "../escape.txt"});
            if uri.ends_with("write") {
                body["content"] = json!("x");
            }
            let response = app.clone().oneshot(json_request(uri, body)).await.unwrap();
            assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{uri}");
        }
    }

    #[tokio::test]
    async fn files_disallowed_extension_is_rejected() {
        let (state, _invoker, _dir) = test_state();
        let response = build_router(state)
            .oneshot(json_request(
                "/api/files/write",
                json!({"file_path": "run.sh", "content": "#!"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    // ─── Chat relay ───

    #[tokio::test]
    async fn completions_relays_the_upstream_response() {
        let (state, invoker, _dir) = test_state();
        let response = build_router(state)
            .oneshot(json_request("/api/ai/chat/completions", chat_body(1)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["choices"][0]["message"]["content"], "hi");
        assert_eq!(invoker.chat_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn completions_rejects_mismatched_base_url() {
        let (state, invoker, _dir) = test_state();
        write_settings(&state, json!({"baseUrl": "https://api.example.test/v1"}));
        let app = build_router(state);

        let mut body = chat_body(1);
        body["base_url"] = json!("https://evil.test/v1");
        let response = app
            .oneshot(json_request("/api/ai/chat/completions", body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(invoker.chat_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn completions_accepts_equivalent_base_url() {
        let (state, _invoker, _dir) = test_state();
        write_settings(&state, json!({"baseUrl": "https://api.example.test/v1/"}));
        let response = build_router(state)
            .oneshot(json_request("/api/ai/chat/completions", chat_body(1)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn last_replays_without_a_second_upstream_call() {
        let (state, invoker, _dir) = test_state();
        let app = build_router(state);

        app.clone()
            .oneshot(json_request("/api/ai/chat/completions", chat_body(1)))
            .await
            .unwrap();

        let response = app
            .oneshot(json_request("/api/ai/chat/completions/last", chat_body(1)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["choices"][0]["message"]["content"], "hi");
        assert_eq!(invoker.chat_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn last_without_history_is_204() {
        let (state, invoker, _dir) = test_state();
        let response = build_router(state)
            .oneshot(json_request("/api/ai/chat/completions/last", chat_body(7)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert_eq!(invoker.chat_calls.load(Ordering::SeqCst), 0);
    }

    // ─── Outbound webhook ───

    #[tokio::test]
    async fn webhook_post_returns_status_only() {
        let (state, invoker, _dir) = test_state();
        let response = build_router(state)
            .oneshot(json_request(
                "/api/webhook/post",
                json!({"url": "https://hooks.test/h", "payload": {"event": "done"}}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        assert!(bytes.is_empty());

        let calls = invoker.webhook_calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, "https://hooks.test/h");
        assert_eq!(calls[0].1, json!({"event": "done"}));
    }

    #[tokio::test]
    async fn webhook_post_rejects_non_http_schemes() {
        let (state, _invoker, _dir) = test_state();
        let response = build_router(state)
            .oneshot(json_request(
                "/api/webhook/post",
                json!({"url": "ftp://hooks.test/h", "payload": {}}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn webhook_post_rejects_unconfigured_destination() {
        let (state, invoker, _dir) = test_state();
        write_settings(&state, json!({"webhookUrl": "https://hooks.test/h"}));
        let response = build_router(state)
            .oneshot(json_request(
                "/api/webhook/post",
                json!({"url": "https://other.test/h", "payload": {}}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert!(invoker.webhook_calls.lock().unwrap().is_empty());
    }

    // ─── Inbound webhook ───

    #[tokio::test]
    async fn incoming_is_forbidden_when_disabled() {
        let (state, _invoker, _dir) = test_state();
        let response = build_router(state)
            .oneshot(json_request("/webhook", json!({"ping": 1})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn incoming_post_accepts_json_and_assigns_ids() {
        let (state, _invoker, _dir) = test_state();
        write_settings(&state, json!({"enableIncomingWebhook": true}));
        let app = build_router(state);

        let response = app
            .clone()
            .oneshot(json_request("/webhook", json!({"ping": 1})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["id"], 1);
        assert_eq!(body["size"], 1);

        let body = body_json(
            app.oneshot(json_request("/webhook", json!({"ping": 2})))
                .await
                .unwrap(),
        )
        .await;
        assert_eq!(body["id"], 2);
        assert_eq!(body["size"], 2);
    }

    #[tokio::test]
    async fn incoming_post_rejects_non_json_bodies() {
        let (state, _invoker, _dir) = test_state();
        write_settings(&state, json!({"enableIncomingWebhook": true}));

        let request = Request::builder()
            .method("POST")
            .uri("/webhook")
            .body(Body::from("not json"))
            .unwrap();
        let response = build_router(state).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn incoming_get_turns_duplicate_query_keys_into_arrays() {
        let (state, _invoker, _dir) = test_state();
        write_settings(&state, json!({"enableIncomingWebhook": true}));
        let app = build_router(state);

        let response = app
            .clone()
            .oneshot(get_request("/webhook?tag=a&tag=b&name=n"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let listing = body_json(
            app.oneshot(get_request("/api/webhook/incoming"))
                .await
                .unwrap(),
        )
        .await;
        assert_eq!(listing["records"][0]["data"]["tag"], json!(["a", "b"]));
        assert_eq!(listing["records"][0]["data"]["name"], "n");
    }

    #[tokio::test]
    async fn incoming_listing_supports_since_id_and_limit() {
        let (state, _invoker, _dir) = test_state();
        write_settings(&state, json!({"enableIncomingWebhook": true}));
        let app = build_router(state);

        for i in 0..5 {
            app.clone()
                .oneshot(json_request("/webhook", json!({"n": i})))
                .await
                .unwrap();
        }

        let listing = body_json(
            app.clone()
                .oneshot(get_request("/api/webhook/incoming?sinceId=3"))
                .await
                .unwrap(),
        )
        .await;
        assert_eq!(listing["enabled"], true);
        assert_eq!(listing["size"], 5);
        assert_eq!(listing["maxSize"], 30);
        assert_eq!(listing["lastId"], 5);
        let ids: Vec<u64> = listing["records"]
            .as_array()
            .unwrap()
            .iter()
            .map(|r| r["id"].as_u64().unwrap())
            .collect();
        assert_eq!(ids, vec![4, 5]);

        let listing = body_json(
            app.oneshot(get_request("/api/webhook/incoming?limit=2"))
                .await
                .unwrap(),
        )
        .await;
        let ids: Vec<u64> = listing["records"]
            .as_array()
            .unwrap()
            .iter()
            .map(|r| r["id"].as_u64().unwrap())
            .collect();
        assert_eq!(ids, vec![4, 5]);
    }

    #[tokio::test]
    async fn incoming_listing_hides_records_while_disabled() {
        let (state, _invoker, _dir) = test_state();
        write_settings(&state, json!({"enableIncomingWebhook": true}));
        let app = build_router(state.clone());

        app.clone()
            .oneshot(json_request("/webhook", json!({"n": 1})))
            .await
            .unwrap();

        write_settings(&state, json!({"enableIncomingWebhook": false}));
        let listing = body_json(
            app.oneshot(get_request("/api/webhook/incoming"))
                .await
                .unwrap(),
        )
        .await;
        assert_eq!(listing["enabled"], false);
        assert_eq!(listing["size"], 1);
        assert_eq!(listing["records"], json!([]));
    }

    // ─── Session slot ───

    #[tokio::test]
    async fn session_slot_round_trip() {
        let (state, _invoker, _dir) = test_state();
        let app = build_router(state);

        let body = body_json(
            app.clone()
                .oneshot(get_request("/api/browser/active"))
                .await
                .unwrap(),
        )
        .await;
        assert_eq!(body["active"], false);
        assert_eq!(body["session_id"], Value::Null);

        let response = app
            .clone()
            .oneshot(json_request(
                "/api/browser/active",
                json!({"session_id": "  tab-42  "}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["session_id"], "tab-42");

        let body = body_json(
            app.oneshot(get_request("/api/browser/active"))
                .await
                .unwrap(),
        )
        .await;
        assert_eq!(body["active"], true);
        assert_eq!(body["session_id"], "tab-42");
    }

    #[tokio::test]
    async fn session_set_rejects_blank_ids() {
        let (state, _invoker, _dir) = test_state();
        let response = build_router(state)
            .oneshot(json_request(
                "/api/browser/active",
                json!({"session_id": "   "}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
