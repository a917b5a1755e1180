//! Production invoker backed by `reqwest`.

use std::collections::HashMap;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use serde_json::Value;
use tracing::debug;

use super::{UpstreamError, UpstreamInvoker, WebhookInvoker};
use crate::types::{ChatRequest, ResponseSnapshot};

/// Shared HTTP client. Cloning shares the underlying connection pool.
#[derive(Clone, Default)]
pub struct HttpInvoker {
    client: reqwest::Client,
}

impl HttpInvoker {
    pub fn new() -> Self {
        HttpInvoker::default()
    }
}

impl UpstreamInvoker for HttpInvoker {
    async fn invoke_chat(
        &self,
        request: &ChatRequest,
        timeout: Duration,
    ) -> Result<ResponseSnapshot, UpstreamError> {
        let url = format!(
            "{}/chat/completions",
            request.base_url.trim().trim_end_matches('/')
        );
        debug!(%url, "relaying chat completion upstream");

        let response = self
            .client
            .post(&url)
            .bearer_auth(request.api_key.trim())
            .json(&request.payload)
            .timeout(timeout)
            .send()
            .await
            .map_err(|err| UpstreamError::Transport(err.to_string()))?;

        Ok(snapshot_from_response(response).await)
    }
}

impl WebhookInvoker for HttpInvoker {
    async fn post_json(
        &self,
        url: &str,
        headers: &HashMap<String, String>,
        body: &Value,
        timeout: Duration,
    ) -> Result<ResponseSnapshot, UpstreamError> {
        let mut header_map = HeaderMap::new();
        for (name, value) in headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|err| UpstreamError::Transport(format!("invalid header name: {err}")))?;
            let value = HeaderValue::from_str(value)
                .map_err(|err| UpstreamError::Transport(format!("invalid header value: {err}")))?;
            header_map.insert(name, value);
        }

        let response = self
            .client
            .post(url)
            .headers(header_map)
            .json(body)
            .timeout(timeout)
            .send()
            .await
            .map_err(|err| UpstreamError::Transport(err.to_string()))?;

        Ok(snapshot_from_response(response).await)
    }
}

/// Captures a `reqwest` response as a snapshot.
///
/// Bodies declared `application/json` that parse cleanly land in `json`;
/// everything else, including malformed JSON, is kept verbatim as text.
async fn snapshot_from_response(response: reqwest::Response) -> ResponseSnapshot {
    let status_code = response.status().as_u16();
    let content_type = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();

    let body = match response.bytes().await {
        Ok(bytes) => bytes,
        Err(err) => {
            // Connection died mid-body; report what we can.
            return ResponseSnapshot::bad_gateway(format!("failed reading upstream body: {err}"));
        }
    };

    if content_type.starts_with("application/json") {
        if let Ok(value) = serde_json::from_slice::<Value>(&body) {
            return ResponseSnapshot {
                status_code,
                content_type,
                json: Some(value),
                text: None,
            };
        }
    }

    ResponseSnapshot {
        status_code,
        content_type,
        json: None,
        text: Some(String::from_utf8_lossy(&body).into_owned()),
    }
}
