//! Runtime settings, read from `settings.json` in the data directory.
//!
//! The frontend owns this file and rewrites it through the file store, so it
//! is re-read on every request rather than cached. Reads are best effort: a
//! missing or unparsable file simply means defaults apply and the URL
//! consistency checks are skipped.

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use tracing::warn;
use url::Url;

/// Relay default when `networkTimeoutSeconds` is absent or invalid.
pub const DEFAULT_RELAY_TIMEOUT_SECS: f64 = 60.0;

/// Webhook forwarding default when `networkTimeoutSeconds` is absent.
pub const DEFAULT_WEBHOOK_TIMEOUT_SECS: f64 = 30.0;

/// Margin a coalesced follower waits beyond the upstream timeout.
pub const FOLLOWER_WAIT_MARGIN_SECS: f64 = 5.0;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    pub network_timeout_seconds: Option<f64>,
    pub base_url: Option<String>,
    pub webhook_url: Option<String>,
    pub enable_incoming_webhook: Option<bool>,
}

impl Settings {
    /// Reads `settings.json` from the data directory.
    ///
    /// Never fails: absence or corruption yields defaults with a warning.
    pub fn load(data_dir: &Path) -> Settings {
        let path = data_dir.join("settings.json");
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(_) => return Settings::default(),
        };
        match serde_json::from_str(&raw) {
            Ok(settings) => settings,
            Err(err) => {
                warn!(path = %path.display(), error = %err, "unparsable settings.json, using defaults");
                Settings::default()
            }
        }
    }

    /// Upstream timeout for the relay call.
    pub fn relay_timeout(&self) -> Duration {
        self.timeout_or(DEFAULT_RELAY_TIMEOUT_SECS)
    }

    /// Default timeout for webhook forwarding when the client names none.
    pub fn webhook_timeout(&self) -> Duration {
        self.timeout_or(DEFAULT_WEBHOOK_TIMEOUT_SECS)
    }

    /// How long a coalesced follower waits for the leader: the upstream
    /// timeout plus a small margin, so the leader always finishes or fails
    /// first.
    pub fn follower_wait_timeout(&self) -> Duration {
        self.relay_timeout() + Duration::from_secs_f64(FOLLOWER_WAIT_MARGIN_SECS)
    }

    /// Configured base URL for the consistency check, if any. Blank strings
    /// count as unconfigured.
    pub fn base_url(&self) -> Option<&str> {
        self.base_url.as_deref().map(str::trim).filter(|s| !s.is_empty())
    }

    /// Configured webhook URL for the consistency check, if any.
    pub fn webhook_url(&self) -> Option<&str> {
        self.webhook_url
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    /// Whether the inbound `/webhook` endpoint accepts deliveries. Off unless
    /// explicitly enabled.
    pub fn incoming_webhook_enabled(&self) -> bool {
        self.enable_incoming_webhook == Some(true)
    }

    fn timeout_or(&self, default_secs: f64) -> Duration {
        let secs = match self.network_timeout_seconds {
            Some(v) if v.is_finite() && v >= 0.0 => v,
            _ => default_secs,
        };
        Duration::from_secs_f64(secs)
    }
}

/// Canonicalizes a URL for value-equality comparison: scheme and host
/// lowercased, default port dropped, trailing slash stripped from the path,
/// query and fragment ignored. Unparsable input falls back to the trimmed
/// string with any trailing slash stripped.
pub fn normalize_url(raw: &str) -> String {
    let trimmed = raw.trim();
    match Url::parse(trimmed) {
        Ok(url) => {
            let scheme = url.scheme().to_ascii_lowercase();
            let host = url.host_str().unwrap_or("").to_ascii_lowercase();
            let port = match url.port() {
                Some(port) => format!(":{port}"),
                None => String::new(),
            };
            let path = url.path().trim_end_matches('/');
            format!("{scheme}://{host}{port}{path}")
        }
        Err(_) => trimmed.trim_end_matches('/').to_string(),
    }
}
