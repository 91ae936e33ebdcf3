//! Client configuration loaded from environment variables.
//!
//! All settings have sensible defaults so a session can start with zero
//! configuration against a local development server.

use std::time::Duration;

use causette_shared::constants::{DEFAULT_SERVER_URL, RECONNECT_DELAY_MS, REQUEST_TIMEOUT_MS};

/// Client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the chat server's HTTP API.
    /// Env: `CAUSETTE_SERVER_URL`
    /// Default: `http://localhost:4000`
    pub server_url: String,

    /// WebSocket endpoint for the event stream.  When unset it is derived
    /// from `server_url` by swapping the scheme (`http` -> `ws`).
    /// Env: `CAUSETTE_WS_URL`
    pub ws_url: Option<String>,

    /// Bearer credential for both the event stream and the HTTP API.
    /// Handed over at login; `CAUSETTE_TOKEN` works for development.
    pub token: String,

    /// Timeout for request/response HTTP calls.
    /// Env: `CAUSETTE_REQUEST_TIMEOUT_MS`
    pub request_timeout: Duration,

    /// Delay between WebSocket reconnection attempts.
    /// Env: `CAUSETTE_RECONNECT_DELAY_MS`
    pub reconnect_delay: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: DEFAULT_SERVER_URL.to_string(),
            ws_url: None,
            token: String::new(),
            request_timeout: Duration::from_millis(REQUEST_TIMEOUT_MS),
            reconnect_delay: Duration::from_millis(RECONNECT_DELAY_MS),
        }
    }
}

impl ClientConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(url) = std::env::var("CAUSETTE_SERVER_URL") {
            config.server_url = url;
        }

        if let Ok(url) = std::env::var("CAUSETTE_WS_URL") {
            if !url.is_empty() {
                config.ws_url = Some(url);
            }
        }

        if let Ok(token) = std::env::var("CAUSETTE_TOKEN") {
            config.token = token;
        }

        if let Ok(val) = std::env::var("CAUSETTE_REQUEST_TIMEOUT_MS") {
            match val.parse::<u64>() {
                Ok(ms) => config.request_timeout = Duration::from_millis(ms),
                Err(_) => {
                    tracing::warn!(value = %val, "Invalid CAUSETTE_REQUEST_TIMEOUT_MS, using default");
                }
            }
        }

        if let Ok(val) = std::env::var("CAUSETTE_RECONNECT_DELAY_MS") {
            match val.parse::<u64>() {
                Ok(ms) => config.reconnect_delay = Duration::from_millis(ms),
                Err(_) => {
                    tracing::warn!(value = %val, "Invalid CAUSETTE_RECONNECT_DELAY_MS, using default");
                }
            }
        }

        // RUST_LOG is handled directly by tracing-subscriber's EnvFilter,
        // so we do not store it here.

        config
    }

    /// The WebSocket endpoint to dial: explicit `ws_url` if set, otherwise
    /// `server_url` with the scheme swapped and `/ws` appended.
    pub fn websocket_url(&self) -> String {
        if let Some(ref url) = self.ws_url {
            return url.clone();
        }

        let base = self.server_url.trim_end_matches('/');
        let swapped = if let Some(rest) = base.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = base.strip_prefix("http://") {
            format!("ws://{rest}")
        } else {
            base.to_string()
        };

        format!("{swapped}/ws")
    }
}
