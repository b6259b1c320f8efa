//! Configuration for the Switchboard transport clients.

use serde::{Deserialize, Serialize};

/// Configuration for the REST client and the push transport.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Base URL of the REST API, e.g. `https://app.example.com/api/v1/accounts/1`.
    pub base_url: String,
    /// WebSocket endpoint for push channels.
    pub push_url: String,
    /// Request timeout in milliseconds.
    pub request_timeout_ms: u64,
    /// Connection timeout in seconds (REST connect and WebSocket handshake).
    pub connection_timeout_secs: u64,
    /// Enable request logging.
    pub enable_logging: bool,
    /// Proxy URL (optional).
    pub proxy_url: String,
    /// Maximum idle connections kept per host.
    pub max_idle_per_host: u32,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            base_url: "http://localhost:3000/api/v1".to_string(),
            push_url: "ws://localhost:3000/cable".to_string(),
            request_timeout_ms: 30000,
            connection_timeout_secs: 10,
            enable_logging: false,
            proxy_url: String::new(),
            max_idle_per_host: 8,
        }
    }
}

impl ClientConfig {
    /// Apply `SWITCHBOARD_BASE_URL` / `SWITCHBOARD_PUSH_URL` overrides.
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(url) = std::env::var("SWITCHBOARD_BASE_URL") {
            self.base_url = url;
        }
        if let Ok(url) = std::env::var("SWITCHBOARD_PUSH_URL") {
            self.push_url = url;
        }
        self
    }

    #[must_use]
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    #[must_use]
    pub fn with_push_url(mut self, url: impl Into<String>) -> Self {
        self.push_url = url.into();
        self
    }
}
