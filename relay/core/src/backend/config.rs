//! Backend connection settings

use std::time::Duration;

/// Default backend endpoint
pub const DEFAULT_ENDPOINT: &str = "http://localhost:8080";

/// Default path of the chat route
pub const DEFAULT_CHAT_PATH: &str = "/api/chat";

/// Where and how to reach the chat backend
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BackendConfig {
    /// Base URL, scheme included
    pub endpoint: String,
    /// Path of the chat route, appended to `endpoint`
    pub chat_path: String,
    /// Model name forwarded in the request body
    pub model: Option<String>,
    /// TCP connect timeout in milliseconds
    pub connect_timeout_ms: u64,
    /// Whole-request timeout in seconds (0 = no timeout)
    pub request_timeout_secs: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            chat_path: DEFAULT_CHAT_PATH.to_string(),
            model: None,
            connect_timeout_ms: 5000,
            request_timeout_secs: 120,
        }
    }
}

impl BackendConfig {
    /// Full URL of the chat route
    #[must_use]
    pub fn chat_url(&self) -> String {
        format!("{}{}", self.base_url(), self.chat_path)
    }

    /// Endpoint without a trailing slash
    #[must_use]
    pub fn base_url(&self) -> &str {
        self.endpoint.trim_end_matches('/')
    }

    /// TCP connect timeout
    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Whole-request timeout, `None` when disabled
    #[must_use]
    pub fn request_timeout(&self) -> Option<Duration> {
        (self.request_timeout_secs > 0).then(|| Duration::from_secs(self.request_timeout_secs))
    }
}
