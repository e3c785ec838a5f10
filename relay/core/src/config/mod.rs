//! TOML Configuration File Support
//!
//! Centralized configuration loading for the relay client, backed by a TOML
//! file at `~/.config/relay/client.toml`.
//!
//! # Configuration Priority
//!
//! Highest first:
//! 1. CLI arguments ([`ConfigOverrides`])
//! 2. Environment variables
//! 3. TOML configuration file
//! 4. Default values
//!
//! # Example Configuration
//!
//! ```toml
//! [backend]
//! endpoint = "http://localhost:8080"
//! chat_path = "/api/chat"
//! model = "llama3.2"
//! connect_timeout_ms = 5000
//! request_timeout_secs = 120
//!
//! [stream]
//! parser_mode = "tolerant"
//! max_line_bytes = 1048576
//! channel_capacity = 100
//!
//! [fallback]
//! policy = "simulate"
//! interval_ms = 20
//! chunk_chars = 1
//! ```

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use crate::backend::BackendConfig;
use crate::fallback::{FallbackConfig, FallbackPolicy};
pub use crate::session::StreamConfig;
use crate::transport::ParserMode;

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur when loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read config file
    #[error("Failed to read config file at {path}: {source}")]
    ReadError {
        /// The path that was attempted
        path: PathBuf,
        /// The underlying IO error
        source: std::io::Error,
    },

    /// Failed to parse TOML
    #[error("Failed to parse TOML config: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Invalid configuration value
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

// =============================================================================
// Configuration Source Tracking
// =============================================================================

/// Tracks where a configuration value came from
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfigSource {
    /// Value from command-line argument
    Cli,
    /// Value from environment variable
    Env,
    /// Value from TOML configuration file
    File,
    /// Default value
    #[default]
    Default,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cli => write!(f, "CLI"),
            Self::Env => write!(f, "environment"),
            Self::File => write!(f, "config file"),
            Self::Default => write!(f, "default"),
        }
    }
}

// =============================================================================
// TOML Configuration Structures
// =============================================================================

/// Backend section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendToml {
    /// Base URL of the chat backend
    pub endpoint: Option<String>,

    /// Path of the chat route
    pub chat_path: Option<String>,

    /// Model forwarded in the request body
    pub model: Option<String>,

    /// Connection timeout in milliseconds
    pub connect_timeout_ms: Option<u64>,

    /// Request timeout in seconds (0 = no timeout)
    pub request_timeout_secs: Option<u64>,
}

/// Stream section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamToml {
    /// `tolerant` or `strict`
    pub parser_mode: Option<ParserMode>,

    /// Longest accepted line in bytes
    pub max_line_bytes: Option<usize>,

    /// Capacity of streaming channels
    pub channel_capacity: Option<usize>,
}

/// Fallback section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FallbackToml {
    /// `simulate` or `error`
    pub policy: Option<FallbackPolicy>,

    /// Pause between replayed chunks in milliseconds
    pub interval_ms: Option<u64>,

    /// Characters per replayed chunk
    pub chunk_chars: Option<usize>,

    /// Replacement advisory text
    pub message: Option<String>,
}

/// Top-level TOML configuration structure
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientToml {
    /// Backend configuration section
    pub backend: BackendToml,

    /// Stream configuration section
    pub stream: StreamToml,

    /// Fallback configuration section
    pub fallback: FallbackToml,
}

// =============================================================================
// Main Configuration Struct
// =============================================================================

/// Complete client configuration
///
/// Use [`load_config`] to load it with proper priority handling.
#[derive(Clone, Debug, Default)]
pub struct ClientConfig {
    /// Backend connection
    pub backend: BackendConfig,

    /// Stream handling
    pub stream: StreamConfig,

    /// Behaviour when the backend is unreachable
    pub fallback: FallbackConfig,

    /// Path to the config file that was loaded (if any)
    pub config_file_path: Option<PathBuf>,

    /// Source of configuration values
    source: ConfigSource,
}

impl ClientConfig {
    /// Create a new configuration with default values
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the primary source of this configuration
    #[must_use]
    pub fn source(&self) -> ConfigSource {
        self.source
    }

    /// Set the configuration source
    pub fn set_source(&mut self, source: ConfigSource) {
        self.source = source;
    }

    /// Check values that would make every session fail
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationError` naming the first bad value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.backend.endpoint.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "backend.endpoint must not be empty".to_string(),
            ));
        }
        if !self.backend.chat_path.starts_with('/') {
            return Err(ConfigError::ValidationError(format!(
                "backend.chat_path must start with '/', got '{}'",
                self.backend.chat_path
            )));
        }
        if self.stream.max_line_bytes == 0 {
            return Err(ConfigError::ValidationError(
                "stream.max_line_bytes must be greater than 0".to_string(),
            ));
        }
        if self.stream.channel_capacity == 0 {
            return Err(ConfigError::ValidationError(
                "stream.channel_capacity must be greater than 0".to_string(),
            ));
        }
        if self.fallback.chunk_chars == 0 {
            return Err(ConfigError::ValidationError(
                "fallback.chunk_chars must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

// =============================================================================
// Configuration Loading
// =============================================================================

/// Get the default configuration file path
///
/// Returns `$XDG_CONFIG_HOME/relay/client.toml` or
/// `~/.config/relay/client.toml` if `XDG_CONFIG_HOME` is not set.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("relay").join("client.toml"))
}

/// Load configuration from all sources with proper priority
///
/// CLI overrides are not handled here; apply [`ConfigOverrides`] after.
///
/// # Errors
///
/// Returns an error if the config file exists but cannot be parsed, or if
/// the merged configuration fails [`ClientConfig::validate`]. A missing
/// config file is not an error.
pub fn load_config() -> Result<ClientConfig, ConfigError> {
    load_config_from_path(default_config_path())
}

/// Load configuration from a specific path
///
/// # Errors
///
/// Returns an error if the specified config file cannot be read or parsed,
/// or if the result is invalid.
pub fn load_config_from_path(path: Option<PathBuf>) -> Result<ClientConfig, ConfigError> {
    load_config_with_env(path, |key| std::env::var(key).ok())
}

/// Load configuration with an explicit environment lookup
///
/// # Errors
///
/// See [`load_config_from_path`].
pub fn load_config_with_env<F>(path: Option<PathBuf>, env: F) -> Result<ClientConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut config = ClientConfig::default();

    if let Some(ref config_path) = path {
        if config_path.exists() {
            let toml_content =
                std::fs::read_to_string(config_path).map_err(|e| ConfigError::ReadError {
                    path: config_path.clone(),
                    source: e,
                })?;

            let toml_config: ClientToml = toml::from_str(&toml_content)?;
            apply_toml_config(&mut config, &toml_config);
            config.config_file_path = Some(config_path.clone());
            config.source = ConfigSource::File;

            tracing::info!(
                path = %config_path.display(),
                "Loaded configuration from file"
            );
        } else {
            tracing::debug!(
                path = %config_path.display(),
                "Config file not found, using defaults"
            );
        }
    }

    apply_env_config(&mut config, env);
    config.validate()?;

    Ok(config)
}

/// Apply TOML configuration values to the config struct
fn apply_toml_config(config: &mut ClientConfig, toml: &ClientToml) {
    // Backend settings
    if let Some(ref endpoint) = toml.backend.endpoint {
        config.backend.endpoint.clone_from(endpoint);
    }
    if let Some(ref path) = toml.backend.chat_path {
        config.backend.chat_path.clone_from(path);
    }
    if toml.backend.model.is_some() {
        config.backend.model.clone_from(&toml.backend.model);
    }
    if let Some(timeout) = toml.backend.connect_timeout_ms {
        config.backend.connect_timeout_ms = timeout;
    }
    if let Some(timeout) = toml.backend.request_timeout_secs {
        config.backend.request_timeout_secs = timeout;
    }

    // Stream settings
    if let Some(mode) = toml.stream.parser_mode {
        config.stream.parser_mode = mode;
    }
    if let Some(max) = toml.stream.max_line_bytes {
        config.stream.max_line_bytes = max;
    }
    if let Some(capacity) = toml.stream.channel_capacity {
        config.stream.channel_capacity = capacity;
    }

    // Fallback settings
    if let Some(policy) = toml.fallback.policy {
        config.fallback.policy = policy;
    }
    if let Some(interval) = toml.fallback.interval_ms {
        config.fallback.interval_ms = interval;
    }
    if let Some(chars) = toml.fallback.chunk_chars {
        config.fallback.chunk_chars = chars;
    }
    if let Some(ref message) = toml.fallback.message {
        config.fallback.message.clone_from(message);
    }
}

/// Apply environment variable overrides to the config
///
/// Unparseable values are ignored with a warning.
fn apply_env_config<F>(config: &mut ClientConfig, env: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(endpoint) = env("RELAY_ENDPOINT") {
        config.backend.endpoint = endpoint;
        config.source = ConfigSource::Env;
    }
    if let Some(path) = env("RELAY_CHAT_PATH") {
        config.backend.chat_path = path;
        config.source = ConfigSource::Env;
    }
    if let Some(model) = env("RELAY_MODEL") {
        config.backend.model = Some(model);
        config.source = ConfigSource::Env;
    }
    if let Some(timeout) = env("RELAY_CONNECT_TIMEOUT") {
        if let Some(ms) = parse_env("RELAY_CONNECT_TIMEOUT", &timeout) {
            config.backend.connect_timeout_ms = ms;
            config.source = ConfigSource::Env;
        }
    }
    if let Some(timeout) = env("RELAY_REQUEST_TIMEOUT") {
        if let Some(secs) = parse_env("RELAY_REQUEST_TIMEOUT", &timeout) {
            config.backend.request_timeout_secs = secs;
            config.source = ConfigSource::Env;
        }
    }
    if let Some(mode) = env("RELAY_PARSER_MODE") {
        if let Some(mode) = parse_env("RELAY_PARSER_MODE", &mode) {
            config.stream.parser_mode = mode;
            config.source = ConfigSource::Env;
        }
    }
    if let Some(policy) = env("RELAY_FALLBACK") {
        if let Some(policy) = parse_env("RELAY_FALLBACK", &policy) {
            config.fallback.policy = policy;
            config.source = ConfigSource::Env;
        }
    }
    if let Some(interval) = env("RELAY_FALLBACK_INTERVAL") {
        if let Some(ms) = parse_env("RELAY_FALLBACK_INTERVAL", &interval) {
            config.fallback.interval_ms = ms;
            config.source = ConfigSource::Env;
        }
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Option<T> {
    let parsed = value.trim().parse().ok();
    if parsed.is_none() {
        tracing::warn!(key, value, "Ignoring unparseable environment variable");
    }
    parsed
}

// =============================================================================
// CLI Override Support
// =============================================================================

/// Builder for applying CLI overrides to configuration
///
/// Use this after [`load_config`] to apply command-line argument overrides.
#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    /// Endpoint override
    pub endpoint: Option<String>,

    /// Model override
    pub model: Option<String>,

    /// Parser mode override
    pub parser_mode: Option<ParserMode>,

    /// Fallback policy override
    pub fallback_policy: Option<FallbackPolicy>,
}

impl ConfigOverrides {
    /// Create a new empty set of overrides
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set endpoint override
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: String) -> Self {
        self.endpoint = Some(endpoint);
        self
    }

    /// Set model override
    #[must_use]
    pub fn with_model(mut self, model: String) -> Self {
        self.model = Some(model);
        self
    }

    /// Set parser mode override
    #[must_use]
    pub fn with_parser_mode(mut self, mode: ParserMode) -> Self {
        self.parser_mode = Some(mode);
        self
    }

    /// Set fallback policy override
    #[must_use]
    pub fn with_fallback_policy(mut self, policy: FallbackPolicy) -> Self {
        self.fallback_policy = Some(policy);
        self
    }

    /// Apply overrides to a configuration
    pub fn apply(&self, config: &mut ClientConfig) {
        if self.endpoint.is_some()
            || self.model.is_some()
            || self.parser_mode.is_some()
            || self.fallback_policy.is_some()
        {
            config.source = ConfigSource::Cli;
        }

        if let Some(ref endpoint) = self.endpoint {
            config.backend.endpoint.clone_from(endpoint);
        }
        if let Some(ref model) = self.model {
            config.backend.model = Some(model.clone());
        }
        if let Some(mode) = self.parser_mode {
            config.stream.parser_mode = mode;
        }
        if let Some(policy) = self.fallback_policy {
            config.fallback.policy = policy;
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
