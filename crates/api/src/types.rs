//! Transport Types
//!
//! Errors and configuration shared by every backend implementation.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default request timeout; analysis stages can legitimately run for minutes.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 300;

/// Errors produced while talking to the analysis backend.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ApiError {
    #[error("Network error: {message}")]
    NetworkError { message: String },

    #[error("Authentication failed: {message}")]
    AuthenticationFailed { message: String },

    #[error("Invalid request: {message}")]
    InvalidRequest { message: String },

    #[error("Not found: {message}")]
    NotFound { message: String },

    #[error("Rate limited: {message}")]
    RateLimited { message: String },

    #[error("Server error ({}): {message}", status.map(|s| s.to_string()).unwrap_or_else(|| "unknown".to_string()))]
    ServerError { message: String, status: Option<u16> },

    #[error("Parse error: {message}")]
    ParseError { message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("{message}")]
    Other { message: String },
}

/// Result type alias for transport errors
pub type ApiResult<T> = Result<T, ApiError>;

impl ApiError {
    pub fn network(message: impl Into<String>) -> Self {
        Self::NetworkError {
            message: message.into(),
        }
    }

    pub fn parse(message: impl Into<String>) -> Self {
        Self::ParseError {
            message: message.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }
}

/// Connection settings for a backend.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BackendConfig {
    /// Base URL, e.g. `https://seo.example.com`
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Bearer credential attached to every request
    #[serde(default, skip_serializing)]
    pub bearer_token: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Optional proxy, e.g. `socks5://127.0.0.1:1080`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy_url: Option<String>,
}

/// Base URL used when none is configured.
pub const DEFAULT_BASE_URL: &str = "http://localhost:8000";

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_timeout_secs() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            bearer_token: None,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            proxy_url: None,
        }
    }
}
