//! Error Handling
//!
//! Unified error types for the client.
//! Uses thiserror for ergonomic error definitions.

use seo_pipeline_api::ApiError;
use seo_pipeline_core::CoreError;
use thiserror::Error;

/// Client-wide error type
#[derive(Error, Debug)]
pub enum AppError {
    /// Backend transport errors
    #[error("Backend error: {0}")]
    Api(#[from] ApiError),

    /// Core type errors (unknown stage, envelope parsing)
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Durable storage errors
    #[error("Storage error: {0}")]
    Storage(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// File I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    /// The orchestrator was shut down
    #[error("Orchestrator has been shut down")]
    ShutDown,

    /// Generic internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for client errors
pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    /// Create a storage error
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    /// Create a config error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create an internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}

/// Convert AppError to a string suitable for display next to a stage control
impl From<AppError> for String {
    fn from(err: AppError) -> String {
        err.to_string()
    }
}
