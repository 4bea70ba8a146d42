//! Core Error Types
//!
//! Defines the foundational error types used across the SEO pipeline
//! workspace. These error types are dependency-free (only thiserror + std) to
//! keep the core crate lightweight.
//!
//! The client crate extends these with variants for storage, transport, and
//! configuration that require heavier dependencies.

use thiserror::Error;

/// Core error type for the SEO pipeline workspace.
#[derive(Error, Debug)]
pub enum CoreError {
    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A stage name that is not part of the pipeline
    #[error("Unknown stage: {0}")]
    UnknownStage(String),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    /// Parse errors
    #[error("Parse error: {0}")]
    Parse(String),
}

/// Result type alias for core errors
pub type CoreResult<T> = Result<T, CoreError>;

impl CoreError {
    /// Create an unknown stage error
    pub fn unknown_stage(name: impl Into<String>) -> Self {
        Self::UnknownStage(name.into())
    }

    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a parse error
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse(msg.into())
    }
}
