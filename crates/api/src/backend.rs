//! Analysis Backend Trait
//!
//! Defines the common interface for talking to the analysis backend. The
//! orchestrator only ever sees this trait, so tests substitute a scripted
//! in-process backend.

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;

use seo_pipeline_core::jobs::TaskStatusResponse;
use seo_pipeline_core::progress::ProgressEvent;
use seo_pipeline_core::stage::{NgramSize, Stage};

use crate::types::{ApiError, ApiResult};

/// Trait that every backend transport must implement.
///
/// Provides a unified interface for:
/// - One request per stage (`call_stage`)
/// - N-gram sub-requests of the LSI fan-out (`call_ngrams`)
/// - The server-push progress channel (`stream_progress`)
/// - Polling of jobs running on the backend (`running_tasks`)
#[async_trait]
pub trait AnalysisBackend: Send + Sync {
    /// Returns the backend name for identification in logs.
    fn name(&self) -> &'static str;

    /// Whether a bearer credential is available.
    fn is_authenticated(&self) -> bool;

    /// Invoke one stage and return the decoded response envelope.
    ///
    /// Non-2xx responses and malformed JSON are errors; a `success:false`
    /// envelope is returned as-is for the caller to classify.
    async fn call_stage(&self, stage: Stage, params: &Value) -> ApiResult<Value>;

    /// Invoke one n-gram sub-request of the LSI analysis.
    async fn call_ngrams(&self, size: NgramSize, params: &Value) -> ApiResult<Value>;

    /// Stream progress events for a running stage into `tx`.
    ///
    /// Returns when the stream ends, a terminal event was forwarded, or the
    /// receiver is dropped.
    async fn stream_progress(&self, stage: Stage, tx: mpsc::Sender<ProgressEvent>)
        -> ApiResult<()>;

    /// Ask which jobs are currently running for this user.
    async fn running_tasks(&self) -> ApiResult<TaskStatusResponse>;

    /// Check if the backend is reachable.
    async fn health_check(&self) -> ApiResult<()>;
}

/// Map an HTTP error status and body to an [`ApiError`].
///
/// The body is kept as the message, since the backend usually puts a
/// readable explanation there.
pub fn parse_http_error(status: u16, body: &str) -> ApiError {
    let message = extract_error_message(body).unwrap_or_else(|| body.trim().to_string());
    match status {
        401 | 403 => ApiError::AuthenticationFailed { message },
        404 => ApiError::NotFound { message },
        400 | 422 => ApiError::InvalidRequest { message },
        429 => ApiError::RateLimited { message },
        500..=599 => ApiError::ServerError {
            message,
            status: Some(status),
        },
        _ => ApiError::Other {
            message: format!("HTTP {}: {}", status, message),
        },
    }
}

/// Pull a readable message out of a JSON error body, flattening validation
/// lists the same way successful-status envelopes are flattened.
fn extract_error_message(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    match seo_pipeline_core::classify_response(value) {
        seo_pipeline_core::EnvelopeOutcome::Failure(msg) => Some(msg),
        _ => None,
    }
}
