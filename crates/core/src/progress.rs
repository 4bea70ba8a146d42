//! Progress Stream Event Types
//!
//! Typed events pushed by the backend while a long stage runs, plus the
//! adapter trait used to turn raw stream lines into those events. The
//! transport (SSE over HTTP) lives in the api crate; the reconciler in the
//! client crate consumes the events.

use serde::{Deserialize, Serialize};

/// One server-push progress event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressEvent {
    /// A backend sub-stage started
    StageStart {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        stage: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        progress_percent: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },

    /// A backend sub-stage finished
    StageComplete {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        stage: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        progress_percent: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },

    /// A batch of competitor URLs is about to be fetched
    BatchStart {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        progress_percent: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },

    UrlStart {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        progress_percent: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },

    UrlSuccess {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        progress_percent: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },

    UrlFailed {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        progress_percent: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },

    /// All competitor pages were parsed (terminal)
    ParsingComplete {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        progress_percent: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },

    /// The whole job finished (terminal)
    Complete {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        progress_percent: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },

    /// The job failed (terminal)
    Error {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
}

/// How an event affects the displayed progress.
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressSignal {
    /// Non-terminal; may carry an authoritative percentage
    Update(Option<f64>),
    /// Terminal success: fast-forward to 100
    Completed,
    /// Terminal failure with the backend's message
    Failed(String),
}

impl ProgressEvent {
    /// Authoritative percentage carried by this event, if any.
    pub fn progress_percent(&self) -> Option<f64> {
        match self {
            ProgressEvent::StageStart { progress_percent, .. }
            | ProgressEvent::StageComplete { progress_percent, .. }
            | ProgressEvent::BatchStart { progress_percent, .. }
            | ProgressEvent::UrlStart { progress_percent, .. }
            | ProgressEvent::UrlSuccess { progress_percent, .. }
            | ProgressEvent::UrlFailed { progress_percent, .. }
            | ProgressEvent::ParsingComplete { progress_percent, .. }
            | ProgressEvent::Complete { progress_percent, .. } => *progress_percent,
            ProgressEvent::Error { .. } => None,
        }
    }

    pub fn message(&self) -> Option<&str> {
        match self {
            ProgressEvent::StageStart { message, .. }
            | ProgressEvent::StageComplete { message, .. }
            | ProgressEvent::BatchStart { message, .. }
            | ProgressEvent::UrlStart { message, .. }
            | ProgressEvent::UrlSuccess { message, .. }
            | ProgressEvent::UrlFailed { message, .. }
            | ProgressEvent::ParsingComplete { message, .. }
            | ProgressEvent::Complete { message, .. }
            | ProgressEvent::Error { message } => message.as_deref(),
        }
    }

    /// Whether the stream ends after this event.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ProgressEvent::ParsingComplete { .. }
                | ProgressEvent::Complete { .. }
                | ProgressEvent::Error { .. }
        )
    }

    pub fn signal(&self) -> ProgressSignal {
        match self {
            ProgressEvent::ParsingComplete { .. } | ProgressEvent::Complete { .. } => {
                ProgressSignal::Completed
            }
            ProgressEvent::Error { message } => ProgressSignal::Failed(
                message
                    .clone()
                    .filter(|m| !m.is_empty())
                    .unwrap_or_else(|| "Analysis failed".to_string()),
            ),
            other => ProgressSignal::Update(other.progress_percent()),
        }
    }
}

/// Errors that can occur during stream adaptation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum AdapterError {
    /// Invalid format that couldn't be parsed
    InvalidFormat(String),
    /// JSON/data parsing error
    ParseError(String),
    /// Event type not known to the adapter
    UnsupportedEvent(String),
}

impl std::fmt::Display for AdapterError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AdapterError::InvalidFormat(msg) => write!(f, "Invalid format: {}", msg),
            AdapterError::ParseError(msg) => write!(f, "Parse error: {}", msg),
            AdapterError::UnsupportedEvent(msg) => write!(f, "Unsupported event: {}", msg),
        }
    }
}

impl std::error::Error for AdapterError {}

/// Turns raw progress-stream lines into typed events.
pub trait ProgressStreamAdapter: Send + Sync {
    /// Transport name for logging.
    fn transport_name(&self) -> &'static str;

    /// Adapt one raw line. A line may produce zero or more events.
    fn adapt(&mut self, input: &str) -> Result<Vec<ProgressEvent>, AdapterError>;

    /// Reset adapter state for a new stream.
    fn reset(&mut self) {}
}
