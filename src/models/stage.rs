//! Stage Models
//!
//! Snapshot of one stage slot and the outcome of an invocation.

use chrono::{DateTime, Utc};
use seo_pipeline_core::Stage;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Everything the view layer may show for a stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageSnapshot {
    pub stage: Stage,
    pub busy: bool,
    /// Displayed progress, 0..=100
    pub progress: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Transient success message
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_invocation: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl StageSnapshot {
    pub fn idle(stage: Stage) -> Self {
        Self {
            stage,
            busy: false,
            progress: 0,
            error: None,
            message: None,
            result: None,
            last_invocation: None,
            updated_at: None,
        }
    }
}

/// How an invocation settled
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum InvocationOutcome {
    /// Result stored in the stage slot
    Completed { data: Value },
    /// Error stored in the stage slot
    Failed { message: String },
    /// Control handed to the authorization redirector
    AuthorizationRequired { auth_url: String },
    /// The orchestrator was torn down before the request settled
    Discarded,
}

impl InvocationOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, InvocationOutcome::Completed { .. })
    }

    pub fn error_message(&self) -> Option<&str> {
        match self {
            InvocationOutcome::Failed { message } => Some(message),
            _ => None,
        }
    }
}
