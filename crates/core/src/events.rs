//! View Events
//!
//! The orchestrator publishes every observable change of a stage as a
//! [`StageUpdate`]. The view layer subscribes to this stream instead of
//! polling stage state.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::stage::Stage;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StageUpdate {
    /// Busy flag flipped
    Busy { stage: Stage, busy: bool },

    /// Displayed progress changed
    Progress { stage: Stage, percent: u8 },

    /// New result stored in the stage slot
    Result { stage: Stage, data: Value },

    /// Error set (`Some`) or cleared (`None`)
    Error {
        stage: Stage,
        #[serde(skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },

    /// Transient success message set or cleared
    Message {
        stage: Stage,
        #[serde(skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },

    /// Stage needs the user to complete an external authorization
    AuthorizationRequired { stage: Stage, auth_url: String },
}

impl StageUpdate {
    pub fn stage(&self) -> Stage {
        match self {
            StageUpdate::Busy { stage, .. }
            | StageUpdate::Progress { stage, .. }
            | StageUpdate::Result { stage, .. }
            | StageUpdate::Error { stage, .. }
            | StageUpdate::Message { stage, .. }
            | StageUpdate::AuthorizationRequired { stage, .. } => *stage,
        }
    }
}
