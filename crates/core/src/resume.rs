//! Resume Tickets
//!
//! A stage interrupted by an authorization redirect leaves a ticket in
//! durable client storage. Each stage owns two feature-scoped keys: a flag
//! (`autoResume<Stage>`) and the serialized parameters (`<stage>Params`).

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::stage::Stage;

/// Value stored under the flag key while a ticket is pending.
pub const RESUME_FLAG_SET: &str = "true";

/// A pending resumable invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResumeTicket {
    pub stage: Stage,
    pub parameters: Value,
}

/// Storage keys owned by one resumable stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResumeKeys {
    pub flag: String,
    pub params: String,
}

impl ResumeKeys {
    pub fn for_stage(stage: Stage) -> Self {
        Self {
            flag: format!("autoResume{}", stage.pascal_name()),
            params: format!("{}Params", stage.as_str()),
        }
    }
}
