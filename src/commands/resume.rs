//! Resume Commands
//!
//! Commands for stages interrupted by an authorization redirect.

use seo_pipeline_core::Stage;
use serde::{Deserialize, Serialize};

use crate::models::response::CommandResponse;
use crate::models::stage::InvocationOutcome;
use crate::state::ClientState;

/// A resumed stage and how it settled
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResumeReport {
    pub stage: Stage,
    pub outcome: InvocationOutcome,
}

/// Stage of the pending resume ticket, if any, without consuming it
pub fn get_pending_resume(state: &ClientState) -> CommandResponse<Option<Stage>> {
    state.orchestrator().resume_manager().pending_stage().into()
}

/// Consume the pending ticket and run its stage
pub async fn resume_pending(state: &ClientState) -> CommandResponse<Option<ResumeReport>> {
    state
        .orchestrator()
        .resume_pending()
        .await
        .map(|resumed| resumed.map(|(stage, outcome)| ResumeReport { stage, outcome }))
        .into()
}
