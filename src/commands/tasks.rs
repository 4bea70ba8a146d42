//! Background Task Commands

use seo_pipeline_api::AnalysisBackend;
use seo_pipeline_core::TaskStatusResponse;

use crate::models::response::CommandResponse;
use crate::state::ClientState;
use crate::utils::error::AppError;

/// Ask the backend once which jobs are running
pub async fn get_running_tasks(state: &ClientState) -> CommandResponse<TaskStatusResponse> {
    state
        .orchestrator()
        .backend()
        .running_tasks()
        .await
        .map_err(AppError::from)
        .into()
}
