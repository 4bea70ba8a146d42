//! Stage Commands
//!
//! Commands for starting stages and reading their slots.

use std::str::FromStr;

use seo_pipeline_core::Stage;
use serde_json::Value;

use crate::models::response::CommandResponse;
use crate::models::stage::{InvocationOutcome, StageSnapshot};
use crate::state::ClientState;
use crate::utils::error::{AppError, AppResult};

/// Parse a stage name (`lsiAnalysis`) or slug (`lsi-analysis`)
pub fn parse_stage(name: &str) -> AppResult<Stage> {
    Ok(Stage::from_str(name)?)
}

/// Parse stage parameters. They must form a JSON object; everything else
/// is validated by the backend.
pub fn parse_params(raw: &str) -> AppResult<Value> {
    let value: Value = serde_json::from_str(raw)
        .map_err(|e| AppError::validation(format!("Parameters are not valid JSON: {}", e)))?;
    if !value.is_object() {
        return Err(AppError::validation("Parameters must be a JSON object"));
    }
    Ok(value)
}

/// Run one stage and return how it settled
pub async fn invoke_stage(
    state: &ClientState,
    stage: &str,
    params: &str,
) -> CommandResponse<InvocationOutcome> {
    let parsed = parse_stage(stage).and_then(|stage| Ok((stage, parse_params(params)?)));
    match parsed {
        Ok((stage, params)) => {
            CommandResponse::ok(state.orchestrator().invoke(stage, params).await)
        }
        Err(e) => CommandResponse::err(e.to_string()),
    }
}

/// Snapshots of every stage slot
pub fn list_stages(state: &ClientState) -> CommandResponse<Vec<StageSnapshot>> {
    state.orchestrator().snapshots().into()
}

/// Force a stage back to idle
pub fn reset_stage(state: &ClientState, stage: &str) -> CommandResponse<StageSnapshot> {
    let result = parse_stage(stage).and_then(|stage| {
        state.orchestrator().reset(stage)?;
        state.orchestrator().snapshot(stage)
    });
    result.into()
}
