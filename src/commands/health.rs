//! Health Check Commands
//!
//! Commands for checking the client configuration and backend reachability.

use seo_pipeline_api::AnalysisBackend;

use crate::models::response::{CommandResponse, HealthResponse};
use crate::state::ClientState;

/// Get the health status of the client and the backend
pub async fn get_health(state: &ClientState) -> CommandResponse<HealthResponse> {
    let mut health = HealthResponse::default();
    let backend = state.orchestrator().backend();

    health.config = state.config().validate().is_ok();
    health.authenticated = backend.is_authenticated();
    health.backend = match backend.health_check().await {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(error = %e, "Backend health check failed");
            false
        }
    };

    health.status = if health.backend && health.config {
        "healthy".to_string()
    } else {
        "degraded".to_string()
    };

    CommandResponse::ok(health)
}
