//! Settings Commands
//!
//! Commands for reading the client configuration.

use crate::models::response::CommandResponse;
use crate::models::settings::ClientConfig;
use crate::storage::config::ConfigService;

/// Configuration as stored on disk
pub fn get_settings(service: &ConfigService) -> CommandResponse<ClientConfig> {
    CommandResponse::ok(service.get_config().clone())
}

/// Configuration with environment overrides applied. The bearer token is
/// never serialized.
pub fn get_effective_settings(service: &ConfigService) -> CommandResponse<ClientConfig> {
    service.effective_config().into()
}
