//! HTTP Client Factory
//!
//! Provides a factory function for building reqwest clients with proxy and
//! timeout support.

use std::time::Duration;

use crate::types::{ApiError, ApiResult, BackendConfig};

/// Build a `reqwest::Client` from backend settings.
///
/// - `proxy_url: Some(..)` -> route every request through that proxy
/// - `proxy_url: None` -> explicitly disable proxy (`no_proxy`), ignoring env vars
pub fn build_http_client(config: &BackendConfig) -> ApiResult<reqwest::Client> {
    let mut builder = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.request_timeout_secs));

    match config.proxy_url.as_deref() {
        Some(url) => {
            let proxy = reqwest::Proxy::all(url)
                .map_err(|e| ApiError::config(format!("invalid proxy URL '{}': {}", url, e)))?;
            builder = builder.proxy(proxy);
        }
        None => {
            builder = builder.no_proxy();
        }
    }

    builder
        .build()
        .map_err(|e| ApiError::config(format!("failed to build HTTP client: {}", e)))
}
