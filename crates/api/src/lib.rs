//! SEO Pipeline API
//!
//! Transport layer between the orchestration core and the analysis backend:
//! - `AnalysisBackend` trait (stage calls, n-gram sub-requests, progress
//!   stream, running-task polling)
//! - `RestBackend` over HTTP/JSON with an SSE progress channel
//! - HTTP client factory and HTTP error mapping

pub mod backend;
pub mod http_client;
pub mod rest;
pub mod streaming_adapters;
pub mod types;

// Re-export main types
pub use backend::{parse_http_error, AnalysisBackend};
pub use http_client::build_http_client;
pub use rest::RestBackend;
pub use streaming_adapters::SseProgressAdapter;
pub use types::{ApiError, ApiResult, BackendConfig};
