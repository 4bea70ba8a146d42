//! SEO Pipeline Client
//!
//! Orchestration and progress tracking for the multi-stage SEO
//! content-analysis pipeline. It includes:
//! - Stage invocation with per-stage result, error, and busy slots
//! - Simulated progress reconciled with server-push progress
//! - Adaptive polling of background jobs running on the backend
//! - Resume of stages interrupted by an authorization redirect
//! - Storage (JSON config, durable key-value store), models, and utilities

pub mod commands;
pub mod models;
pub mod services;
pub mod state;
pub mod storage;
pub mod utils;

pub use models::settings::ClientConfig;
pub use models::stage::{InvocationOutcome, StageSnapshot};
pub use services::orchestrator::Orchestrator;
pub use state::ClientState;
pub use utils::error::{AppError, AppResult};
