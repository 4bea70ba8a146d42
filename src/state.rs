//! Client State
//!
//! Wires the orchestrator, poller, and storage together from a
//! [`ClientConfig`]. Every collaborator is injected; nothing is global.

use std::sync::Arc;

use seo_pipeline_api::{AnalysisBackend, RestBackend};
use seo_pipeline_core::Stage;

use crate::models::settings::ClientConfig;
use crate::models::stage::InvocationOutcome;
use crate::services::auth::AuthRedirector;
use crate::services::orchestrator::Orchestrator;
use crate::services::poller::BackgroundTaskPoller;
use crate::storage::durable::{DurableStore, FileStore};
use crate::utils::error::{AppError, AppResult};

/// All services of one running client
pub struct ClientState {
    config: ClientConfig,
    orchestrator: Arc<Orchestrator>,
    poller: BackgroundTaskPoller,
}

impl ClientState {
    /// Build from explicit collaborators
    pub fn new(
        config: ClientConfig,
        backend: Arc<dyn AnalysisBackend>,
        durable: Arc<dyn DurableStore>,
        redirector: Arc<dyn AuthRedirector>,
    ) -> Self {
        let orchestrator = Arc::new(Orchestrator::new(
            backend.clone(),
            durable,
            redirector,
            &config,
        ));
        let poller = BackgroundTaskPoller::new(
            backend,
            orchestrator.refresh_handler(),
            config.poller.clone(),
            orchestrator.liveness().child_token(),
        );
        Self {
            config,
            orchestrator,
            poller,
        }
    }

    /// Build with the HTTP backend and `~/.seo-pipeline/storage.json`
    pub fn from_config(config: ClientConfig, redirector: Arc<dyn AuthRedirector>) -> AppResult<Self> {
        config.validate().map_err(AppError::config)?;
        let backend = RestBackend::new(&config.backend.connection)?;
        if !backend.is_authenticated() {
            tracing::warn!("No bearer token configured; the backend may reject requests");
        }
        let durable = FileStore::new()?;
        Ok(Self::new(
            config,
            Arc::new(backend),
            Arc::new(durable),
            redirector,
        ))
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn orchestrator(&self) -> &Arc<Orchestrator> {
        &self.orchestrator
    }

    pub fn poller(&self) -> &BackgroundTaskPoller {
        &self.poller
    }

    /// Load hook: run the stage left pending by an authorization redirect,
    /// if any. Failures to read the ticket are logged and treated as
    /// nothing pending.
    pub async fn resume_on_load(&self) -> Option<(Stage, InvocationOutcome)> {
        match self.orchestrator.resume_pending().await {
            Ok(resumed) => resumed,
            Err(e) => {
                tracing::warn!(error = %e, "Automatic resume skipped");
                None
            }
        }
    }

    /// Stop polling and tear the orchestrator down
    pub fn shutdown(&self) {
        self.poller.stop();
        self.orchestrator.shutdown();
    }
}

impl Drop for ClientState {
    fn drop(&mut self) {
        self.shutdown();
    }
}
