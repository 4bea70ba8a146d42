//! Stage Orchestrator
//!
//! Starts analysis stages and keeps their slots up to date. Each invocation
//! marks the stage busy, runs the progress simulation (reconciled with the
//! server-push channel for streaming stages), issues the request, and
//! settles the stage slot from the response.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::future::join_all;
use seo_pipeline_api::AnalysisBackend;
use seo_pipeline_core::{
    classify_response, EnvelopeOutcome, NgramEnvelope, NgramSize, RequestPlan, Stage,
    StageUpdate,
};
use serde_json::{Map, Value};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::auth::{parse_auth_url, AuthRedirector};
use super::poller::RefreshHandler;
use super::progress::{ProgressReconciler, ProgressSimulator, ReconcileOutcome};
use super::registry::LoadingRegistry;
use super::resume::{PendingResume, ResumeManager};
use super::stage_store::StageStore;
use crate::models::settings::ClientConfig;
use crate::models::stage::{InvocationOutcome, StageSnapshot};
use crate::storage::durable::DurableStore;
use crate::utils::error::{AppError, AppResult};

const PROGRESS_CHANNEL_CAPACITY: usize = 64;

/// Identity of one in-flight invocation across the registry, the stage
/// slot, and the simulator
struct Invocation {
    stage: Stage,
    id: Uuid,
    generation: u64,
    run: u64,
}

/// A settled backend response before it is applied to the stage slot
#[derive(Debug)]
enum StageResponse {
    Data { data: Value, message: Option<String> },
    Authorization { auth_url: Option<String> },
}

/// Background tasks feeding server-push progress for one invocation
struct ProgressFeed {
    transport: JoinHandle<()>,
    reconciler: JoinHandle<ReconcileOutcome>,
}

impl ProgressFeed {
    /// Tear the feed down. Returns the failure message if the stream had
    /// already reported a terminal error.
    async fn close(self) -> Option<String> {
        self.transport.abort();
        if !self.reconciler.is_finished() {
            self.reconciler.abort();
            return None;
        }
        match self.reconciler.await {
            Ok(ReconcileOutcome::Failed(message)) => Some(message),
            _ => None,
        }
    }
}

pub struct Orchestrator {
    backend: Arc<dyn AnalysisBackend>,
    store: Arc<StageStore>,
    registry: Arc<LoadingRegistry>,
    simulators: HashMap<Stage, Arc<ProgressSimulator>>,
    resume: ResumeManager,
    redirector: Arc<dyn AuthRedirector>,
    streaming_stages: Vec<Stage>,
    settle_delay: Duration,
    liveness: CancellationToken,
    /// Parameters of the last completed invocation, used by silent refreshes
    last_params: Mutex<HashMap<Stage, Value>>,
}

impl Orchestrator {
    pub fn new(
        backend: Arc<dyn AnalysisBackend>,
        durable: Arc<dyn DurableStore>,
        redirector: Arc<dyn AuthRedirector>,
        config: &ClientConfig,
    ) -> Self {
        let liveness = CancellationToken::new();
        let store = Arc::new(StageStore::new(
            liveness.clone(),
            config.messages.success_ttl(),
        ));
        let registry = Arc::new(LoadingRegistry::new(
            store.clone(),
            config.registry.safety_timeout(),
        ));
        let simulators = Stage::ALL
            .iter()
            .map(|stage| {
                let sim = ProgressSimulator::new(*stage, config.progress.clone(), store.clone());
                (*stage, Arc::new(sim))
            })
            .collect();

        Self {
            backend,
            store,
            registry,
            simulators,
            resume: ResumeManager::new(durable, config.resume.resumable_stages.clone()),
            redirector,
            streaming_stages: config.backend.streaming_stages.clone(),
            settle_delay: config.resume.settle_delay(),
            liveness,
            last_params: Mutex::new(HashMap::new()),
        }
    }

    fn simulator(&self, stage: Stage) -> AppResult<&Arc<ProgressSimulator>> {
        self.simulators
            .get(&stage)
            .ok_or_else(|| AppError::internal(format!("no progress simulator for {}", stage)))
    }

    pub fn is_alive(&self) -> bool {
        !self.liveness.is_cancelled()
    }

    /// Token cancelled on shutdown; child tokens follow it
    pub fn liveness(&self) -> &CancellationToken {
        &self.liveness
    }

    pub fn backend(&self) -> &Arc<dyn AnalysisBackend> {
        &self.backend
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StageUpdate> {
        self.store.subscribe()
    }

    pub fn snapshot(&self, stage: Stage) -> AppResult<StageSnapshot> {
        self.store.snapshot(stage)
    }

    pub fn snapshots(&self) -> AppResult<Vec<StageSnapshot>> {
        self.store.snapshots()
    }

    pub fn is_busy(&self, stage: Stage) -> bool {
        self.registry.is_busy(stage)
    }

    /// Run one stage to completion. Never retries.
    pub async fn invoke(&self, stage: Stage, params: Value) -> InvocationOutcome {
        if !self.is_alive() {
            return InvocationOutcome::Discarded;
        }
        let simulator = match self.simulator(stage) {
            Ok(sim) => sim.clone(),
            Err(e) => return InvocationOutcome::Failed { message: e.to_string() },
        };
        let generation = match self.registry.begin(stage) {
            Ok(generation) => generation,
            Err(e) => return InvocationOutcome::Failed { message: e.to_string() },
        };

        let invocation_id = Uuid::new_v4();
        tracing::info!(stage = %stage, invocation_id = %invocation_id, "Starting stage");
        self.store.begin_invocation(stage, invocation_id);
        let run = simulator.start();
        let invocation = Invocation {
            stage,
            id: invocation_id,
            generation,
            run,
        };

        let feed = if self.streaming_stages.contains(&stage) {
            Some(self.open_progress_feed(&invocation, simulator.clone()))
        } else {
            None
        };

        let response = self.request(stage, &params).await;

        let stream_failure = match feed {
            Some(feed) => feed.close().await,
            None => None,
        };

        if !self.is_alive() {
            tracing::debug!(stage = %stage, invocation_id = %invocation_id, "Dropping result after shutdown");
            simulator.stop(run);
            return InvocationOutcome::Discarded;
        }

        // A terminal error on the progress stream fails the stage whatever
        // the request later returned.
        let response = match stream_failure {
            Some(message) => Err(message),
            None => response,
        };

        match response {
            Ok(StageResponse::Data { data, message }) => {
                self.store.set_result(stage, data.clone());
                simulator.complete(run);
                self.registry.finish(stage, generation);
                if message.is_some() {
                    self.store.set_message(stage, message);
                }
                if let Ok(mut last) = self.last_params.lock() {
                    last.insert(stage, params);
                }
                tracing::info!(stage = %stage, invocation_id = %invocation_id, "Stage completed");
                InvocationOutcome::Completed { data }
            }
            Ok(StageResponse::Authorization { auth_url }) => {
                match parse_auth_url(auth_url.as_deref()) {
                    Ok(url) => {
                        simulator.stop(run);
                        self.registry.finish(stage, generation);
                        self.redirect_for_authorization(stage, &params, url)
                    }
                    Err(message) => self.settle_failure(&invocation, &simulator, message),
                }
            }
            Err(message) => self.settle_failure(&invocation, &simulator, message),
        }
    }

    /// A superseded invocation still reports its failure to the caller but
    /// leaves the newer invocation's error slot and progress alone.
    fn settle_failure(
        &self,
        invocation: &Invocation,
        simulator: &ProgressSimulator,
        message: String,
    ) -> InvocationOutcome {
        let stage = invocation.stage;
        if !self
            .store
            .set_invocation_error(stage, invocation.id, message.clone())
        {
            tracing::debug!(stage = %stage, invocation_id = %invocation.id, "Superseded invocation failed");
        }
        simulator.stop(invocation.run);
        self.registry.finish(stage, invocation.generation);
        tracing::info!(stage = %stage, invocation_id = %invocation.id, error = %message, "Stage failed");
        InvocationOutcome::Failed { message }
    }

    fn redirect_for_authorization(
        &self,
        stage: Stage,
        params: &Value,
        url: url::Url,
    ) -> InvocationOutcome {
        if self.resume.is_resumable(stage) {
            if let Err(e) = self.resume.save(stage, params) {
                tracing::warn!(stage = %stage, error = %e, "Failed to save resume ticket");
            }
        }
        self.store.publish_authorization(stage, url.as_str());
        if let Err(e) = self.redirector.open_authorization(&url) {
            tracing::warn!(stage = %stage, error = %e, "Failed to open authorization page");
        }
        InvocationOutcome::AuthorizationRequired {
            auth_url: url.to_string(),
        }
    }

    /// Connect the server-push channel to the simulator. Transport failures
    /// are logged and never fail the stage; a terminal error event does.
    fn open_progress_feed(
        &self,
        invocation: &Invocation,
        simulator: Arc<ProgressSimulator>,
    ) -> ProgressFeed {
        let (tx, rx) = mpsc::channel(PROGRESS_CHANNEL_CAPACITY);
        let stage = invocation.stage;
        let (invocation_id, run) = (invocation.id, invocation.run);

        let backend = self.backend.clone();
        let transport = tokio::spawn(async move {
            if let Err(e) = backend.stream_progress(stage, tx).await {
                tracing::warn!(stage = %stage, error = %e, "Progress stream failed");
            }
        });

        let store = self.store.clone();
        let reconciler = tokio::spawn(async move {
            let reconciler = ProgressReconciler::new(simulator, run);
            let outcome = reconciler.run(rx).await;
            if let ReconcileOutcome::Failed(message) = &outcome {
                tracing::info!(stage = %stage, error = %message, "Progress stream reported failure");
                store.set_invocation_error(stage, invocation_id, message.clone());
            }
            outcome
        });

        ProgressFeed {
            transport,
            reconciler,
        }
    }

    async fn request(&self, stage: Stage, params: &Value) -> Result<StageResponse, String> {
        match stage.request_plan() {
            RequestPlan::Single => self.request_single(stage, params).await,
            RequestPlan::NgramFanOut => self.request_ngrams(params).await,
        }
    }

    async fn request_single(&self, stage: Stage, params: &Value) -> Result<StageResponse, String> {
        let body = self
            .backend
            .call_stage(stage, params)
            .await
            .map_err(|e| e.to_string())?;
        match classify_response(body) {
            EnvelopeOutcome::Success { data, message } => Ok(StageResponse::Data { data, message }),
            EnvelopeOutcome::AuthorizationRequired { auth_url } => {
                Ok(StageResponse::Authorization { auth_url })
            }
            EnvelopeOutcome::Failure(message) => Err(message),
        }
    }

    /// Issue the three n-gram sub-requests concurrently and join them once
    /// all have settled. Any failure fails the whole stage.
    async fn request_ngrams(&self, params: &Value) -> Result<StageResponse, String> {
        let calls = NgramSize::ALL.iter().map(|size| async move {
            let result = self
                .backend
                .call_ngrams(*size, params)
                .await
                .map_err(|e| e.to_string())
                .and_then(|body| {
                    serde_json::from_value::<NgramEnvelope>(body)
                        .map_err(|e| format!("Malformed response: {}", e))
                })
                .and_then(NgramEnvelope::into_result);
            (*size, result)
        });

        let mut combined = Map::new();
        let mut failures = Vec::new();
        for (size, result) in join_all(calls).await {
            match result {
                Ok(ngrams) => {
                    combined.insert(size.label().to_string(), Value::Array(ngrams));
                }
                Err(message) => failures.push(format!("{}: {}", size.label(), message)),
            }
        }

        if !failures.is_empty() {
            return Err(failures.join("; "));
        }
        Ok(StageResponse::Data {
            data: Value::Object(combined),
            message: None,
        })
    }

    /// Re-fetch a stage and replace its result without touching busy or
    /// progress. Failures are only logged. Returns whether a result landed.
    pub async fn refresh_stage(&self, stage: Stage, params: &Value) -> bool {
        if !self.is_alive() {
            return false;
        }
        match self.request(stage, params).await {
            Ok(StageResponse::Data { data, .. }) => {
                tracing::debug!(stage = %stage, "Silent refresh updated stage");
                self.store.set_result(stage, data)
            }
            Ok(StageResponse::Authorization { .. }) => {
                tracing::debug!(stage = %stage, "Silent refresh needs authorization; skipped");
                false
            }
            Err(message) => {
                tracing::warn!(stage = %stage, error = %message, "Silent refresh failed");
                false
            }
        }
    }

    /// Refresh every idle stage that completed before.
    pub async fn refresh_completed(&self) -> usize {
        let targets: Vec<(Stage, Value)> = match self.last_params.lock() {
            Ok(last) => last
                .iter()
                .filter(|(stage, _)| !self.registry.is_busy(**stage))
                .map(|(stage, params)| (*stage, params.clone()))
                .collect(),
            Err(_) => return 0,
        };
        let mut refreshed = 0;
        for (stage, params) in targets {
            if self.refresh_stage(stage, &params).await {
                refreshed += 1;
            }
        }
        refreshed
    }

    /// Force a stage back to idle: not busy, progress 0, error cleared.
    /// The last result is kept.
    pub fn reset(&self, stage: Stage) -> AppResult<()> {
        self.registry.reset(stage)?;
        self.simulator(stage)?.halt();
        self.store.set_progress(stage, 0);
        self.store.set_error(stage, None);
        Ok(())
    }

    /// Consume a pending resume ticket and, after the settle delay, invoke
    /// its stage. The ticket is gone even if the invocation fails.
    pub async fn resume_pending(&self) -> AppResult<Option<(Stage, InvocationOutcome)>> {
        let ticket = match self.resume.take_pending()? {
            PendingResume::Ready(ticket) => ticket,
            PendingResume::Corrupt { .. } | PendingResume::None => return Ok(None),
        };
        tracing::info!(stage = %ticket.stage, "Resuming stage interrupted by authorization");

        tokio::select! {
            _ = self.liveness.cancelled() => return Err(AppError::ShutDown),
            _ = tokio::time::sleep(self.settle_delay) => {}
        }

        let outcome = self.invoke(ticket.stage, ticket.parameters).await;
        Ok(Some((ticket.stage, outcome)))
    }

    pub fn resume_manager(&self) -> &ResumeManager {
        &self.resume
    }

    /// Handler for the background poller that refreshes completed stages
    pub fn refresh_handler(self: &Arc<Self>) -> Arc<dyn RefreshHandler> {
        Arc::new(CompletedStagesRefresh {
            orchestrator: Arc::downgrade(self),
        })
    }

    /// Tear down: later results are dropped and timers stop.
    pub fn shutdown(&self) {
        if self.liveness.is_cancelled() {
            return;
        }
        self.liveness.cancel();
        for simulator in self.simulators.values() {
            simulator.halt();
        }
        self.registry.shutdown();
        tracing::info!("Orchestrator shut down");
    }
}

struct CompletedStagesRefresh {
    orchestrator: Weak<Orchestrator>,
}

#[async_trait]
impl RefreshHandler for CompletedStagesRefresh {
    async fn refresh(&self) {
        if let Some(orchestrator) = self.orchestrator.upgrade() {
            let refreshed = orchestrator.refresh_completed().await;
            tracing::debug!(count = refreshed, "Refreshed stages after job count change");
        }
    }
}
