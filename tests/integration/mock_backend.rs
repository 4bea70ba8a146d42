//! Scripted in-process backend shared by the integration tests.
//!
//! Responses are set per stage / n-gram size / poll and replayed after an
//! optional delay, so tests can drive timing with tokio's paused clock.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;

use seo_pipeline_api::{AnalysisBackend, ApiError, ApiResult};
use seo_pipeline_client::models::settings::ClientConfig;
use seo_pipeline_client::services::auth::RecordingRedirector;
use seo_pipeline_client::services::orchestrator::Orchestrator;
use seo_pipeline_client::storage::durable::MemoryStore;
use seo_pipeline_core::{NgramSize, ProgressEvent, Stage, TaskStatusResponse};

#[derive(Clone)]
struct Scripted {
    delay: Duration,
    result: ApiResult<Value>,
}

#[derive(Default)]
pub struct MockBackend {
    stage_responses: Mutex<HashMap<Stage, Scripted>>,
    ngram_responses: Mutex<HashMap<NgramSize, Scripted>>,
    progress_scripts: Mutex<HashMap<Stage, Vec<(Duration, ProgressEvent)>>>,
    task_responses: Mutex<VecDeque<ApiResult<TaskStatusResponse>>>,
    stage_calls: Mutex<Vec<(Stage, Value)>>,
    ngram_calls: Mutex<Vec<NgramSize>>,
    poll_times: Mutex<Vec<tokio::time::Instant>>,
}

impl MockBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn respond(&self, stage: Stage, delay: Duration, result: ApiResult<Value>) {
        self.stage_responses
            .lock()
            .unwrap()
            .insert(stage, Scripted { delay, result });
    }

    pub fn respond_ngrams(&self, size: NgramSize, delay: Duration, result: ApiResult<Value>) {
        self.ngram_responses
            .lock()
            .unwrap()
            .insert(size, Scripted { delay, result });
    }

    /// Events pushed on the progress channel, each after its own delay
    pub fn stream(&self, stage: Stage, events: Vec<(Duration, ProgressEvent)>) {
        self.progress_scripts.lock().unwrap().insert(stage, events);
    }

    /// Queue poll results; the last one repeats forever
    pub fn queue_tasks(&self, result: ApiResult<TaskStatusResponse>) {
        self.task_responses.lock().unwrap().push_back(result);
    }

    pub fn stage_calls(&self) -> Vec<(Stage, Value)> {
        self.stage_calls.lock().unwrap().clone()
    }

    pub fn ngram_calls(&self) -> Vec<NgramSize> {
        self.ngram_calls.lock().unwrap().clone()
    }

    pub fn poll_times(&self) -> Vec<tokio::time::Instant> {
        self.poll_times.lock().unwrap().clone()
    }
}

#[async_trait]
impl AnalysisBackend for MockBackend {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn is_authenticated(&self) -> bool {
        true
    }

    async fn call_stage(&self, stage: Stage, params: &Value) -> ApiResult<Value> {
        self.stage_calls
            .lock()
            .unwrap()
            .push((stage, params.clone()));
        let scripted = self.stage_responses.lock().unwrap().get(&stage).cloned();
        match scripted {
            Some(s) => {
                tokio::time::sleep(s.delay).await;
                s.result
            }
            None => Err(ApiError::NotFound {
                message: format!("no script for {}", stage),
            }),
        }
    }

    async fn call_ngrams(&self, size: NgramSize, _params: &Value) -> ApiResult<Value> {
        self.ngram_calls.lock().unwrap().push(size);
        let scripted = self.ngram_responses.lock().unwrap().get(&size).cloned();
        match scripted {
            Some(s) => {
                tokio::time::sleep(s.delay).await;
                s.result
            }
            None => Err(ApiError::NotFound {
                message: format!("no script for {}", size),
            }),
        }
    }

    async fn stream_progress(
        &self,
        stage: Stage,
        tx: mpsc::Sender<ProgressEvent>,
    ) -> ApiResult<()> {
        let events = self
            .progress_scripts
            .lock()
            .unwrap()
            .get(&stage)
            .cloned()
            .unwrap_or_default();
        for (delay, event) in events {
            tokio::time::sleep(delay).await;
            if tx.send(event).await.is_err() {
                break;
            }
        }
        Ok(())
    }

    async fn running_tasks(&self) -> ApiResult<TaskStatusResponse> {
        self.poll_times
            .lock()
            .unwrap()
            .push(tokio::time::Instant::now());
        let mut queue = self.task_responses.lock().unwrap();
        if queue.len() > 1 {
            queue.pop_front().unwrap()
        } else {
            queue
                .front()
                .cloned()
                .unwrap_or_else(|| Ok(TaskStatusResponse::default()))
        }
    }

    async fn health_check(&self) -> ApiResult<()> {
        Ok(())
    }
}

// ============================================================================
// Helpers
// ============================================================================

pub struct Harness {
    pub backend: Arc<MockBackend>,
    pub durable: Arc<MemoryStore>,
    pub redirector: Arc<RecordingRedirector>,
    pub orchestrator: Arc<Orchestrator>,
}

pub fn harness_with(config: ClientConfig) -> Harness {
    let backend = MockBackend::new();
    let durable = Arc::new(MemoryStore::new());
    let redirector = Arc::new(RecordingRedirector::new());
    let orchestrator = Arc::new(Orchestrator::new(
        backend.clone(),
        durable.clone(),
        redirector.clone(),
        &config,
    ));
    Harness {
        backend,
        durable,
        redirector,
        orchestrator,
    }
}

pub fn harness() -> Harness {
    harness_with(ClientConfig::default())
}

pub fn job(id: &str) -> seo_pipeline_core::BackgroundJob {
    seo_pipeline_core::BackgroundJob {
        id: id.to_string(),
        name: format!("job {}", id),
        progress: 10.0,
        status: "running".to_string(),
    }
}

pub fn tasks(ids: &[&str]) -> TaskStatusResponse {
    TaskStatusResponse {
        success: true,
        tasks: ids.iter().map(|id| job(id)).collect(),
        total_tasks: ids.len(),
    }
}
