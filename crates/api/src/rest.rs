//! REST Backend
//!
//! Implementation of the [`AnalysisBackend`] trait over HTTP/JSON, with the
//! progress channel consumed as server-sent events.

use std::sync::RwLock;

use async_trait::async_trait;
use futures_util::StreamExt;
use serde_json::Value;
use tokio::sync::mpsc;
use url::Url;

use seo_pipeline_core::jobs::TaskStatusResponse;
use seo_pipeline_core::progress::{ProgressEvent, ProgressStreamAdapter};
use seo_pipeline_core::stage::{NgramSize, Stage};

use crate::backend::{parse_http_error, AnalysisBackend};
use crate::http_client::build_http_client;
use crate::streaming_adapters::{SseLineBuffer, SseProgressAdapter};
use crate::types::{ApiError, ApiResult, BackendConfig};

const RUNNING_TASKS_PATH: &str = "api/tasks/running";
const HEALTH_PATH: &str = "api/health";

/// Backend reached over HTTP
pub struct RestBackend {
    base_url: Url,
    token: RwLock<Option<String>>,
    client: reqwest::Client,
}

impl RestBackend {
    /// Create a new REST backend with the given configuration
    pub fn new(config: &BackendConfig) -> ApiResult<Self> {
        let mut base_url = Url::parse(&config.base_url).map_err(|e| {
            ApiError::config(format!("invalid base URL '{}': {}", config.base_url, e))
        })?;
        // Url::join drops the last segment unless the base ends with a slash
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        Ok(Self {
            base_url,
            token: RwLock::new(config.bearer_token.clone()),
            client: build_http_client(config)?,
        })
    }

    /// Replace the bearer credential (e.g. after the user signs in again).
    pub fn set_token(&self, token: Option<String>) {
        match self.token.write() {
            Ok(mut guard) => *guard = token,
            Err(poisoned) => *poisoned.into_inner() = token,
        }
    }

    fn token(&self) -> Option<String> {
        match self.token.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Resolve a route relative to the base URL
    pub fn endpoint(&self, path: &str) -> ApiResult<Url> {
        self.base_url
            .join(path)
            .map_err(|e| ApiError::config(format!("invalid endpoint '{}': {}", path, e)))
    }

    fn stage_path(stage: Stage) -> String {
        format!("api/{}", stage.slug())
    }

    fn ngram_path(size: NgramSize) -> String {
        format!("api/{}/ngrams/{}", Stage::LsiAnalysis.slug(), size.n())
    }

    fn progress_path(stage: Stage) -> String {
        format!("api/{}/progress", stage.slug())
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.token() {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// POST a JSON body and decode the JSON response
    async fn post_json(&self, path: &str, body: &Value) -> ApiResult<Value> {
        let url = self.endpoint(path)?;
        tracing::debug!(url = %url, "POST");

        let response = self
            .authorize(self.client.post(url))
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await
            .map_err(|e| ApiError::network(e.to_string()))?;

        Self::decode(response).await
    }

    /// GET and decode the JSON response
    async fn get_json(&self, path: &str) -> ApiResult<Value> {
        let url = self.endpoint(path)?;
        let response = self
            .authorize(self.client.get(url))
            .send()
            .await
            .map_err(|e| ApiError::network(e.to_string()))?;

        Self::decode(response).await
    }

    async fn decode(response: reqwest::Response) -> ApiResult<Value> {
        let status = response.status().as_u16();
        let body_text = response
            .text()
            .await
            .map_err(|e| ApiError::network(e.to_string()))?;

        if !(200..300).contains(&status) {
            return Err(parse_http_error(status, &body_text));
        }

        serde_json::from_str(&body_text)
            .map_err(|e| ApiError::parse(format!("Failed to parse response: {}", e)))
    }
}

#[async_trait]
impl AnalysisBackend for RestBackend {
    fn name(&self) -> &'static str {
        "rest"
    }

    fn is_authenticated(&self) -> bool {
        self.token().map(|t| !t.is_empty()).unwrap_or(false)
    }

    async fn call_stage(&self, stage: Stage, params: &Value) -> ApiResult<Value> {
        self.post_json(&Self::stage_path(stage), params).await
    }

    async fn call_ngrams(&self, size: NgramSize, params: &Value) -> ApiResult<Value> {
        self.post_json(&Self::ngram_path(size), params).await
    }

    async fn stream_progress(
        &self,
        stage: Stage,
        tx: mpsc::Sender<ProgressEvent>,
    ) -> ApiResult<()> {
        let url = self.endpoint(&Self::progress_path(stage))?;
        let response = self
            .authorize(self.client.get(url))
            .header("Accept", "text/event-stream")
            .send()
            .await
            .map_err(|e| ApiError::network(e.to_string()))?;

        let status = response.status().as_u16();
        if !(200..300).contains(&status) {
            let body_text = response
                .text()
                .await
                .map_err(|e| ApiError::network(e.to_string()))?;
            return Err(parse_http_error(status, &body_text));
        }

        let mut adapter = SseProgressAdapter::new();
        let mut stream = response.bytes_stream();
        let mut lines = SseLineBuffer::new();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| ApiError::network(e.to_string()))?;

            for line in lines.push(&chunk) {
                match adapter.adapt(&line) {
                    Ok(events) => {
                        for event in events {
                            if tx.send(event).await.is_err() {
                                // Receiver gone: nobody is watching this stage anymore
                                return Ok(());
                            }
                        }
                    }
                    Err(e) => {
                        tracing::debug!(stage = %stage, "skipping progress line: {}", e);
                    }
                }

                if adapter.is_finished() {
                    return Ok(());
                }
            }
        }

        Ok(())
    }

    async fn running_tasks(&self) -> ApiResult<TaskStatusResponse> {
        let value = self.get_json(RUNNING_TASKS_PATH).await?;
        serde_json::from_value(value)
            .map_err(|e| ApiError::parse(format!("Failed to parse task list: {}", e)))
    }

    async fn health_check(&self) -> ApiResult<()> {
        let url = self.endpoint(HEALTH_PATH)?;
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| ApiError::network(e.to_string()))?;
        let status = response.status().as_u16();
        if (200..300).contains(&status) {
            Ok(())
        } else {
            Err(parse_http_error(status, ""))
        }
    }
}
