//! Background Task Poller
//!
//! Periodically asks the backend which jobs are running. Polls fast while
//! jobs exist and slowly otherwise, and schedules a debounced refresh when
//! the job count changes.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use seo_pipeline_api::AnalysisBackend;
use seo_pipeline_core::TaskStatusResponse;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::models::settings::PollerSettings;

/// Called (debounced) when the set of running jobs changed
#[async_trait]
pub trait RefreshHandler: Send + Sync {
    async fn refresh(&self);
}

/// Result of feeding one poll into the [`PollerMachine`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollDecision {
    pub interval: Duration,
    pub interval_changed: bool,
    pub refresh: bool,
}

/// Pure polling state: current interval and the last observed job count.
#[derive(Debug, Clone)]
pub struct PollerMachine {
    active_interval: Duration,
    idle_interval: Duration,
    refresh_on_count_change: bool,
    interval: Duration,
    last_count: usize,
}

impl PollerMachine {
    pub fn new(settings: &PollerSettings) -> Self {
        Self {
            active_interval: settings.active_interval(),
            idle_interval: settings.idle_interval(),
            refresh_on_count_change: settings.refresh_on_count_change,
            interval: settings.idle_interval(),
            last_count: 0,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn last_count(&self) -> usize {
        self.last_count
    }

    fn switch_to(&mut self, interval: Duration) -> bool {
        let changed = self.interval != interval;
        self.interval = interval;
        changed
    }

    pub fn on_success(&mut self, count: usize) -> PollDecision {
        let target = if count > 0 {
            self.active_interval
        } else {
            self.idle_interval
        };
        let interval_changed = self.switch_to(target);
        let refresh = if self.refresh_on_count_change {
            count != self.last_count
        } else {
            count < self.last_count
        };
        self.last_count = count;
        PollDecision {
            interval: self.interval,
            interval_changed,
            refresh,
        }
    }

    /// A failed poll falls back to the slow interval and keeps the count.
    pub fn on_error(&mut self) -> PollDecision {
        let interval_changed = self.switch_to(self.idle_interval);
        PollDecision {
            interval: self.interval,
            interval_changed,
            refresh: false,
        }
    }
}

#[derive(Default)]
struct PollerRuntime {
    token: Option<CancellationToken>,
    task: Option<JoinHandle<()>>,
}

/// Timer driver around a [`PollerMachine`]
pub struct BackgroundTaskPoller {
    backend: Arc<dyn AnalysisBackend>,
    refresh: Arc<dyn RefreshHandler>,
    settings: PollerSettings,
    liveness: CancellationToken,
    runtime: Mutex<PollerRuntime>,
    jobs: watch::Sender<TaskStatusResponse>,
}

impl BackgroundTaskPoller {
    pub fn new(
        backend: Arc<dyn AnalysisBackend>,
        refresh: Arc<dyn RefreshHandler>,
        settings: PollerSettings,
        liveness: CancellationToken,
    ) -> Self {
        let (jobs, _) = watch::channel(TaskStatusResponse::default());
        Self {
            backend,
            refresh,
            settings,
            liveness,
            runtime: Mutex::new(PollerRuntime::default()),
            jobs,
        }
    }

    fn lock_runtime(&self) -> MutexGuard<'_, PollerRuntime> {
        self.runtime
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Latest job snapshot
    pub fn subscribe(&self) -> watch::Receiver<TaskStatusResponse> {
        self.jobs.subscribe()
    }

    pub fn is_running(&self) -> bool {
        self.lock_runtime()
            .task
            .as_ref()
            .map(|task| !task.is_finished())
            .unwrap_or(false)
    }

    /// Start polling immediately. A no-op while already polling.
    pub fn start(&self) -> bool {
        let mut runtime = self.lock_runtime();
        if runtime.task.as_ref().map(|t| !t.is_finished()).unwrap_or(false) {
            return false;
        }

        let token = self.liveness.child_token();
        let task = tokio::spawn(poll_loop(
            self.backend.clone(),
            self.refresh.clone(),
            self.settings.clone(),
            self.jobs.clone(),
            token.clone(),
        ));
        runtime.token = Some(token);
        runtime.task = Some(task);
        tracing::debug!("Background task poller started");
        true
    }

    pub fn stop(&self) {
        let mut runtime = self.lock_runtime();
        if let Some(token) = runtime.token.take() {
            token.cancel();
        }
        if let Some(task) = runtime.task.take() {
            task.abort();
            tracing::debug!("Background task poller stopped");
        }
    }
}

impl Drop for BackgroundTaskPoller {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn poll_loop(
    backend: Arc<dyn AnalysisBackend>,
    refresh: Arc<dyn RefreshHandler>,
    settings: PollerSettings,
    jobs: watch::Sender<TaskStatusResponse>,
    token: CancellationToken,
) {
    let mut machine = PollerMachine::new(&settings);
    let debounce = settings.refresh_debounce();
    let mut pending_refresh: Option<JoinHandle<()>> = None;
    let mut ticker = tokio::time::interval(machine.interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let result = tokio::select! {
            _ = token.cancelled() => break,
            result = backend.running_tasks() => result,
        };
        // Torn down while the request was in flight.
        if token.is_cancelled() {
            break;
        }

        let decision = match result {
            Ok(response) if !response.success => {
                tracing::warn!("Running tasks endpoint reported failure");
                machine.on_error()
            }
            Ok(response) => {
                let count = response.job_count();
                tracing::debug!(count, "Polled running tasks");
                jobs.send_replace(response);
                machine.on_success(count)
            }
            Err(e) => {
                tracing::warn!(error = %e, "Polling running tasks failed");
                machine.on_error()
            }
        };

        if decision.refresh {
            if let Some(previous) = pending_refresh.take() {
                previous.abort();
            }
            let refresh = refresh.clone();
            let token = token.clone();
            pending_refresh = Some(tokio::spawn(async move {
                tokio::time::sleep(debounce).await;
                if !token.is_cancelled() {
                    refresh.refresh().await;
                }
            }));
        }

        if decision.interval_changed {
            tracing::debug!(interval_secs = decision.interval.as_secs(), "Poll interval changed");
            ticker = interval_at(Instant::now() + decision.interval, decision.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        }
    }

    if let Some(pending) = pending_refresh {
        pending.abort();
    }
}
