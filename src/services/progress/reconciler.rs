//! Progress Reconciler
//!
//! Merges server-push progress events into a running simulation.

use std::sync::Arc;

use seo_pipeline_core::{ProgressEvent, ProgressSignal};
use tokio::sync::mpsc;

use super::simulator::ProgressSimulator;

/// How a progress stream ended
#[derive(Debug, Clone, PartialEq)]
pub enum ReconcileOutcome {
    /// Terminal success event; simulator fast-completing
    Completed,
    /// Terminal error event; simulator stopped
    Failed(String),
    /// Stream closed without a terminal event
    Closed,
}

/// Feeds one simulator run; events for a superseded run are ignored.
pub struct ProgressReconciler {
    simulator: Arc<ProgressSimulator>,
    run: u64,
}

impl ProgressReconciler {
    pub fn new(simulator: Arc<ProgressSimulator>, run: u64) -> Self {
        Self { simulator, run }
    }

    /// Apply one event. Returns the outcome when the event is terminal.
    pub fn apply(&self, event: &ProgressEvent) -> Option<ReconcileOutcome> {
        match event.signal() {
            ProgressSignal::Update(Some(percent)) => {
                self.simulator.observe(self.run, percent);
                None
            }
            ProgressSignal::Update(None) => None,
            ProgressSignal::Completed => {
                self.simulator.complete(self.run);
                Some(ReconcileOutcome::Completed)
            }
            ProgressSignal::Failed(message) => {
                self.simulator.stop(self.run);
                Some(ReconcileOutcome::Failed(message))
            }
        }
    }

    /// Consume events until a terminal one arrives or the sender goes away.
    pub async fn run(&self, mut events: mpsc::Receiver<ProgressEvent>) -> ReconcileOutcome {
        let stage = self.simulator.stage();
        while let Some(event) = events.recv().await {
            if let Some(message) = event.message() {
                tracing::debug!(stage = %stage, "Progress: {}", message);
            }
            if let Some(outcome) = self.apply(&event) {
                return outcome;
            }
        }
        ReconcileOutcome::Closed
    }
}
