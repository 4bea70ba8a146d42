//! Stage Loading-State Registry
//!
//! Per-stage busy flag with a hard safety timeout. Each invocation gets a
//! generation number; only the holder of the current generation can clear
//! the flag, so busy toggles at most once per invocation.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use seo_pipeline_core::Stage;
use tokio::task::JoinHandle;

use super::stage_store::StageStore;
use crate::utils::error::{AppError, AppResult};

#[derive(Debug, Default)]
struct Entry {
    generation: u64,
    busy: bool,
    timer: Option<JoinHandle<()>>,
}

#[derive(Debug, Default)]
struct RegistryState {
    next_generation: u64,
    entries: HashMap<Stage, Entry>,
}

/// Busy-flag bookkeeping for all stages
pub struct LoadingRegistry {
    store: Arc<StageStore>,
    safety_timeout: Duration,
    state: Mutex<RegistryState>,
}

impl LoadingRegistry {
    pub fn new(store: Arc<StageStore>, safety_timeout: Duration) -> Self {
        Self {
            store,
            safety_timeout,
            state: Mutex::new(RegistryState::default()),
        }
    }

    fn lock_state(&self) -> AppResult<MutexGuard<'_, RegistryState>> {
        self.state
            .lock()
            .map_err(|_| AppError::internal("loading registry mutex poisoned"))
    }

    /// Mark `stage` busy and arm the safety timeout. Returns the generation
    /// the caller must present to [`finish`](Self::finish).
    pub fn begin(self: &Arc<Self>, stage: Stage) -> AppResult<u64> {
        let mut state = self.lock_state()?;
        state.next_generation += 1;
        let generation = state.next_generation;

        let registry: Weak<Self> = Arc::downgrade(self);
        let timeout = self.safety_timeout;
        let timer = tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            if let Some(registry) = registry.upgrade() {
                registry.expire(stage, generation);
            }
        });

        let entry = state.entries.entry(stage).or_default();
        if let Some(old) = entry.timer.replace(timer) {
            old.abort();
        }
        entry.generation = generation;
        entry.busy = true;
        self.store.set_busy(stage, true);

        Ok(generation)
    }

    /// Clear busy for the invocation holding `generation`. Returns whether
    /// this call flipped the flag.
    pub fn finish(&self, stage: Stage, generation: u64) -> bool {
        self.clear_if_current(stage, generation)
    }

    fn expire(&self, stage: Stage, generation: u64) {
        if self.clear_if_current(stage, generation) {
            tracing::warn!(
                stage = %stage,
                timeout_secs = self.safety_timeout.as_secs(),
                "Busy flag forced off by safety timeout; request still running"
            );
        }
    }

    fn clear_if_current(&self, stage: Stage, generation: u64) -> bool {
        let mut state = match self.lock_state() {
            Ok(state) => state,
            Err(e) => {
                tracing::error!(stage = %stage, "{}", e);
                return false;
            }
        };
        let Some(entry) = state.entries.get_mut(&stage) else {
            return false;
        };
        if entry.generation != generation || !entry.busy {
            return false;
        }
        entry.busy = false;
        if let Some(timer) = entry.timer.take() {
            timer.abort();
        }
        self.store.set_busy(stage, false);
        true
    }

    /// Force the stage idle regardless of which invocation holds it.
    pub fn reset(&self, stage: Stage) -> AppResult<()> {
        let mut state = self.lock_state()?;
        state.next_generation += 1;
        let generation = state.next_generation;
        let entry = state.entries.entry(stage).or_default();
        entry.generation = generation;
        entry.busy = false;
        if let Some(timer) = entry.timer.take() {
            timer.abort();
        }
        self.store.set_busy(stage, false);
        Ok(())
    }

    pub fn is_busy(&self, stage: Stage) -> bool {
        self.lock_state()
            .map(|state| state.entries.get(&stage).map(|e| e.busy).unwrap_or(false))
            .unwrap_or(false)
    }

    /// Abort all pending safety timers.
    pub fn shutdown(&self) {
        if let Ok(mut state) = self.lock_state() {
            for entry in state.entries.values_mut() {
                if let Some(timer) = entry.timer.take() {
                    timer.abort();
                }
            }
        }
    }
}
