//! Progress Simulator
//!
//! Synthetic progress for one stage. [`ProgressMachine`] holds the pure
//! transitions; [`ProgressSimulator`] drives it with tokio timers and
//! publishes every value change to a [`ProgressSink`].

use std::sync::{Arc, Mutex, MutexGuard};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use seo_pipeline_core::Stage;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use crate::models::settings::ProgressSettings;

/// Receives displayed progress values
pub trait ProgressSink: Send + Sync {
    fn publish(&self, stage: Stage, percent: u8);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressPhase {
    Idle,
    /// Synthetic ticks only
    Simulating,
    /// Synthetic ticks plus adopted server values
    Reconciling,
    /// Fast ticks towards 100
    Completing,
    /// 100 shown for the hold period
    Holding,
}

/// Pure progress state machine.
///
/// Every `start` and `stop` bumps the run number. Timer tasks remember the
/// run they were spawned for and must not touch a machine whose run moved on.
#[derive(Debug, Clone)]
pub struct ProgressMachine {
    phase: ProgressPhase,
    value: u8,
    cap: u8,
    run: u64,
}

impl ProgressMachine {
    pub fn new(cap: u8) -> Self {
        Self {
            phase: ProgressPhase::Idle,
            value: 0,
            cap: cap.clamp(1, 99),
            run: 0,
        }
    }

    pub fn phase(&self) -> ProgressPhase {
        self.phase
    }

    pub fn value(&self) -> u8 {
        self.value
    }

    pub fn run(&self) -> u64 {
        self.run
    }

    fn is_active(&self) -> bool {
        matches!(
            self.phase,
            ProgressPhase::Simulating | ProgressPhase::Reconciling
        )
    }

    /// Begin a new run at 0.
    pub fn start(&mut self) -> u64 {
        self.run += 1;
        self.phase = ProgressPhase::Simulating;
        self.value = 0;
        self.run
    }

    /// One synthetic step. Values stay strictly below the cap.
    pub fn tick(&mut self, increment: u8) -> Option<u8> {
        if !self.is_active() {
            return None;
        }
        let ceiling = self.cap - 1;
        if self.value >= ceiling {
            return None;
        }
        let next = self.value.saturating_add(increment).min(ceiling);
        if next == self.value {
            return None;
        }
        self.value = next;
        Some(next)
    }

    /// Adopt an authoritative percentage if it is ahead of the display.
    /// Only a completion reaches 100, so non-terminal values stop at 99.
    pub fn observe(&mut self, percent: f64) -> Option<u8> {
        if !self.is_active() || !percent.is_finite() {
            return None;
        }
        let adopted = percent.clamp(0.0, 99.0).floor() as u8;
        if adopted <= self.value {
            return None;
        }
        self.value = adopted;
        self.phase = ProgressPhase::Reconciling;
        Some(adopted)
    }

    /// Switch to fast completion. Returns false if already completing,
    /// holding, or idle.
    pub fn begin_complete(&mut self) -> bool {
        if !self.is_active() {
            return false;
        }
        self.phase = ProgressPhase::Completing;
        true
    }

    /// One fast step; reaching 100 enters the hold.
    pub fn fast_tick(&mut self, increment: u8) -> Option<u8> {
        if self.phase != ProgressPhase::Completing {
            return None;
        }
        self.value = self.value.saturating_add(increment.max(1)).min(100);
        if self.value == 100 {
            self.phase = ProgressPhase::Holding;
        }
        Some(self.value)
    }

    /// End of the hold: back to idle at 0.
    pub fn finish_hold(&mut self) -> bool {
        if self.phase != ProgressPhase::Holding {
            return false;
        }
        self.phase = ProgressPhase::Idle;
        self.value = 0;
        true
    }

    /// Cancel the run without completing. Returns true if the value changed.
    pub fn stop(&mut self) -> bool {
        self.run += 1;
        self.phase = ProgressPhase::Idle;
        let changed = self.value != 0;
        self.value = 0;
        changed
    }
}

struct SimulatorState {
    machine: ProgressMachine,
    rng: StdRng,
    task: Option<JoinHandle<()>>,
}

/// Timer driver around a [`ProgressMachine`] for one stage
pub struct ProgressSimulator {
    stage: Stage,
    settings: ProgressSettings,
    sink: Arc<dyn ProgressSink>,
    state: Mutex<SimulatorState>,
}

impl ProgressSimulator {
    pub fn new(stage: Stage, settings: ProgressSettings, sink: Arc<dyn ProgressSink>) -> Self {
        Self::with_rng(stage, settings, sink, StdRng::from_entropy())
    }

    /// Deterministic increments
    pub fn with_seed(
        stage: Stage,
        settings: ProgressSettings,
        sink: Arc<dyn ProgressSink>,
        seed: u64,
    ) -> Self {
        Self::with_rng(stage, settings, sink, StdRng::seed_from_u64(seed))
    }

    fn with_rng(
        stage: Stage,
        settings: ProgressSettings,
        sink: Arc<dyn ProgressSink>,
        rng: StdRng,
    ) -> Self {
        let machine = ProgressMachine::new(settings.cap);
        Self {
            stage,
            settings,
            sink,
            state: Mutex::new(SimulatorState {
                machine,
                rng,
                task: None,
            }),
        }
    }

    // Recover from poisoning: the machine is plain data and stays consistent.
    fn lock_state(&self) -> MutexGuard<'_, SimulatorState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn value(&self) -> u8 {
        self.lock_state().machine.value()
    }

    pub fn phase(&self) -> ProgressPhase {
        self.lock_state().machine.phase()
    }

    /// Reset to 0 and start ticking. Returns the run id that later
    /// `observe`, `complete`, and `stop` calls must present.
    pub fn start(self: &Arc<Self>) -> u64 {
        let mut state = self.lock_state();
        let run = state.machine.start();
        self.sink.publish(self.stage, 0);

        let simulator = Arc::clone(self);
        let period = self.settings.tick();
        let task = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if !simulator.apply_tick(run) {
                    break;
                }
            }
        });
        if let Some(old) = state.task.replace(task) {
            old.abort();
        }
        run
    }

    /// Returns false once the run is over.
    fn apply_tick(&self, run: u64) -> bool {
        let mut state = self.lock_state();
        if state.machine.run() != run || !state.machine.is_active() {
            return false;
        }
        let increment = state
            .rng
            .gen_range(self.settings.min_increment..=self.settings.max_increment);
        if let Some(value) = state.machine.tick(increment) {
            tracing::debug!(stage = %self.stage, progress = value, "Simulated progress tick");
            self.sink.publish(self.stage, value);
        }
        true
    }

    /// Feed an authoritative percentage. Ignored for a superseded run.
    pub fn observe(&self, run: u64, percent: f64) {
        let mut state = self.lock_state();
        if state.machine.run() != run {
            return;
        }
        if let Some(value) = state.machine.observe(percent) {
            self.sink.publish(self.stage, value);
        }
    }

    /// Fast-forward to 100, hold, then reset to 0. Idempotent; a no-op
    /// for a superseded run.
    pub fn complete(self: &Arc<Self>, run: u64) {
        let mut state = self.lock_state();
        if state.machine.run() != run || !state.machine.begin_complete() {
            return;
        }

        let simulator = Arc::clone(self);
        let period = self.settings.fast_tick();
        let hold = self.settings.hold();
        let task = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                match simulator.apply_fast_tick(run) {
                    Some(ProgressPhase::Completing) => continue,
                    Some(ProgressPhase::Holding) => break,
                    _ => return,
                }
            }
            tokio::time::sleep(hold).await;
            let mut state = simulator.lock_state();
            if state.machine.run() == run && state.machine.finish_hold() {
                simulator.sink.publish(simulator.stage, 0);
            }
        });
        if let Some(old) = state.task.replace(task) {
            old.abort();
        }
    }

    fn apply_fast_tick(&self, run: u64) -> Option<ProgressPhase> {
        let mut state = self.lock_state();
        if state.machine.run() != run {
            return None;
        }
        let increment = state
            .rng
            .gen_range(self.settings.fast_min_increment..=self.settings.fast_max_increment);
        let value = state.machine.fast_tick(increment)?;
        self.sink.publish(self.stage, value);
        Some(state.machine.phase())
    }

    /// Cancel `run` without completing. A no-op once a newer run started.
    pub fn stop(&self, run: u64) {
        let mut state = self.lock_state();
        if state.machine.run() != run {
            return;
        }
        self.halt_locked(&mut state);
    }

    /// Cancel whatever run is current. No tick is applied after this returns.
    pub fn halt(&self) {
        let mut state = self.lock_state();
        self.halt_locked(&mut state);
    }

    fn halt_locked(&self, state: &mut SimulatorState) {
        if state.machine.stop() {
            self.sink.publish(self.stage, 0);
        }
        if let Some(task) = state.task.take() {
            task.abort();
        }
    }
}
