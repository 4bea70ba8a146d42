//! Progress Tracking
//!
//! Simulated per-stage progress and its reconciliation with server-push
//! progress events.

pub mod reconciler;
pub mod simulator;

pub use reconciler::{ProgressReconciler, ReconcileOutcome};
pub use simulator::{ProgressMachine, ProgressPhase, ProgressSimulator, ProgressSink};
