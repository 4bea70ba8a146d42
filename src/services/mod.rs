//! Services
//!
//! Orchestration logic: stage invocation, progress simulation and
//! reconciliation, background task polling, resume tickets, and the
//! per-stage loading registry.

pub mod auth;
pub mod orchestrator;
pub mod poller;
pub mod progress;
pub mod registry;
pub mod resume;
pub mod stage_store;

pub use auth::{parse_auth_url, AuthRedirector, RecordingRedirector, SystemBrowserRedirector};
pub use orchestrator::Orchestrator;
pub use poller::{BackgroundTaskPoller, PollDecision, PollerMachine, RefreshHandler};
pub use progress::{
    ProgressMachine, ProgressPhase, ProgressReconciler, ProgressSimulator, ProgressSink,
    ReconcileOutcome,
};
pub use registry::LoadingRegistry;
pub use resume::{PendingResume, ResumeManager};
pub use stage_store::StageStore;
