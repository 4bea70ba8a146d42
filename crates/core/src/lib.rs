//! SEO Pipeline Core
//!
//! Foundational types shared by the SEO pipeline workspace. This crate has
//! zero dependencies on transport or orchestration code.
//!
//! ## Module Organization
//!
//! - `error` - Core error types (`CoreError`, `CoreResult`)
//! - `stage` - Pipeline stages and n-gram sizes
//! - `envelope` - Backend response envelopes and outcome classification
//! - `progress` - Server-push progress events and the stream adapter trait
//! - `jobs` - Background job snapshot types
//! - `events` - `StageUpdate` events published to the view layer
//! - `resume` - Resume tickets and their storage keys

pub mod envelope;
pub mod error;
pub mod events;
pub mod jobs;
pub mod progress;
pub mod resume;
pub mod stage;

// ── Error Types ────────────────────────────────────────────────────────
pub use error::{CoreError, CoreResult};

// ── Stages ─────────────────────────────────────────────────────────────
pub use stage::{NgramSize, RequestPlan, Stage};

// ── Envelopes ──────────────────────────────────────────────────────────
pub use envelope::{
    classify_response, ApiEnvelope, EnvelopeOutcome, FailureDetail, NgramEnvelope,
    ValidationIssue,
};

// ── Progress Stream ────────────────────────────────────────────────────
pub use progress::{AdapterError, ProgressEvent, ProgressSignal, ProgressStreamAdapter};

// ── Jobs, Events, Resume ───────────────────────────────────────────────
pub use events::StageUpdate;
pub use jobs::{BackgroundJob, TaskStatusResponse};
pub use resume::{ResumeKeys, ResumeTicket, RESUME_FLAG_SET};
