//! Session/Resume Manager
//!
//! Persists the parameters of a stage interrupted by an authorization
//! redirect so the next start can re-invoke it. At most one ticket is
//! pending; taking it reads and deletes it under one lock.

use std::sync::{Arc, Mutex};

use seo_pipeline_core::{ResumeKeys, ResumeTicket, Stage, RESUME_FLAG_SET};
use serde_json::Value;

use crate::storage::durable::DurableStore;
use crate::utils::error::{AppError, AppResult};

/// What was found in durable storage on startup
#[derive(Debug, Clone, PartialEq)]
pub enum PendingResume {
    None,
    Ready(ResumeTicket),
    /// Flag was set but the parameters could not be read; the ticket has
    /// been discarded.
    Corrupt { stage: Stage },
}

pub struct ResumeManager {
    store: Arc<dyn DurableStore>,
    resumable: Vec<Stage>,
    lock: Mutex<()>,
}

impl ResumeManager {
    pub fn new(store: Arc<dyn DurableStore>, resumable: Vec<Stage>) -> Self {
        Self {
            store,
            resumable,
            lock: Mutex::new(()),
        }
    }

    pub fn is_resumable(&self, stage: Stage) -> bool {
        self.resumable.contains(&stage)
    }

    /// Write a ticket for `stage`, replacing any other pending ticket.
    pub fn save(&self, stage: Stage, parameters: &Value) -> AppResult<()> {
        if !self.is_resumable(stage) {
            return Err(AppError::validation(format!(
                "Stage {} is not resumable",
                stage
            )));
        }
        let params = serde_json::to_string(parameters)?;
        let keys = ResumeKeys::for_stage(stage);

        let other_keys: Vec<ResumeKeys> = self
            .resumable
            .iter()
            .filter(|s| **s != stage)
            .map(|s| ResumeKeys::for_stage(*s))
            .collect();
        let removals: Vec<&str> = other_keys
            .iter()
            .flat_map(|k| [k.flag.as_str(), k.params.as_str()])
            .collect();

        let _guard = self
            .lock
            .lock()
            .map_err(|_| AppError::internal("resume manager mutex poisoned"))?;
        self.store.replace(
            &removals,
            &[
                (keys.flag.as_str(), RESUME_FLAG_SET),
                (keys.params.as_str(), params.as_str()),
            ],
        )?;
        tracing::info!(stage = %stage, "Saved resume ticket before authorization redirect");
        Ok(())
    }

    /// Stage of the pending ticket without consuming it
    pub fn pending_stage(&self) -> AppResult<Option<Stage>> {
        for stage in &self.resumable {
            let keys = ResumeKeys::for_stage(*stage);
            if self.store.get(&keys.flag)?.as_deref() == Some(RESUME_FLAG_SET) {
                return Ok(Some(*stage));
            }
        }
        Ok(None)
    }

    /// Read and delete the pending ticket. A ticket is returned at most once.
    pub fn take_pending(&self) -> AppResult<PendingResume> {
        let _guard = self
            .lock
            .lock()
            .map_err(|_| AppError::internal("resume manager mutex poisoned"))?;

        for stage in &self.resumable {
            let keys = ResumeKeys::for_stage(*stage);
            if self.store.get(&keys.flag)?.as_deref() != Some(RESUME_FLAG_SET) {
                continue;
            }

            let mut taken = self
                .store
                .take(&[keys.flag.as_str(), keys.params.as_str()])?
                .into_iter();
            let raw_params = taken.nth(1).flatten();

            let parameters = raw_params
                .ok_or_else(|| "missing parameters".to_string())
                .and_then(|raw| serde_json::from_str::<Value>(&raw).map_err(|e| e.to_string()));

            return Ok(match parameters {
                Ok(parameters) => PendingResume::Ready(ResumeTicket {
                    stage: *stage,
                    parameters,
                }),
                Err(reason) => {
                    tracing::warn!(stage = %stage, reason = %reason, "Discarding corrupt resume ticket");
                    PendingResume::Corrupt { stage: *stage }
                }
            });
        }

        Ok(PendingResume::None)
    }

    pub fn clear(&self, stage: Stage) -> AppResult<()> {
        let keys = ResumeKeys::for_stage(stage);
        self.store.take(&[keys.flag.as_str(), keys.params.as_str()])?;
        Ok(())
    }
}
