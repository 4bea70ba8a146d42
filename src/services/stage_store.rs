//! Stage Store
//!
//! Per-stage slots (busy, progress, error, message, result) plus the
//! broadcast of every change as a [`StageUpdate`]. Every mutation first
//! checks the liveness token so results arriving after teardown are dropped.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::Utc;
use seo_pipeline_core::{Stage, StageUpdate};
use serde_json::Value;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::models::stage::StageSnapshot;
use crate::services::progress::ProgressSink;
use crate::utils::error::{AppError, AppResult};

const UPDATE_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug)]
struct Slot {
    snapshot: StageSnapshot,
    /// Bumped on every message change; a pending auto-clear only fires if
    /// the message it was scheduled for is still shown.
    message_seq: u64,
}

/// Shared state of all stage slots
pub struct StageStore {
    slots: Mutex<HashMap<Stage, Slot>>,
    updates: broadcast::Sender<StageUpdate>,
    liveness: CancellationToken,
    success_ttl: Duration,
}

impl StageStore {
    pub fn new(liveness: CancellationToken, success_ttl: Duration) -> Self {
        let slots = Stage::ALL
            .iter()
            .map(|stage| {
                (
                    *stage,
                    Slot {
                        snapshot: StageSnapshot::idle(*stage),
                        message_seq: 0,
                    },
                )
            })
            .collect();
        let (updates, _) = broadcast::channel(UPDATE_CHANNEL_CAPACITY);
        Self {
            slots: Mutex::new(slots),
            updates,
            liveness,
            success_ttl,
        }
    }

    fn lock_slots(&self) -> AppResult<MutexGuard<'_, HashMap<Stage, Slot>>> {
        self.slots
            .lock()
            .map_err(|_| AppError::internal("stage store mutex poisoned"))
    }

    /// Whether the owning orchestrator is still alive
    pub fn is_alive(&self) -> bool {
        !self.liveness.is_cancelled()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StageUpdate> {
        self.updates.subscribe()
    }

    /// Apply `f` to the slot and publish whatever update it returns.
    /// Returns false when the store is shut down or the lock is poisoned.
    fn mutate<F>(&self, stage: Stage, f: F) -> bool
    where
        F: FnOnce(&mut Slot) -> Option<StageUpdate>,
    {
        if !self.is_alive() {
            return false;
        }
        let mut slots = match self.lock_slots() {
            Ok(slots) => slots,
            Err(e) => {
                tracing::error!(stage = %stage, "{}", e);
                return false;
            }
        };
        // Re-check under the lock: shutdown may have raced the acquisition.
        if !self.is_alive() {
            return false;
        }
        let slot = slots.entry(stage).or_insert_with(|| Slot {
            snapshot: StageSnapshot::idle(stage),
            message_seq: 0,
        });
        if let Some(update) = f(slot) {
            slot.snapshot.updated_at = Some(Utc::now());
            // No subscribers is fine.
            let _ = self.updates.send(update);
        }
        true
    }

    /// Start of an invocation: remember its id and clear the previous error
    /// and success message.
    pub fn begin_invocation(self: &Arc<Self>, stage: Stage, invocation_id: Uuid) -> bool {
        let applied = self.mutate(stage, |slot| {
            slot.snapshot.last_invocation = Some(invocation_id);
            None
        });
        self.set_error(stage, None);
        self.set_message(stage, None);
        applied
    }

    pub fn set_busy(&self, stage: Stage, busy: bool) -> bool {
        self.mutate(stage, |slot| {
            if slot.snapshot.busy == busy {
                return None;
            }
            slot.snapshot.busy = busy;
            Some(StageUpdate::Busy { stage, busy })
        })
    }

    pub fn set_progress(&self, stage: Stage, percent: u8) -> bool {
        let percent = percent.min(100);
        self.mutate(stage, |slot| {
            if slot.snapshot.progress == percent {
                return None;
            }
            slot.snapshot.progress = percent;
            Some(StageUpdate::Progress { stage, percent })
        })
    }

    /// Replace the result slot
    pub fn set_result(&self, stage: Stage, data: Value) -> bool {
        self.mutate(stage, |slot| {
            slot.snapshot.result = Some(data.clone());
            Some(StageUpdate::Result { stage, data })
        })
    }

    /// Set or clear the stage error. Errors persist until cleared.
    pub fn set_error(&self, stage: Stage, message: Option<String>) -> bool {
        self.mutate(stage, |slot| {
            if slot.snapshot.error == message {
                return None;
            }
            slot.snapshot.error = message.clone();
            Some(StageUpdate::Error { stage, message })
        })
    }

    /// Set the error only while `invocation_id` is still the stage's latest
    /// invocation. Returns false for a superseded invocation.
    pub fn set_invocation_error(&self, stage: Stage, invocation_id: Uuid, message: String) -> bool {
        let mut current = false;
        self.mutate(stage, |slot| {
            if slot.snapshot.last_invocation != Some(invocation_id) {
                return None;
            }
            current = true;
            if slot.snapshot.error.as_deref() == Some(message.as_str()) {
                return None;
            }
            slot.snapshot.error = Some(message.clone());
            Some(StageUpdate::Error {
                stage,
                message: Some(message),
            })
        });
        current
    }

    /// Set or clear the transient success message. A set message clears
    /// itself after the success TTL unless replaced first.
    pub fn set_message(self: &Arc<Self>, stage: Stage, message: Option<String>) -> bool {
        let mut scheduled = None;
        let applied = self.mutate(stage, |slot| {
            if slot.snapshot.message == message {
                return None;
            }
            slot.message_seq += 1;
            slot.snapshot.message = message.clone();
            if message.is_some() {
                scheduled = Some(slot.message_seq);
            }
            Some(StageUpdate::Message { stage, message })
        });

        if let Some(seq) = scheduled {
            let store = Arc::downgrade(self);
            let ttl = self.success_ttl;
            tokio::spawn(async move {
                tokio::time::sleep(ttl).await;
                if let Some(store) = store.upgrade() {
                    store.expire_message(stage, seq);
                }
            });
        }
        applied
    }

    fn expire_message(&self, stage: Stage, seq: u64) {
        self.mutate(stage, |slot| {
            if slot.message_seq != seq || slot.snapshot.message.is_none() {
                return None;
            }
            slot.message_seq += 1;
            slot.snapshot.message = None;
            Some(StageUpdate::Message {
                stage,
                message: None,
            })
        });
    }

    /// Tell the view a stage is waiting on an external authorization
    pub fn publish_authorization(&self, stage: Stage, auth_url: &str) -> bool {
        self.mutate(stage, |_| {
            Some(StageUpdate::AuthorizationRequired {
                stage,
                auth_url: auth_url.to_string(),
            })
        })
    }

    pub fn snapshot(&self, stage: Stage) -> AppResult<StageSnapshot> {
        let slots = self.lock_slots()?;
        Ok(slots
            .get(&stage)
            .map(|slot| slot.snapshot.clone())
            .unwrap_or_else(|| StageSnapshot::idle(stage)))
    }

    /// Snapshots of all stages in pipeline order
    pub fn snapshots(&self) -> AppResult<Vec<StageSnapshot>> {
        let slots = self.lock_slots()?;
        Ok(Stage::ALL
            .iter()
            .map(|stage| {
                slots
                    .get(stage)
                    .map(|slot| slot.snapshot.clone())
                    .unwrap_or_else(|| StageSnapshot::idle(*stage))
            })
            .collect())
    }
}

impl ProgressSink for StageStore {
    fn publish(&self, stage: Stage, percent: u8) {
        self.set_progress(stage, percent);
    }
}
