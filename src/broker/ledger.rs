//! Operation ledger.
//!
//! Tracks the lifecycle of every in-flight operation of one broker. An entry
//! is created `Ongoing`, may be flagged cancelled at any time, becomes
//! completed when its first terminator is observed, and is removed once the
//! outermost stage has delivered that terminator. Lookups on ids that are not
//! in the table are no-ops.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;

use mediaweave_common::OperationId;

/// Hook invoked when an operation is cancelled.
pub type CancelHook = Arc<dyn Fn(OperationId) + Send + Sync>;

/// Lifecycle phase of an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationPhase {
    Ongoing,
    Cancelled,
    Completed,
    Finished,
}

impl fmt::Display for OperationPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ongoing => write!(f, "ongoing"),
            Self::Cancelled => write!(f, "cancelled"),
            Self::Completed => write!(f, "completed"),
            Self::Finished => write!(f, "finished"),
        }
    }
}

/// Diagnostic view of a live operation.
#[derive(Debug, Clone, Serialize)]
pub struct OperationInfo {
    pub id: OperationId,
    pub source_id: String,
    pub phase: OperationPhase,
    pub cancelled: bool,
    pub started_at: DateTime<Utc>,
}

struct Entry {
    source_id: String,
    cancel_hook: Option<CancelHook>,
    cancelled: bool,
    completed: bool,
    data: Option<Box<dyn Any + Send>>,
    started_at: DateTime<Utc>,
}

impl Entry {
    fn phase(&self) -> OperationPhase {
        if self.completed {
            OperationPhase::Completed
        } else if self.cancelled {
            OperationPhase::Cancelled
        } else {
            OperationPhase::Ongoing
        }
    }
}

struct LedgerState {
    last_id: OperationId,
    entries: HashMap<OperationId, Entry>,
}

/// Table of in-flight operations.
pub struct OperationLedger {
    state: Mutex<LedgerState>,
}

impl Default for OperationLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl OperationLedger {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(LedgerState {
                last_id: OperationId::new(0),
                entries: HashMap::new(),
            }),
        }
    }

    /// Allocate the next id and record it as ongoing.
    pub fn begin(&self, source_id: &str, cancel_hook: Option<CancelHook>) -> OperationId {
        let mut state = self.state.lock();
        let id = state.last_id.next();
        state.last_id = id;
        state.entries.insert(
            id,
            Entry {
                source_id: source_id.to_string(),
                cancel_hook,
                cancelled: false,
                completed: false,
                data: None,
                started_at: Utc::now(),
            },
        );
        tracing::debug!(operation_id = %id, source = %source_id, "Operation started");
        id
    }

    /// Flag `id` as cancelled and notify its source.
    ///
    /// Returns `false` without side effects when the id is unknown, already
    /// cancelled, or already completed.
    pub fn cancel(&self, id: OperationId) -> bool {
        let hook = {
            let mut state = self.state.lock();
            let Some(entry) = state.entries.get_mut(&id) else {
                return false;
            };
            if entry.cancelled || entry.completed {
                return false;
            }
            entry.cancelled = true;
            entry.cancel_hook.clone()
        };

        tracing::debug!(operation_id = %id, "Operation cancelled");
        if let Some(hook) = hook {
            hook(id);
        }
        true
    }

    /// Record that the first terminator of `id` was observed.
    pub fn mark_completed(&self, id: OperationId) {
        if let Some(entry) = self.state.lock().entries.get_mut(&id) {
            entry.completed = true;
        }
    }

    /// Remove `id` once its terminator has been delivered.
    pub fn mark_finished(&self, id: OperationId) {
        let removed = self.state.lock().entries.remove(&id);
        match removed {
            Some(entry) => {
                let elapsed = Utc::now() - entry.started_at;
                tracing::debug!(
                    operation_id = %id,
                    source = %entry.source_id,
                    elapsed_ms = elapsed.num_milliseconds(),
                    "Operation finished"
                );
            }
            None => {
                tracing::warn!(operation_id = %id, "Finish requested for unknown operation");
            }
        }
    }

    /// Live, not cancelled and not completed.
    pub fn is_ongoing(&self, id: OperationId) -> bool {
        self.state
            .lock()
            .entries
            .get(&id)
            .map(|e| !e.cancelled && !e.completed)
            .unwrap_or(false)
    }

    pub fn is_cancelled(&self, id: OperationId) -> bool {
        self.state
            .lock()
            .entries
            .get(&id)
            .map(|e| e.cancelled)
            .unwrap_or(false)
    }

    /// Completed or no longer tracked.
    pub fn is_completed(&self, id: OperationId) -> bool {
        self.state
            .lock()
            .entries
            .get(&id)
            .map(|e| e.completed)
            .unwrap_or(true)
    }

    /// No longer tracked.
    pub fn is_finished(&self, id: OperationId) -> bool {
        !self.state.lock().entries.contains_key(&id)
    }

    /// Phase of `id`; ids no longer tracked report `Finished`.
    pub fn phase(&self, id: OperationId) -> OperationPhase {
        self.state
            .lock()
            .entries
            .get(&id)
            .map(Entry::phase)
            .unwrap_or(OperationPhase::Finished)
    }

    /// Source id `id` was started against.
    pub fn source_of(&self, id: OperationId) -> Option<String> {
        self.state
            .lock()
            .entries
            .get(&id)
            .map(|e| e.source_id.clone())
    }

    /// Attach an opaque payload, replacing any previous one.
    ///
    /// Returns `false` when `id` is not tracked.
    pub fn attach(&self, id: OperationId, data: Box<dyn Any + Send>) -> bool {
        match self.state.lock().entries.get_mut(&id) {
            Some(entry) => {
                entry.data = Some(data);
                true
            }
            None => false,
        }
    }

    /// Take the payload out of `id`.
    pub fn detach(&self, id: OperationId) -> Option<Box<dyn Any + Send>> {
        self.state.lock().entries.get_mut(&id)?.data.take()
    }

    /// Borrow the payload of `id` as `T`.
    ///
    /// The ledger is locked while `f` runs, so `f` must not call back into the
    /// broker.
    pub fn with_data<T: 'static, R>(&self, id: OperationId, f: impl FnOnce(&T) -> R) -> Option<R> {
        let state = self.state.lock();
        let data = state.entries.get(&id)?.data.as_ref()?;
        data.downcast_ref::<T>().map(f)
    }

    /// Number of tracked operations.
    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().entries.is_empty()
    }

    /// Live operations, oldest first.
    pub fn snapshot(&self) -> Vec<OperationInfo> {
        let state = self.state.lock();
        let mut infos: Vec<OperationInfo> = state
            .entries
            .iter()
            .map(|(id, entry)| OperationInfo {
                id: *id,
                source_id: entry.source_id.clone(),
                phase: entry.phase(),
                cancelled: entry.cancelled,
                started_at: entry.started_at,
            })
            .collect();
        infos.sort_by_key(|info| info.id);
        infos
    }
}
