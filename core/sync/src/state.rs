//! Engine state: the in-flight flag and the per-cycle result.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};

use fieldsync_common::{Error, RecordId};

/// Whether a sync cycle is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineState {
    Idle,
    Syncing,
}

/// Snapshot returned by `SyncEngine::get_sync_status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncFlag {
    pub is_syncing: bool,
}

/// Process-wide mutual exclusion for sync cycles.
///
/// Acquisition is a single compare-and-swap, so concurrent manual and
/// automatic triggers cannot both pass.
#[derive(Debug, Default)]
pub struct InFlight {
    flag: AtomicBool,
}

impl InFlight {
    pub fn new() -> Self {
        Self::default()
    }

    /// Try to move `Idle -> Syncing`.
    ///
    /// The returned guard moves back to `Idle` when dropped, on every exit
    /// path.
    pub fn try_acquire(&self) -> Option<InFlightGuard<'_>> {
        self.flag
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| InFlightGuard { flag: &self.flag })
    }

    pub fn state(&self) -> EngineState {
        if self.flag.load(Ordering::Acquire) {
            EngineState::Syncing
        } else {
            EngineState::Idle
        }
    }
}

/// Holds the in-flight flag for the duration of one cycle.
#[derive(Debug)]
pub struct InFlightGuard<'a> {
    flag: &'a AtomicBool,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// Aggregated outcome of one sync cycle.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncResult {
    pub success: bool,
    pub synced_tasks: usize,
    pub synced_evidence: usize,
    pub failed_tasks: Vec<RecordId>,
    pub failed_evidence: Vec<RecordId>,
    pub errors: Vec<String>,
}

impl SyncResult {
    /// A successful result with nothing pushed yet.
    pub fn new() -> Self {
        Self {
            success: true,
            ..Self::default()
        }
    }

    /// A failed result carrying a single error and no item changes.
    pub fn aborted(error: &Error) -> Self {
        Self {
            success: false,
            errors: vec![error.to_string()],
            ..Self::default()
        }
    }

    /// Record an error and mark the cycle unsuccessful.
    pub fn fail(&mut self, error: impl Into<String>) {
        self.success = false;
        self.errors.push(error.into());
    }
}
