//! Persistent compiler worker pool
//!
//! A bounded set of slots, each standing for one long-lived compiler server.
//! A slot is warm for the worker key (server jar plus classpath) it last ran;
//! reusing a warm slot skips JVM startup.

use crate::error::{KilnError, KilnResult};
use std::sync::{Arc, Mutex};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::debug;

/// Logged the first time a pool slot is started within a run
pub const POOL_BOOTSTRAP_MARKER: &str = "isolation-mixed-pool-bootstrap";

#[derive(Debug, Default)]
struct Slot {
    warm_for: Option<String>,
    busy: bool,
}

/// Bounded pool of persistent worker slots
#[derive(Clone)]
pub struct WorkerPool {
    permits: Arc<Semaphore>,
    slots: Arc<Mutex<Vec<Slot>>>,
}

impl WorkerPool {
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        Self {
            permits: Arc::new(Semaphore::new(size)),
            slots: Arc::new(Mutex::new((0..size).map(|_| Slot::default()).collect())),
        }
    }

    pub fn size(&self) -> usize {
        self.lock_slots().len()
    }

    /// Number of slots currently warm for some worker key
    pub fn warm_slots(&self) -> usize {
        self.lock_slots().iter().filter(|s| s.warm_for.is_some()).count()
    }

    fn lock_slots(&self) -> std::sync::MutexGuard<'_, Vec<Slot>> {
        self.slots.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Wait for a free slot
    ///
    /// Prefers an idle slot already warm for `key`, then a cold slot, then
    /// evicts an idle slot warm for another key. The slot is released when
    /// the returned lease is dropped.
    pub async fn acquire(&self, key: &str) -> KilnResult<WorkerLease> {
        let permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| KilnError::Internal("worker pool closed".to_string()))?;

        let mut slots = self.lock_slots();
        let idle = |slot: &Slot| !slot.busy;
        let index = slots
            .iter()
            .position(|s| idle(s) && s.warm_for.as_deref() == Some(key))
            .or_else(|| slots.iter().position(|s| idle(s) && s.warm_for.is_none()))
            .or_else(|| slots.iter().position(idle))
            .ok_or_else(|| KilnError::Internal("no idle worker slot behind a free permit".to_string()))?;

        let slot = &mut slots[index];
        let bootstrapped = slot.warm_for.as_deref() != Some(key);
        slot.busy = true;
        slot.warm_for = Some(key.to_string());
        debug!(
            "Leased worker slot {} ({})",
            index,
            if bootstrapped { "cold" } else { "warm" }
        );

        Ok(WorkerLease {
            slot: index,
            bootstrapped,
            poisoned: false,
            slots: self.slots.clone(),
            _permit: permit,
        })
    }
}

/// Exclusive use of one worker slot
///
/// Dropping the lease frees the slot on every exit path, including task
/// cancellation.
pub struct WorkerLease {
    slot: usize,
    bootstrapped: bool,
    poisoned: bool,
    slots: Arc<Mutex<Vec<Slot>>>,
    _permit: OwnedSemaphorePermit,
}

impl WorkerLease {
    pub fn slot(&self) -> usize {
        self.slot
    }

    /// Whether this lease had to start its worker
    pub fn bootstrapped(&self) -> bool {
        self.bootstrapped
    }

    /// Mark the worker unusable so the next lease starts it afresh
    pub fn poison(&mut self) {
        self.poisoned = true;
    }
}

impl Drop for WorkerLease {
    fn drop(&mut self) {
        let mut slots = self.slots.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(slot) = slots.get_mut(self.slot) {
            slot.busy = false;
            if self.poisoned {
                slot.warm_for = None;
            }
        }
    }
}
