//! Keyed at-most-once computations
//!
//! `OnceMap` maps a key to a single shared result. The first requester for a
//! key runs the computation; every concurrent requester for the same key
//! awaits that same computation instead of starting its own.

use crate::error::KilnResult;
use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::{Arc, Mutex};
use tokio::sync::OnceCell;

/// Map from key to a single-initialization shared result
///
/// Failures are retained like successes: a key whose computation failed
/// keeps failing for the lifetime of the map without being recomputed.
pub struct OnceMap<K, V> {
    cells: Mutex<HashMap<K, Arc<OnceCell<KilnResult<V>>>>>,
}

impl<K, V> OnceMap<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new() -> Self {
        Self {
            cells: Mutex::new(HashMap::new()),
        }
    }

    fn cell(&self, key: &K) -> Arc<OnceCell<KilnResult<V>>> {
        let mut cells = self.cells.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        cells
            .entry(key.clone())
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .clone()
    }

    /// Get the value for `key`, running `init` only if no computation for
    /// the key has started yet
    pub async fn get_or_compute<F, Fut>(&self, key: K, init: F) -> KilnResult<V>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = KilnResult<V>>,
    {
        let cell = self.cell(&key);
        cell.get_or_init(init).await.clone()
    }

    /// The settled value for `key`, if its computation has finished
    pub fn peek(&self, key: &K) -> Option<KilnResult<V>> {
        let cells = self.cells.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        cells.get(key).and_then(|cell| cell.get().cloned())
    }

    /// Number of keys that have been requested
    pub fn len(&self) -> usize {
        self.cells
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<K, V> Default for OnceMap<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    fn default() -> Self {
        Self::new()
    }
}
