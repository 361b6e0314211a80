use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Pending calls keyed by sequence number.
///
/// Every removal goes through the same lock, so for a given sequence number
/// exactly one of the response path, the send-failure path or the close
/// drain gets the entry back; the others see `None`.
#[derive(Debug)]
pub struct CallRegistry<T> {
    pending: Mutex<HashMap<u64, T>>,
}

impl<T> CallRegistry<T> {
    pub fn new() -> Self {
        Self {
            pending: Mutex::new(HashMap::new()),
        }
    }

    /// Register `pending` under `seq`, returning any entry it displaced.
    pub fn store(&self, seq: u64, pending: T) -> Option<T> {
        self.lock().insert(seq, pending)
    }

    /// Remove `seq` without handing the entry back.
    pub fn delete(&self, seq: u64) {
        self.lock().remove(&seq);
    }

    /// Atomically remove and return the entry for `seq`.
    pub fn claim_and_delete(&self, seq: u64) -> Option<T> {
        self.lock().remove(&seq)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Remove every entry.
    pub fn drain(&self) -> Vec<(u64, T)> {
        self.lock().drain().collect()
    }

    // The map holds no cross-entry invariant, so a poisoned lock is safe to reuse.
    fn lock(&self) -> MutexGuard<'_, HashMap<u64, T>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T> Default for CallRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}
