//! Per-identifier mutation queue.
//!
//! Each identifier gets a FIFO async mutex on first use. A mutation holds it
//! from local apply until reconciliation or rollback, so a second mutation of
//! the same row starts from settled state. Entries are dropped once nobody
//! holds or waits on them.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

#[derive(Debug, Default)]
pub struct EntityLocks {
    slots: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

/// Exclusive turn on one identifier; released on drop.
#[derive(Debug)]
pub struct EntityGuard<'a> {
    locks: &'a EntityLocks,
    id: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl EntityLocks {
    /// Wait for, then take, the turn on `id`.
    pub async fn acquire(&self, id: &str) -> EntityGuard<'_> {
        let slot = {
            let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
            slots.entry(id.to_string()).or_default().clone()
        };
        let guard = slot.lock_owned().await;
        EntityGuard { locks: self, id: id.to_string(), guard: Some(guard) }
    }

    /// Identifiers with a live slot.
    #[cfg(test)]
    pub(crate) fn active(&self) -> usize {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

impl EntityGuard<'_> {
    pub fn id(&self) -> &str {
        &self.id
    }
}

impl Drop for EntityGuard<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        let mut slots = self.locks.slots.lock().unwrap_or_else(PoisonError::into_inner);
        if slots.get(&self.id).is_some_and(|slot| Arc::strong_count(slot) == 1) {
            slots.remove(&self.id);
        }
    }
}
