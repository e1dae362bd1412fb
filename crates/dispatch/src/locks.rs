//! Per-entity mutual exclusion.
//!
//! The coordinator serializes writes to one listing, one request or one
//! driver without ever taking a table-wide lock. The table map is held only
//! while a handle is looked up, inserted or retired. An entry lives exactly
//! as long as some caller holds a handle for its key, so ids that are only
//! ever locked (including ids that do not exist) leave nothing behind.

use std::collections::HashMap;
use std::hash::Hash;
use std::ops::Deref;
use std::sync::{Arc, Mutex, MutexGuard};

use lifelink_domain::Result;

use crate::store::lock_error;

struct Slot {
    lock: Arc<Mutex<()>>,
    holders: usize,
}

/// Table of one lock per key, created on first use and dropped with the
/// last handle
pub struct KeyedLocks<K: Eq + Hash + Copy> {
    table: Mutex<HashMap<K, Slot>>,
}

impl<K: Eq + Hash + Copy> KeyedLocks<K> {
    pub fn new() -> Self {
        Self {
            table: Mutex::new(HashMap::new()),
        }
    }

    /// Lock handle for `key`
    pub fn handle(&self, key: K) -> Result<LockHandle<'_, K>> {
        let mut table = self.table.lock().map_err(lock_error)?;
        let slot = table.entry(key).or_insert_with(|| Slot {
            lock: Arc::new(Mutex::new(())),
            holders: 0,
        });
        slot.holders += 1;
        Ok(LockHandle {
            owner: self,
            key,
            lock: slot.lock.clone(),
        })
    }

    /// Number of keys with a live handle
    pub fn len(&self) -> usize {
        self.table.lock().map(|t| t.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn retire(&self, key: K) {
        // A poisoned table keeps the entry; it is only memory
        let Ok(mut table) = self.table.lock() else {
            return;
        };
        if let Some(slot) = table.get_mut(&key) {
            slot.holders = slot.holders.saturating_sub(1);
            if slot.holders == 0 {
                table.remove(&key);
            }
        }
    }
}

impl<K: Eq + Hash + Copy> Default for KeyedLocks<K> {
    fn default() -> Self {
        Self::new()
    }
}

/// Registered interest in one key's lock.
///
/// Dereferences to the key's mutex. Guards taken from it borrow the handle,
/// so they are always released before the handle retires its entry.
pub struct LockHandle<'a, K: Eq + Hash + Copy> {
    owner: &'a KeyedLocks<K>,
    key: K,
    lock: Arc<Mutex<()>>,
}

impl<K: Eq + Hash + Copy> Deref for LockHandle<'_, K> {
    type Target = Mutex<()>;

    fn deref(&self) -> &Mutex<()> {
        &self.lock
    }
}

impl<K: Eq + Hash + Copy> Drop for LockHandle<'_, K> {
    fn drop(&mut self) {
        self.owner.retire(self.key);
    }
}

/// Acquire a handle obtained from [`KeyedLocks::handle`]
pub fn acquire(handle: &Mutex<()>) -> Result<MutexGuard<'_, ()>> {
    handle.lock().map_err(lock_error)
}
