//! Lock Registries
//!
//! Keyed mutex registries: one writer lock per project for the persistence
//! layer, one advisory lock per repository for the sync engine. Locks for
//! distinct keys never contend.

use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard};

use dashmap::DashMap;

use crate::utils::error::{AppError, AppResult};

/// A registry handing out one shared mutex per key.
#[derive(Debug)]
pub struct LockRegistry<K: Eq + Hash> {
    locks: Arc<DashMap<K, Arc<Mutex<()>>>>,
}

impl<K: Eq + Hash> Clone for LockRegistry<K> {
    fn clone(&self) -> Self {
        Self {
            locks: Arc::clone(&self.locks),
        }
    }
}

impl<K: Eq + Hash> Default for LockRegistry<K> {
    fn default() -> Self {
        Self {
            locks: Arc::new(DashMap::new()),
        }
    }
}

impl<K: Eq + Hash + Clone> LockRegistry<K> {
    pub fn new() -> Self {
        Self::default()
    }

    /// The mutex for `key`, created on first use.
    pub fn lock_for(&self, key: &K) -> Arc<Mutex<()>> {
        self.locks
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Number of keys that have ever been locked.
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

/// Acquire a registry mutex, mapping poisoning to an internal error.
pub fn acquire<'a>(lock: &'a Mutex<()>, what: &str) -> AppResult<MutexGuard<'a, ()>> {
    lock.lock()
        .map_err(|_| AppError::internal(format!("{} lock poisoned", what)))
}
