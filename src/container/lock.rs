use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::error::{GridError, Result};

/// Per-key exclusive locks. Holding the guard is holding the lock.
pub struct LockManager {
    locks: DashMap<String, Arc<Mutex<()>>>,
    acquisition_timeout: Duration,
}

impl LockManager {
    pub fn new(acquisition_timeout: Duration) -> Self {
        Self {
            locks: DashMap::new(),
            acquisition_timeout,
        }
    }

    fn lock_for(&self, key: &str) -> Arc<Mutex<()>> {
        self.locks
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .value()
            .clone()
    }

    pub async fn lock(&self, key: &str) -> Result<OwnedMutexGuard<()>> {
        let lock = self.lock_for(key);
        tokio::time::timeout(self.acquisition_timeout, lock.lock_owned())
            .await
            .map_err(|_| GridError::LockTimeout {
                key: key.to_string(),
                timeout_ms: self.acquisition_timeout.as_millis() as u64,
            })
    }

    /// Non-blocking acquisition; `None` if another invocation holds the key.
    pub fn try_lock(&self, key: &str) -> Option<OwnedMutexGuard<()>> {
        self.lock_for(key).try_lock_owned().ok()
    }

    pub fn is_locked(&self, key: &str) -> bool {
        self.locks
            .get(key)
            .is_some_and(|lock| lock.try_lock().is_err())
    }

    /// Forgets locks nobody holds or waits on.
    pub fn release_unused(&self) -> usize {
        let before = self.locks.len();
        self.locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        before - self.locks.len()
    }
}
