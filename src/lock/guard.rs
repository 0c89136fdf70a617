use std::fmt;
use std::sync::Arc;

use crate::common::{PageId, Result};

use super::{Lock, LockManager, LockMode};

/// Owns one granted page lock for the duration of a search frame.
///
/// Dropping the guard gives the lock back, except under a transaction,
/// where locks are held until the transaction ends and the manager releases
/// the whole set.
pub struct LockGuard {
    lock: Option<Lock>,
    manager: Arc<dyn LockManager>,
    transactional: bool,
}

impl LockGuard {
    pub fn new(lock: Lock, manager: Arc<dyn LockManager>, transactional: bool) -> Self {
        Self {
            lock: Some(lock),
            manager,
            transactional,
        }
    }

    pub fn page_id(&self) -> Option<PageId> {
        self.lock.as_ref().map(Lock::page_id)
    }

    pub fn mode(&self) -> Option<LockMode> {
        self.lock.as_ref().map(Lock::mode)
    }

    /// Releases the lock now, transaction or not.
    pub fn release(mut self) -> Result<()> {
        match self.lock.take() {
            Some(lock) => self.manager.release(lock),
            None => Ok(()),
        }
    }

    /// Moves the lock out of the guard; the caller now owns its release.
    pub fn into_lock(mut self) -> Option<Lock> {
        self.lock.take()
    }
}

impl fmt::Debug for LockGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockGuard")
            .field("lock", &self.lock)
            .field("transactional", &self.transactional)
            .finish()
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if self.transactional {
            return;
        }
        if let Some(lock) = self.lock.take() {
            let page_id = lock.page_id();
            if let Err(e) = self.manager.release(lock) {
                tracing::warn!(%page_id, error = %e, "releasing page lock failed");
            }
        }
    }
}
