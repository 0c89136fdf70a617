//! Page locks.
//!
//! Locks are taken per page on behalf of a [`LockerId`]: a transaction or a
//! standalone cursor. Lockers of one transaction family never block on
//! locks held by their ancestors.

mod guard;
mod lock_table;

pub use guard::*;
pub use lock_table::*;

use std::fmt;

use crate::common::{LockerId, PageId, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LockMode {
    Read,
    Write,
}

impl LockMode {
    pub fn conflicts_with(self, other: LockMode) -> bool {
        matches!((self, other), (LockMode::Write, _) | (_, LockMode::Write))
    }
}

impl fmt::Display for LockMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LockMode::Read => f.write_str("read"),
            LockMode::Write => f.write_str("write"),
        }
    }
}

/// A granted lock. Each grant is a distinct handle and must be released
/// once, either directly or through [`LockManager::release_all`].
#[derive(Debug, PartialEq, Eq)]
pub struct Lock {
    pub(crate) id: u64,
    pub(crate) page_id: PageId,
    pub(crate) mode: LockMode,
}

impl Lock {
    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    pub fn mode(&self) -> LockMode {
        self.mode
    }
}

/// Lock service consumed by the access methods and the transaction manager.
pub trait LockManager: Send + Sync {
    /// Hands out a locker id for work done outside any transaction.
    fn locker_id(&self) -> Result<LockerId>;

    /// Acquires `mode` on `page_id`, blocking unless `no_wait` is set. A
    /// request that would wait fails with `LockNotGranted` under `no_wait`
    /// and with `Deadlock` if waiting would close a cycle.
    fn acquire(&self, locker: LockerId, page_id: PageId, mode: LockMode, no_wait: bool)
        -> Result<Lock>;

    fn release(&self, lock: Lock) -> Result<()>;

    /// Releases every lock held by `locker`.
    fn release_all(&self, locker: LockerId) -> Result<()>;

    /// Hands every lock held by `locker` to `parent`.
    fn inherit(&self, locker: LockerId, parent: LockerId) -> Result<()>;

    /// Records `child` as a member of `parent`'s family.
    fn add_family_member(&self, parent: LockerId, child: LockerId);

    /// Forgets `locker`'s family link.
    fn remove_family_member(&self, locker: LockerId);
}
