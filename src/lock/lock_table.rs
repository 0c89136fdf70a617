use std::collections::{HashMap, HashSet};

use parking_lot::{Condvar, Mutex};

use crate::common::{LockerId, PageId, QuireError, Result, TXN_MINIMUM};

use super::{Lock, LockManager, LockMode};

#[derive(Debug)]
struct Holding {
    id: u64,
    locker: LockerId,
    mode: LockMode,
}

#[derive(Debug, Default)]
struct TableState {
    pages: HashMap<PageId, Vec<Holding>>,
    /// child -> parent
    parents: HashMap<LockerId, LockerId>,
    /// Blocked locker -> lockers it waits on
    waits_for: HashMap<LockerId, Vec<LockerId>>,
    next_lock_id: u64,
    next_locker: u32,
}

impl TableState {
    fn is_ancestor(&self, candidate: LockerId, mut locker: LockerId) -> bool {
        while let Some(&parent) = self.parents.get(&locker) {
            if parent == candidate {
                return true;
            }
            locker = parent;
        }
        false
    }

    /// Lockers whose grants on `page_id` keep `locker` from getting `mode`.
    fn blockers(&self, locker: LockerId, page_id: PageId, mode: LockMode) -> Vec<LockerId> {
        let mut blockers: Vec<LockerId> = self
            .pages
            .get(&page_id)
            .into_iter()
            .flatten()
            .filter(|h| h.locker != locker && mode.conflicts_with(h.mode))
            .filter(|h| !self.is_ancestor(h.locker, locker))
            .map(|h| h.locker)
            .collect();
        blockers.sort_unstable();
        blockers.dedup();
        blockers
    }

    fn grant(&mut self, locker: LockerId, page_id: PageId, mode: LockMode) -> Lock {
        self.next_lock_id += 1;
        let id = self.next_lock_id;
        self.pages
            .entry(page_id)
            .or_default()
            .push(Holding { id, locker, mode });
        Lock { id, page_id, mode }
    }

    /// Whether `start` can reach itself through the waits-for graph.
    fn closes_cycle(&self, start: LockerId) -> bool {
        let mut visited = HashSet::new();
        let mut pending: Vec<LockerId> = self.waits_for.get(&start).cloned().unwrap_or_default();
        while let Some(locker) = pending.pop() {
            if locker == start {
                return true;
            }
            if visited.insert(locker) {
                if let Some(next) = self.waits_for.get(&locker) {
                    pending.extend(next.iter().copied());
                }
            }
        }
        false
    }
}

/// In-process lock table with blocking waits and waits-for deadlock
/// detection.
///
/// A locker never conflicts with itself or with its ancestors; each grant
/// is counted separately, so a locker may hold several grants on a page.
#[derive(Default)]
pub struct LockTable {
    state: Mutex<TableState>,
    released: Condvar,
}

impl LockTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of grants outstanding across all pages.
    pub fn num_locks(&self) -> usize {
        self.state.lock().pages.values().map(Vec::len).sum()
    }

    /// Number of grants `locker` holds.
    pub fn held_by(&self, locker: LockerId) -> usize {
        self.state
            .lock()
            .pages
            .values()
            .flatten()
            .filter(|h| h.locker == locker)
            .count()
    }
}

impl LockManager for LockTable {
    fn locker_id(&self) -> Result<LockerId> {
        let mut state = self.state.lock();
        state.next_locker += 1;
        if state.next_locker >= TXN_MINIMUM.as_u32() {
            state.next_locker = 1;
        }
        Ok(LockerId::new(state.next_locker))
    }

    fn acquire(
        &self,
        locker: LockerId,
        page_id: PageId,
        mode: LockMode,
        no_wait: bool,
    ) -> Result<Lock> {
        let mut state = self.state.lock();
        loop {
            let blockers = state.blockers(locker, page_id, mode);
            if blockers.is_empty() {
                state.waits_for.remove(&locker);
                return Ok(state.grant(locker, page_id, mode));
            }
            if no_wait {
                return Err(QuireError::LockNotGranted { locker, page_id });
            }

            state.waits_for.insert(locker, blockers);
            if state.closes_cycle(locker) {
                state.waits_for.remove(&locker);
                tracing::debug!(%locker, %page_id, %mode, "deadlock detected");
                return Err(QuireError::Deadlock(locker));
            }
            tracing::trace!(%locker, %page_id, %mode, "waiting for lock");
            self.released.wait(&mut state);
        }
    }

    fn release(&self, lock: Lock) -> Result<()> {
        let mut state = self.state.lock();
        let holdings = state
            .pages
            .get_mut(&lock.page_id)
            .ok_or_else(|| QuireError::LockNotHeld(format!("{} on {}", lock.mode, lock.page_id)))?;
        let position = holdings
            .iter()
            .position(|h| h.id == lock.id)
            .ok_or_else(|| QuireError::LockNotHeld(format!("{} on {}", lock.mode, lock.page_id)))?;
        holdings.swap_remove(position);
        if holdings.is_empty() {
            state.pages.remove(&lock.page_id);
        }
        self.released.notify_all();
        Ok(())
    }

    fn release_all(&self, locker: LockerId) -> Result<()> {
        let mut state = self.state.lock();
        state.pages.retain(|_, holdings| {
            holdings.retain(|h| h.locker != locker);
            !holdings.is_empty()
        });
        state.waits_for.remove(&locker);
        self.released.notify_all();
        Ok(())
    }

    fn inherit(&self, locker: LockerId, parent: LockerId) -> Result<()> {
        let mut state = self.state.lock();
        for holding in state.pages.values_mut().flatten() {
            if holding.locker == locker {
                holding.locker = parent;
            }
        }
        self.released.notify_all();
        Ok(())
    }

    fn add_family_member(&self, parent: LockerId, child: LockerId) {
        self.state.lock().parents.insert(child, parent);
    }

    fn remove_family_member(&self, locker: LockerId) {
        let mut state = self.state.lock();
        state.parents.remove(&locker);
        self.released.notify_all();
    }
}
