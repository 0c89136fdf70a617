use std::collections::BinaryHeap;

use crate::common::Lsn;

use super::Txn;

/// The undo frontier of a transaction family: one LSN per log chain still
/// to be rolled back, always taken newest first so records of parents and
/// children interleave in the reverse of their log order.
#[derive(Debug, Default)]
pub struct FamilyLsns {
    heap: BinaryHeap<Lsn>,
}

impl FamilyLsns {
    /// Gathers the last LSN of `txn` and of every descendant still linked
    /// to it, committed or not.
    pub fn collect(txn: &Txn) -> Self {
        let mut lsns = Self::default();
        let mut pending = vec![txn.clone()];
        while let Some(member) = pending.pop() {
            lsns.push(member.last_lsn());
            pending.extend(member.kids());
        }
        lsns
    }

    /// Adds a chain; null LSNs mark exhausted chains and are dropped.
    pub fn push(&mut self, lsn: Lsn) {
        if !lsn.is_zero() {
            self.heap.push(lsn);
        }
    }

    /// Newest LSN across every chain, if any remain.
    pub fn pop(&mut self) -> Option<Lsn> {
        self.heap.pop()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}
