use std::ops::BitOr;

use crate::buffer::PinnedPage;
use crate::common::{LockerId, Lsn, PageId, Result, TxnId};
use crate::lock::{LockGuard, LockMode};
use crate::log::{LogManager, LogRecord, PutFlags, RecordBody};
use crate::txn::Txn;

use super::RecnoTree;

/// Flags steering a record-number search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SearchFlags(u32);

impl SearchFlags {
    pub const READ: SearchFlags = SearchFlags(0x01);
    /// Write-lock the pages that end up on the stack.
    pub const WRITE: SearchFlags = SearchFlags(0x02);
    /// Stop at the level passed as `stop`.
    pub const PARENT: SearchFlags = SearchFlags(0x04);
    /// Write-lock and keep every page from the root down.
    pub const STACK: SearchFlags = SearchFlags(0x08);
    /// Target the position just past the last record.
    pub const APPEND: SearchFlags = SearchFlags(0x10);
    /// Allow a target one past the last record.
    pub const PAST_EOF: SearchFlags = SearchFlags(0x20);

    pub const INSERT: SearchFlags = SearchFlags(0x02 | 0x08 | 0x20);
    pub const DELETE: SearchFlags = SearchFlags(0x02 | 0x08);

    pub fn contains(self, other: SearchFlags) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for SearchFlags {
    type Output = SearchFlags;

    fn bitor(self, rhs: SearchFlags) -> SearchFlags {
        SearchFlags(self.0 | rhs.0)
    }
}

/// One level of a search path: the pinned page, the entry followed (or
/// the target slot, on the last frame) and the lock that covers it.
#[derive(Debug)]
pub struct StackFrame {
    pub page: PinnedPage,
    pub indx: usize,
    pub lock: LockGuard,
}

impl StackFrame {
    pub fn page_id(&self) -> PageId {
        self.page.page_id()
    }
}

/// A position in a record-number tree, owned by one thread.
///
/// The cursor owns the search stack. Frames are pushed root first and
/// released leaf first; dropping the cursor releases whatever is left.
pub struct Cursor<'a> {
    pub(crate) tree: &'a RecnoTree,
    pub(crate) txn: Option<&'a Txn>,
    locker: LockerId,
    pub(crate) stack: Vec<StackFrame>,
}

impl<'a> Cursor<'a> {
    pub(crate) fn new(tree: &'a RecnoTree, txn: Option<&'a Txn>) -> Result<Self> {
        let locker = match txn {
            Some(txn) => LockerId::from(txn.id()),
            None => tree.locks().locker_id()?,
        };
        Ok(Self {
            tree,
            txn,
            locker,
            stack: Vec::new(),
        })
    }

    pub fn locker(&self) -> LockerId {
        self.locker
    }

    pub fn stack(&self) -> &[StackFrame] {
        &self.stack
    }

    /// The frame the last search stopped at.
    pub fn top(&self) -> Option<&StackFrame> {
        self.stack.last()
    }

    pub(crate) fn top_mut(&mut self) -> Option<&mut StackFrame> {
        self.stack.last_mut()
    }

    pub(crate) fn lock_page(&self, page_id: PageId, mode: LockMode) -> Result<LockGuard> {
        let no_wait = self.txn.map_or(false, Txn::no_wait);
        let lock = self
            .tree
            .locks()
            .acquire(self.locker, page_id, mode, no_wait)?;
        Ok(LockGuard::new(
            lock,
            self.tree.locks().clone(),
            self.txn.is_some(),
        ))
    }

    pub(crate) fn push(&mut self, page: PinnedPage, indx: usize, lock: LockGuard) {
        self.stack.push(StackFrame { page, indx, lock });
    }

    /// Pops every frame, unpinning pages and giving back locks.
    pub fn release_stack(&mut self) {
        while let Some(frame) = self.stack.pop() {
            drop(frame);
        }
    }

    /// Writes a page-change record on behalf of the cursor's transaction.
    /// Returns `None` when the tree is not logged.
    pub(crate) fn log(&self, body: RecordBody) -> Result<Option<Lsn>> {
        log_change(self.tree.log(), self.txn, body)
    }
}

impl Drop for Cursor<'_> {
    fn drop(&mut self) {
        self.release_stack();
    }
}

/// Appends `body` to the log chained onto `txn`'s previous record.
pub(crate) fn log_change(
    log: Option<&dyn LogManager>,
    txn: Option<&Txn>,
    body: RecordBody,
) -> Result<Option<Lsn>> {
    let Some(log) = log else {
        return Ok(None);
    };
    let (txn_id, prev_lsn) = match txn {
        Some(txn) => (txn.id(), txn.last_lsn()),
        None => (TxnId::NONE, Lsn::ZERO),
    };
    let record = LogRecord::new(txn_id, prev_lsn, body);
    let lsn = log.append(&record.encode(), PutFlags::NONE)?;
    if let Some(txn) = txn {
        txn.set_last_lsn(lsn);
    }
    Ok(Some(lsn))
}
