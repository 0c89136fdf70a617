use std::fmt;
use std::ops::BitOr;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::{Mutex, MutexGuard};

use crate::buffer::{PageStore, SyncStatus};
use crate::common::{
    EnvConfig, LockerId, Lsn, QuireError, Result, TxnId, TXN_INVALID,
};
use crate::lock::LockManager;
use crate::log::{LogManager, LogQuery, LogRecord, PutFlags, RecordBody};
use crate::recovery::{Dispatcher, RecoveryPass};

use super::region::{DetailId, TxnDetail, TxnRegion, TxnStat, TxnStatus};
use super::{FamilyLsns, TxnList};

fn now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Behaviour flags for [`TxnManager::begin`] and [`TxnManager::commit`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TxnFlags {
    /// Do not force the log at commit.
    pub no_sync: bool,
    /// Force the log at commit even under an environment-wide no-sync policy.
    pub sync: bool,
    /// Fail lock requests instead of waiting.
    pub no_wait: bool,
}

impl TxnFlags {
    pub const NONE: TxnFlags = TxnFlags {
        no_sync: false,
        sync: false,
        no_wait: false,
    };
    pub const NOSYNC: TxnFlags = TxnFlags {
        no_sync: true,
        sync: false,
        no_wait: false,
    };
    pub const SYNC: TxnFlags = TxnFlags {
        no_sync: false,
        sync: true,
        no_wait: false,
    };
    pub const NOWAIT: TxnFlags = TxnFlags {
        no_sync: false,
        sync: false,
        no_wait: true,
    };

    fn validate(self) -> Result<()> {
        if self.no_sync && self.sync {
            return Err(QuireError::InvalidFlags("sync and no-sync are mutually exclusive"));
        }
        Ok(())
    }
}

impl BitOr for TxnFlags {
    type Output = TxnFlags;

    fn bitor(self, rhs: TxnFlags) -> TxnFlags {
        TxnFlags {
            no_sync: self.no_sync || rhs.no_sync,
            sync: self.sync || rhs.sync,
            no_wait: self.no_wait || rhs.no_wait,
        }
    }
}

/// Outcome of [`TxnManager::checkpoint`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckpointStatus {
    /// Pages are durable through `ckp_lsn`; `record_lsn` is the checkpoint
    /// record written, if logging is on.
    Completed { ckp_lsn: Lsn, record_lsn: Option<Lsn> },
    /// Neither threshold was reached.
    Skipped,
    /// Some pages could not be written yet; call again later.
    Incomplete,
}

#[derive(Debug, Default)]
struct TxnState {
    last_lsn: Lsn,
    kids: Vec<Txn>,
    /// A descendant logged its commit; this commit must force the log.
    must_flush: bool,
    /// Committed as a child; the parent decides its fate.
    child_commit: bool,
    no_sync: bool,
    sync: bool,
    ended: bool,
}

struct TxnInner {
    id: TxnId,
    detail: DetailId,
    parent: Option<Txn>,
    no_wait: bool,
    state: Mutex<TxnState>,
}

/// Handle to a transaction. Clones refer to the same transaction.
#[derive(Clone)]
pub struct Txn {
    inner: Arc<TxnInner>,
}

impl Txn {
    fn new(id: TxnId, detail: DetailId, parent: Option<Txn>, flags: TxnFlags) -> Self {
        Self {
            inner: Arc::new(TxnInner {
                id,
                detail,
                parent,
                no_wait: flags.no_wait,
                state: Mutex::new(TxnState {
                    no_sync: flags.no_sync,
                    sync: flags.sync,
                    ..TxnState::default()
                }),
            }),
        }
    }

    pub fn id(&self) -> TxnId {
        self.inner.id
    }

    pub fn parent(&self) -> Option<&Txn> {
        self.inner.parent.as_ref()
    }

    /// LSN of the newest record this transaction logged.
    pub fn last_lsn(&self) -> Lsn {
        self.state().last_lsn
    }

    pub(crate) fn set_last_lsn(&self, lsn: Lsn) {
        self.state().last_lsn = lsn;
    }

    pub fn no_wait(&self) -> bool {
        self.inner.no_wait
    }

    /// Whether any child is still unresolved.
    pub fn has_active_kids(&self) -> bool {
        self.state().kids.iter().any(|kid| !kid.child_committed())
    }

    /// Whether commit or abort has released this handle.
    pub fn is_ended(&self) -> bool {
        self.state().ended
    }

    pub(crate) fn kids(&self) -> Vec<Txn> {
        self.state().kids.clone()
    }

    fn child_committed(&self) -> bool {
        self.state().child_commit
    }

    fn state(&self) -> MutexGuard<'_, TxnState> {
        self.inner.state.lock()
    }
}

impl fmt::Debug for Txn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Txn")
            .field("id", &self.id())
            .field("parent", &self.parent().map(Txn::id))
            .finish()
    }
}

/// Begins and resolves nested transactions.
///
/// A transaction and its descendants form a family. Children commit into
/// their parent: their locks pass to the parent and their region record
/// stays until the root resolves. Aborting any member rolls back its
/// whole subtree, newest record first across every chain.
pub struct TxnManager {
    region: Mutex<TxnRegion>,
    /// Handles not yet freed, roots and children
    handles: Mutex<Vec<Txn>>,
    log: Option<Arc<dyn LogManager>>,
    locks: Arc<dyn LockManager>,
    store: Arc<dyn PageStore>,
    dispatcher: Arc<Dispatcher>,
    txn_nosync: bool,
}

impl TxnManager {
    /// `log` is `None` when the environment runs without logging.
    pub fn new(
        config: &EnvConfig,
        log: Option<Arc<dyn LogManager>>,
        locks: Arc<dyn LockManager>,
        store: Arc<dyn PageStore>,
        dispatcher: Arc<Dispatcher>,
    ) -> Result<Self> {
        let mut region = TxnRegion::new(config.max_txns);
        if let Some(log) = &log {
            match log.get(LogQuery::Checkpoint) {
                Ok((lsn, _)) => region.last_ckp = lsn,
                Err(QuireError::NotFound) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(Self {
            region: Mutex::new(region),
            handles: Mutex::new(Vec::new()),
            log,
            locks,
            store,
            dispatcher,
            txn_nosync: config.txn_nosync,
        })
    }

    pub fn begin(&self, parent: Option<&Txn>, flags: TxnFlags) -> Result<Txn> {
        flags.validate()?;
        if let Some(parent) = parent {
            self.check_status(parent, &[TxnStatus::Running], "running")?;
        }
        let begin_lsn = self.log.as_ref().map_or(Lsn::ZERO, |log| log.current_lsn());

        let (id, detail) = {
            let mut region = self.region.lock();
            if region.last_txnid.as_u32() >= TXN_INVALID.as_u32() - 1 {
                tracing::error!(last_txnid = %region.last_txnid, "transaction id space exhausted");
                return Err(QuireError::TxnIdWrap);
            }
            let id = TxnId::new(region.last_txnid.as_u32() + 1);
            let detail = region.alloc(TxnDetail {
                txn_id: id,
                begin_lsn,
                parent: parent.map(|p| p.inner.detail),
                status: TxnStatus::Running,
            })?;
            region.last_txnid = id;
            region.nbegins += 1;
            region.nactive += 1;
            region.maxnactive = region.maxnactive.max(region.nactive);
            (id, detail)
        };

        let txn = Txn::new(id, detail, parent.cloned(), flags);
        if let Some(parent) = parent {
            parent.state().kids.push(txn.clone());
            self.locks
                .add_family_member(LockerId::from(parent.id()), LockerId::from(id));
        }
        self.handles.lock().push(txn.clone());
        tracing::debug!(txn_id = %id, parent = ?parent.map(Txn::id), %begin_lsn, "begin");
        Ok(txn)
    }

    /// Current region status, or `None` once the handle has ended.
    pub fn status(&self, txn: &Txn) -> Option<TxnStatus> {
        if txn.is_ended() {
            return None;
        }
        self.region.lock().get(txn.inner.detail).map(|d| d.status)
    }

    fn check_status(&self, txn: &Txn, allowed: &[TxnStatus], expected: &'static str) -> Result<()> {
        match self.status(txn) {
            Some(status) if allowed.contains(&status) => Ok(()),
            status => Err(QuireError::InvalidTxnState {
                txn_id: txn.id(),
                status: status.map_or("ended", TxnStatus::as_str),
                expected,
            }),
        }
    }

    /// Whether the log write for `txn`'s outcome should be forced.
    fn should_flush(&self, txn: &Txn) -> bool {
        let state = txn.state();
        !((self.txn_nosync && !state.sync) || state.no_sync)
    }

    pub fn commit(&self, txn: &Txn, flags: TxnFlags) -> Result<()> {
        self.check_status(
            txn,
            &[TxnStatus::Running, TxnStatus::Prepared],
            "running or prepared",
        )?;
        flags.validate()?;
        {
            let mut state = txn.state();
            if flags.no_sync {
                state.sync = false;
                state.no_sync = true;
            }
            if flags.sync {
                state.no_sync = false;
                state.sync = true;
            }
        }

        for kid in txn.kids() {
            if !kid.child_committed() {
                self.commit(&kid, flags)?;
            }
        }

        if let Some(log) = &self.log {
            let (must_flush, last_lsn) = {
                let state = txn.state();
                (state.must_flush, state.last_lsn)
            };
            if must_flush || !last_lsn.is_zero() {
                let lsn = match txn.parent() {
                    None => {
                        let put = if self.should_flush(txn) {
                            PutFlags::FLUSH
                        } else {
                            PutFlags::NONE
                        };
                        let record = LogRecord::new(
                            txn.id(),
                            last_lsn,
                            RecordBody::Commit { timestamp: now() },
                        );
                        log.append(&record.encode(), put)?
                    }
                    Some(parent) => {
                        parent.state().must_flush = true;
                        let record = LogRecord::new(
                            txn.id(),
                            last_lsn,
                            RecordBody::ChildCommit { parent: parent.id() },
                        );
                        log.append(&record.encode(), PutFlags::NONE)?
                    }
                };
                txn.set_last_lsn(lsn);
            }
        }

        if txn.parent().is_none() {
            self.free_kids(txn);
        }
        self.end(txn, true)
    }

    /// Releases the region records and handles of every descendant of a
    /// committed root.
    fn free_kids(&self, txn: &Txn) {
        let mut pending = std::mem::take(&mut txn.state().kids);
        while let Some(kid) = pending.pop() {
            {
                let mut state = kid.state();
                pending.append(&mut state.kids);
                state.ended = true;
            }
            self.region.lock().free(kid.inner.detail);
            self.handles.lock().retain(|t| t.id() != kid.id());
        }
    }

    pub fn abort(&self, txn: &Txn) -> Result<()> {
        self.check_status(txn, &[TxnStatus::Running], "running")?;
        self.abort_family(txn)
    }

    fn abort_family(&self, txn: &Txn) -> Result<()> {
        if let Err(e) = self.undo(txn) {
            tracing::error!(txn_id = %txn.id(), error = %e, "undo failed");
            return Err(QuireError::RunRecovery(format!(
                "undo of transaction {} failed: {e}",
                txn.id()
            )));
        }
        self.end(txn, false)
    }

    /// Moves a running transaction to prepared, committing any unresolved
    /// children first.
    pub fn prepare(&self, txn: &Txn) -> Result<()> {
        self.check_status(txn, &[TxnStatus::Running], "running")?;
        for kid in txn.kids() {
            if !kid.child_committed() {
                self.commit(&kid, TxnFlags::NOSYNC)?;
            }
        }
        if let Some(log) = &self.log {
            let put = if self.should_flush(txn) {
                PutFlags::FLUSH
            } else {
                PutFlags::NONE
            };
            let record = LogRecord::new(txn.id(), txn.last_lsn(), RecordBody::Prepare);
            let lsn = log.append(&record.encode(), put)?;
            txn.set_last_lsn(lsn);
        }
        if let Some(detail) = self.region.lock().get_mut(txn.inner.detail) {
            detail.status = TxnStatus::Prepared;
        }
        tracing::debug!(txn_id = %txn.id(), "prepared");
        Ok(())
    }

    /// Shared tail of commit and abort.
    fn end(&self, txn: &Txn, committed: bool) -> Result<()> {
        let id = txn.id();
        if !committed {
            for kid in txn.kids() {
                self.end(&kid, false).map_err(|e| {
                    QuireError::RunRecovery(format!("ending child {} of {id}: {e}", kid.id()))
                })?;
            }
        }

        let locker = LockerId::from(id);
        let released = match txn.parent() {
            Some(parent) if committed => self.locks.inherit(locker, LockerId::from(parent.id())),
            _ => self.locks.release_all(locker),
        };
        if let Err(e) = released {
            if committed || !matches!(e, QuireError::Deadlock(_)) {
                tracing::error!(txn_id = %id, error = %e, "releasing locks failed");
                return Err(QuireError::RunRecovery(format!(
                    "releasing locks of {id}: {e}"
                )));
            }
        }

        let frees = txn.parent().is_none() || !committed;
        let already_committed = txn.child_committed();
        {
            let mut region = self.region.lock();
            if frees {
                region.free(txn.inner.detail);
            } else if let Some(detail) = region.get_mut(txn.inner.detail) {
                detail.status = TxnStatus::Committed;
            }
            if !already_committed {
                if committed {
                    region.ncommits += 1;
                } else {
                    region.naborts += 1;
                }
                region.nactive -= 1;
            }
        }
        if !frees {
            txn.state().child_commit = true;
        }

        if let Some(parent) = txn.parent() {
            self.locks.remove_family_member(locker);
            if !committed {
                parent.state().kids.retain(|kid| kid.id() != id);
            }
        }
        if frees {
            txn.state().ended = true;
            self.handles.lock().retain(|t| t.id() != id);
        }
        tracing::debug!(txn_id = %id, committed, "end");
        Ok(())
    }

    /// Rolls back every record of `txn`'s family, newest first.
    pub fn undo(&self, txn: &Txn) -> Result<()> {
        let Some(log) = &self.log else {
            return Ok(());
        };
        let mut txnlist = TxnList::new();
        let mut lsns = FamilyLsns::collect(txn);
        while let Some(lsn) = lsns.pop() {
            let (_, record) = log.get(LogQuery::Set(lsn))?;
            let prev = self
                .dispatcher
                .dispatch(lsn, &record, RecoveryPass::Undo, &mut txnlist)?;
            lsns.push(prev);
        }
        Ok(())
    }

    /// Makes pages durable through the oldest point recovery would need,
    /// then logs a checkpoint.
    ///
    /// With both thresholds zero the checkpoint is unconditional; otherwise
    /// it runs once `kbytes` of log have been written or `minutes` have
    /// passed since the last one.
    pub fn checkpoint(&self, kbytes: u32, minutes: u32) -> Result<CheckpointStatus> {
        if kbytes != 0 || minutes != 0 {
            let by_volume = kbytes != 0
                && self.log.as_ref().map_or(false, |log| {
                    log.bytes_since_checkpoint() >= u64::from(kbytes) * 1024
                });
            let by_time = minutes != 0
                && now().saturating_sub(self.region.lock().time_ckp) >= u64::from(minutes) * 60;
            if !by_volume && !by_time {
                tracing::debug!(kbytes, minutes, "checkpoint not due");
                return Ok(CheckpointStatus::Skipped);
            }
        }

        let ckp_lsn = {
            let mut region = self.region.lock();
            if region.pending_ckp.is_zero() {
                let mut ckp_lsn = self.log.as_ref().map_or(Lsn::ZERO, |log| log.current_lsn());
                if let Some(oldest) = region.min_begin_lsn() {
                    if oldest < ckp_lsn {
                        ckp_lsn = oldest;
                    }
                }
                region.pending_ckp = ckp_lsn;
                ckp_lsn
            } else {
                region.pending_ckp
            }
        };

        match self.store.sync_up_to(ckp_lsn) {
            Ok(SyncStatus::Done) => {}
            Ok(SyncStatus::Incomplete) => {
                tracing::debug!(%ckp_lsn, "checkpoint incomplete, pages still pinned");
                return Ok(CheckpointStatus::Incomplete);
            }
            Err(e) => {
                tracing::error!(%ckp_lsn, error = %e, "checkpoint failed to flush the buffer pool");
                return Err(e);
            }
        }

        let timestamp = now();
        let record_lsn = match &self.log {
            Some(log) => {
                let last_ckp = self.region.lock().last_ckp;
                let record = LogRecord::new(
                    TxnId::NONE,
                    Lsn::ZERO,
                    RecordBody::Checkpoint {
                        ckp_lsn,
                        last_ckp,
                        timestamp,
                    },
                );
                Some(log.append(&record.encode(), PutFlags::CHECKPOINT)?)
            }
            None => None,
        };
        {
            let mut region = self.region.lock();
            region.pending_ckp = Lsn::ZERO;
            if let Some(lsn) = record_lsn {
                region.last_ckp = lsn;
            }
            region.time_ckp = timestamp;
        }
        tracing::info!(%ckp_lsn, record = ?record_lsn, "checkpoint");
        Ok(CheckpointStatus::Completed {
            ckp_lsn,
            record_lsn,
        })
    }

    /// Whether `ancestor` is on the parent chain of `txn_id`. Both must be
    /// active.
    pub fn is_ancestor(&self, ancestor: TxnId, txn_id: TxnId) -> bool {
        let region = self.region.lock();
        match (region.find(ancestor), region.find(txn_id)) {
            (Some(ancestor), Some(txn)) => region.is_ancestor(ancestor, txn),
            _ => false,
        }
    }

    pub fn stat(&self) -> TxnStat {
        self.region.lock().stat()
    }

    /// Raises the id counter so ids seen in the log are not handed out
    /// again.
    pub fn restore_last_txnid(&self, txn_id: TxnId) {
        let mut region = self.region.lock();
        if txn_id > region.last_txnid {
            region.last_txnid = txn_id;
        }
    }

    /// Aborts every unresolved family and flushes the log. Returns the ids
    /// of the root transactions that had to be aborted.
    pub fn close(&self) -> Result<Vec<TxnId>> {
        let roots: Vec<Txn> = self
            .handles
            .lock()
            .iter()
            .filter(|t| t.parent().is_none())
            .cloned()
            .collect();

        let mut aborted = Vec::with_capacity(roots.len());
        let mut failure = None;
        for txn in roots {
            tracing::warn!(txn_id = %txn.id(), "closing with an unresolved transaction, aborting it");
            aborted.push(txn.id());
            if let Err(e) = self.abort_family(&txn) {
                tracing::error!(txn_id = %txn.id(), error = %e, "unable to abort transaction");
                failure.get_or_insert(e);
            }
        }
        if let Some(log) = &self.log {
            log.flush(Lsn::ZERO)?;
        }
        match failure {
            Some(e) => Err(e),
            None => Ok(aborted),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::BufferPoolManager;
    use crate::lock::LockTable;
    use crate::storage::disk::DiskManager;

    fn manager(max_txns: usize) -> (tempfile::TempDir, TxnManager) {
        let dir = tempfile::tempdir().unwrap();
        let dm = Arc::new(DiskManager::new(dir.path().join("txn.db")).unwrap());
        let store: Arc<dyn PageStore> = Arc::new(BufferPoolManager::new(8, 2, dm));
        let config = EnvConfig::default().with_logging(false).with_max_txns(max_txns);
        let mgr = TxnManager::new(
            &config,
            None,
            Arc::new(LockTable::new()),
            store.clone(),
            Arc::new(Dispatcher::with_builtin_handlers(store, dir.path())),
        )
        .unwrap();
        (dir, mgr)
    }

    #[test]
    fn test_ids_increase() {
        let (_dir, mgr) = manager(8);
        let a = mgr.begin(None, TxnFlags::NONE).unwrap();
        let b = mgr.begin(None, TxnFlags::NONE).unwrap();
        assert!(b.id() > a.id());
        assert!(a.id() > crate::common::TXN_MINIMUM);
    }

    #[test]
    fn test_conflicting_sync_flags() {
        let (_dir, mgr) = manager(8);
        assert!(matches!(
            mgr.begin(None, TxnFlags::SYNC | TxnFlags::NOSYNC),
            Err(QuireError::InvalidFlags(_))
        ));
        assert_eq!(mgr.stat().nbegins, 0);
    }

    #[test]
    fn test_child_commit_waits_for_parent() {
        let (_dir, mgr) = manager(8);
        let parent = mgr.begin(None, TxnFlags::NONE).unwrap();
        let child = mgr.begin(Some(&parent), TxnFlags::NONE).unwrap();
        assert!(parent.has_active_kids());

        mgr.commit(&child, TxnFlags::NONE).unwrap();
        assert!(!parent.has_active_kids());
        assert_eq!(mgr.status(&child), Some(TxnStatus::Committed));
        assert!(matches!(
            mgr.commit(&child, TxnFlags::NONE),
            Err(QuireError::InvalidTxnState { status: "committed", .. })
        ));

        mgr.commit(&parent, TxnFlags::NONE).unwrap();
        assert!(child.is_ended());
        let stat = mgr.stat();
        assert_eq!((stat.ncommits, stat.nactive), (2, 0));
        assert!(stat.active.is_empty());
    }

    #[test]
    fn test_abort_after_child_commit_counts_once() {
        let (_dir, mgr) = manager(8);
        let parent = mgr.begin(None, TxnFlags::NONE).unwrap();
        let child = mgr.begin(Some(&parent), TxnFlags::NONE).unwrap();
        mgr.commit(&child, TxnFlags::NONE).unwrap();
        mgr.abort(&parent).unwrap();

        let stat = mgr.stat();
        assert_eq!((stat.ncommits, stat.naborts, stat.nactive), (1, 1, 0));
        assert!(child.is_ended());
    }

    #[test]
    fn test_prepared_cannot_abort() {
        let (_dir, mgr) = manager(8);
        let txn = mgr.begin(None, TxnFlags::NONE).unwrap();
        mgr.prepare(&txn).unwrap();
        assert!(matches!(
            mgr.abort(&txn),
            Err(QuireError::InvalidTxnState { status: "prepared", .. })
        ));
        mgr.commit(&txn, TxnFlags::NONE).unwrap();
        assert!(matches!(
            mgr.commit(&txn, TxnFlags::NONE),
            Err(QuireError::InvalidTxnState { status: "ended", .. })
        ));
    }

    #[test]
    fn test_region_exhausted() {
        let (_dir, mgr) = manager(2);
        let _a = mgr.begin(None, TxnFlags::NONE).unwrap();
        let _b = mgr.begin(None, TxnFlags::NONE).unwrap();
        let last = mgr.stat().last_txnid;
        assert!(matches!(
            mgr.begin(None, TxnFlags::NONE),
            Err(QuireError::RegionExhausted(2))
        ));
        assert_eq!(mgr.stat().last_txnid, last);
    }

    #[test]
    fn test_id_wrap() {
        let (_dir, mgr) = manager(8);
        mgr.restore_last_txnid(TxnId::new(TXN_INVALID.as_u32() - 2));
        let txn = mgr.begin(None, TxnFlags::NONE).unwrap();
        assert_eq!(txn.id(), TxnId::new(TXN_INVALID.as_u32() - 1));
        assert!(matches!(
            mgr.begin(None, TxnFlags::NONE),
            Err(QuireError::TxnIdWrap)
        ));
    }

    #[test]
    fn test_ancestry() {
        let (_dir, mgr) = manager(8);
        let root = mgr.begin(None, TxnFlags::NONE).unwrap();
        let child = mgr.begin(Some(&root), TxnFlags::NONE).unwrap();
        let grandchild = mgr.begin(Some(&child), TxnFlags::NONE).unwrap();
        let other = mgr.begin(None, TxnFlags::NONE).unwrap();

        assert!(mgr.is_ancestor(root.id(), grandchild.id()));
        assert!(mgr.is_ancestor(child.id(), grandchild.id()));
        assert!(!mgr.is_ancestor(grandchild.id(), root.id()));
        assert!(!mgr.is_ancestor(other.id(), child.id()));
    }

    #[test]
    fn test_close_aborts_unresolved() {
        let (_dir, mgr) = manager(8);
        let root = mgr.begin(None, TxnFlags::NONE).unwrap();
        let _child = mgr.begin(Some(&root), TxnFlags::NONE).unwrap();
        let done = mgr.begin(None, TxnFlags::NONE).unwrap();
        mgr.commit(&done, TxnFlags::NONE).unwrap();

        assert_eq!(mgr.close().unwrap(), vec![root.id()]);
        assert_eq!(mgr.stat().nactive, 0);
    }
}
