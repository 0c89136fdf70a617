use std::fmt;

use crate::common::{Lsn, QuireError, Result, TxnId, TXN_MINIMUM};

/// Index of a detail record in the region arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DetailId(usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxnStatus {
    Running,
    Prepared,
    /// A child that committed; its fate rests with its ancestors.
    Committed,
}

impl TxnStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TxnStatus::Running => "running",
            TxnStatus::Prepared => "prepared",
            TxnStatus::Committed => "committed",
        }
    }
}

impl fmt::Display for TxnStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Region-resident state of one transaction.
#[derive(Debug, Clone)]
pub struct TxnDetail {
    pub txn_id: TxnId,
    pub begin_lsn: Lsn,
    pub parent: Option<DetailId>,
    pub status: TxnStatus,
}

/// Per-active-transaction line of [`TxnStat`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveTxn {
    pub txn_id: TxnId,
    pub begin_lsn: Lsn,
}

/// Snapshot of the region counters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxnStat {
    pub last_txnid: TxnId,
    pub last_ckp: Lsn,
    pub pending_ckp: Lsn,
    /// Seconds since the epoch of the last checkpoint; 0 if none
    pub time_ckp: u64,
    pub nbegins: u64,
    pub ncommits: u64,
    pub naborts: u64,
    pub nactive: u32,
    pub maxnactive: u32,
    pub active: Vec<ActiveTxn>,
}

/// Shared transaction state: an arena of detail records plus the
/// counters every begin, end and checkpoint updates. Always accessed under
/// the manager's region lock.
#[derive(Debug)]
pub struct TxnRegion {
    details: Vec<Option<TxnDetail>>,
    free: Vec<usize>,
    /// Details in begin order
    active: Vec<DetailId>,
    capacity: usize,

    pub last_txnid: TxnId,
    pub last_ckp: Lsn,
    pub pending_ckp: Lsn,
    pub time_ckp: u64,
    pub nbegins: u64,
    pub ncommits: u64,
    pub naborts: u64,
    pub nactive: u32,
    pub maxnactive: u32,
}

impl TxnRegion {
    pub fn new(capacity: usize) -> Self {
        Self {
            details: Vec::new(),
            free: Vec::new(),
            active: Vec::new(),
            capacity,
            last_txnid: TXN_MINIMUM,
            last_ckp: Lsn::ZERO,
            pending_ckp: Lsn::ZERO,
            time_ckp: 0,
            nbegins: 0,
            ncommits: 0,
            naborts: 0,
            nactive: 0,
            maxnactive: 0,
        }
    }

    /// Stores a detail record and links it on the active list.
    pub fn alloc(&mut self, detail: TxnDetail) -> Result<DetailId> {
        if self.active.len() >= self.capacity {
            return Err(QuireError::RegionExhausted(self.active.len()));
        }
        let id = match self.free.pop() {
            Some(slot) => {
                self.details[slot] = Some(detail);
                DetailId(slot)
            }
            None => {
                self.details.push(Some(detail));
                DetailId(self.details.len() - 1)
            }
        };
        self.active.push(id);
        Ok(id)
    }

    /// Unlinks and drops a detail record.
    pub fn free(&mut self, id: DetailId) {
        if self.details.get_mut(id.0).and_then(Option::take).is_some() {
            self.active.retain(|&a| a != id);
            self.free.push(id.0);
        }
    }

    pub fn get(&self, id: DetailId) -> Option<&TxnDetail> {
        self.details.get(id.0).and_then(Option::as_ref)
    }

    pub fn get_mut(&mut self, id: DetailId) -> Option<&mut TxnDetail> {
        self.details.get_mut(id.0).and_then(Option::as_mut)
    }

    pub fn find(&self, txn_id: TxnId) -> Option<DetailId> {
        self.active
            .iter()
            .copied()
            .find(|&id| self.get(id).map_or(false, |d| d.txn_id == txn_id))
    }

    /// Whether `ancestor` is on the parent chain of `id`.
    pub fn is_ancestor(&self, ancestor: DetailId, id: DetailId) -> bool {
        let mut current = self.get(id).and_then(|d| d.parent);
        while let Some(parent) = current {
            if parent == ancestor {
                return true;
            }
            current = self.get(parent).and_then(|d| d.parent);
        }
        false
    }

    /// Oldest non-zero begin LSN among the active details.
    pub fn min_begin_lsn(&self) -> Option<Lsn> {
        self.active
            .iter()
            .filter_map(|&id| self.get(id))
            .map(|d| d.begin_lsn)
            .filter(|lsn| !lsn.is_zero())
            .min()
    }

    pub fn len(&self) -> usize {
        self.active.len()
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }

    pub fn stat(&self) -> TxnStat {
        TxnStat {
            last_txnid: self.last_txnid,
            last_ckp: self.last_ckp,
            pending_ckp: self.pending_ckp,
            time_ckp: self.time_ckp,
            nbegins: self.nbegins,
            ncommits: self.ncommits,
            naborts: self.naborts,
            nactive: self.nactive,
            maxnactive: self.maxnactive,
            active: self
                .active
                .iter()
                .filter_map(|&id| self.get(id))
                .filter(|d| d.status != TxnStatus::Committed)
                .map(|d| ActiveTxn {
                    txn_id: d.txn_id,
                    begin_lsn: d.begin_lsn,
                })
                .collect(),
        }
    }
}
