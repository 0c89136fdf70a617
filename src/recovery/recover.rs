use crate::common::{Lsn, QuireError, Result, TxnId};
use crate::log::{find_checkpoint, LogManager, LogQuery, RecordType};
use crate::txn::{CheckpointStatus, TxnList, TxnManager};

use super::{Dispatcher, RecoveryPass};

/// File id the environment registers its data file under.
pub const DATA_FILE_ID: u32 = 0;

/// What one recovery run did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    /// First record replayed; zero when the log was empty.
    pub start_lsn: Lsn,
    /// Records examined by the backward pass.
    pub records: usize,
    /// Registered files that were missing with changes still pending.
    pub missing_files: Vec<String>,
    /// Largest transaction id found in the replayed log.
    pub max_txn_id: Option<TxnId>,
    /// The checkpoint taken once the log was replayed.
    pub checkpoint: Option<CheckpointStatus>,
}

fn is_page_change(record_type: RecordType) -> bool {
    record_type >= RecordType::COUNT_ADJUST
}

/// Brings the pages back in line with the log after a crash.
///
/// Starting from the checkpoint [`find_checkpoint`] picks, file
/// registrations are replayed first, then the log is walked backward
/// rolling back every transaction without a commit record, then forward
/// again reapplying the committed ones. Finishes with a checkpoint so the
/// next run starts later.
pub fn recover(
    log: &dyn LogManager,
    dispatcher: &Dispatcher,
    txns: &TxnManager,
    verbose: bool,
) -> Result<RecoveryReport> {
    let start_lsn = match find_checkpoint(log, verbose) {
        Ok(lsn) => lsn,
        Err(QuireError::NoLogRecords) => {
            tracing::info!("log is empty, nothing to recover");
            return Ok(RecoveryReport::default());
        }
        Err(e) => return Err(e),
    };
    tracing::info!(start = %start_lsn, "recovery starting");

    let mut txnlist = TxnList::new();
    forward(log, start_lsn, |lsn, bytes| {
        dispatcher.dispatch(lsn, bytes, RecoveryPass::OpenFiles, &mut txnlist)?;
        Ok(())
    })?;
    let data_missing = txnlist
        .files()
        .iter()
        .any(|f| f.file_id == Some(DATA_FILE_ID) && !f.deleted);

    let mut records = 0;
    let mut skipped = 0;
    let mut lsn = last_lsn(log)?;
    while lsn >= start_lsn {
        let (_, bytes) = log.get(LogQuery::Set(lsn))?;
        records += 1;
        if data_missing && is_page_change(RecordType::of(&bytes)?) {
            skipped += 1;
        } else {
            dispatcher.dispatch(lsn, &bytes, RecoveryPass::BackwardRoll, &mut txnlist)?;
        }
        lsn = match log.get(LogQuery::Prev(lsn)) {
            Ok((prev, _)) => prev,
            Err(QuireError::NotFound) => break,
            Err(e) => return Err(e),
        };
    }
    if data_missing {
        txnlist.close_file(DATA_FILE_ID, skipped);
    }
    tracing::debug!(records, "backward pass done");

    forward(log, start_lsn, |lsn, bytes| {
        if data_missing && is_page_change(RecordType::of(bytes)?) {
            return Ok(());
        }
        dispatcher.dispatch(lsn, bytes, RecoveryPass::ForwardRoll, &mut txnlist)?;
        Ok(())
    })?;

    let max_txn_id = txnlist.max_id();
    let missing_files = txnlist.end();
    if let Some(max) = max_txn_id {
        txns.restore_last_txnid(max);
    }
    let checkpoint = txns.checkpoint(0, 0)?;
    tracing::info!(
        start = %start_lsn,
        records,
        max_txn_id = ?max_txn_id,
        "recovery complete"
    );
    Ok(RecoveryReport {
        start_lsn,
        records,
        missing_files,
        max_txn_id,
        checkpoint: Some(checkpoint),
    })
}

fn last_lsn(log: &dyn LogManager) -> Result<Lsn> {
    match log.get(LogQuery::Last) {
        Ok((lsn, _)) => Ok(lsn),
        Err(QuireError::NotFound) => Err(QuireError::NoLogRecords),
        Err(e) => Err(e),
    }
}

fn forward<F>(log: &dyn LogManager, start: Lsn, mut visit: F) -> Result<()>
where
    F: FnMut(Lsn, &[u8]) -> Result<()>,
{
    let (mut lsn, mut bytes) = log.get(LogQuery::Set(start))?;
    loop {
        visit(lsn, &bytes)?;
        match log.get(LogQuery::Next(lsn)) {
            Ok((next, next_bytes)) => {
                lsn = next;
                bytes = next_bytes;
            }
            Err(QuireError::NotFound) => return Ok(()),
            Err(e) => return Err(e),
        }
    }
}
