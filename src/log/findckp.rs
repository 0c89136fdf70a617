use crate::common::{Lsn, QuireError, Result};

use super::{LogManager, LogQuery, LogRecord, RecordBody};

/// Finds the LSN recovery must start from.
///
/// Walks the checkpoint chain backward from the most recent checkpoint
/// until it reaches a checkpoint that lies before the most recent one's
/// checkpoint LSN. At least two checkpoints are always considered, since
/// the newest one may have been written while files were still being
/// opened. With fewer than two usable checkpoints the answer is the first
/// record of the log.
pub fn find_checkpoint(log: &dyn LogManager, verbose: bool) -> Result<Lsn> {
    let final_ckp = match log.get(LogQuery::Checkpoint) {
        Ok((lsn, _)) => lsn,
        Err(QuireError::NotFound) => return first_record(log),
        Err(e) => return Err(e),
    };

    let mut ckp_lsn = Lsn::ZERO;
    let mut last_ckp;
    let mut next_lsn = final_ckp;
    loop {
        let (lsn, bytes) = log.get(LogQuery::Set(next_lsn))?;
        let (this_ckp_lsn, prev_ckp) = match LogRecord::decode(lsn, &bytes)?.body {
            RecordBody::Checkpoint {
                ckp_lsn, last_ckp, ..
            } => (ckp_lsn, last_ckp),
            other => {
                return Err(QuireError::LogCorrupted {
                    lsn,
                    reason: format!("expected a checkpoint, found {}", other.record_type()),
                })
            }
        };
        if ckp_lsn.is_zero() {
            ckp_lsn = this_ckp_lsn;
        }
        if verbose {
            tracing::info!(
                at = %next_lsn,
                ckp_lsn = %this_ckp_lsn,
                previous = %prev_ckp,
                "checkpoint"
            );
        }
        last_ckp = next_lsn;
        next_lsn = prev_ckp;

        let keep_going = last_ckp > ckp_lsn || last_ckp == final_ckp;
        if next_lsn.is_zero() || !keep_going {
            break;
        }
    }

    if last_ckp >= ckp_lsn || last_ckp == final_ckp {
        return first_record(log);
    }
    tracing::debug!(start = %last_ckp, ckp_lsn = %ckp_lsn, "recovery start found");
    Ok(last_ckp)
}

fn first_record(log: &dyn LogManager) -> Result<Lsn> {
    match log.get(LogQuery::First) {
        Ok((lsn, _)) if !lsn.is_zero() => Ok(lsn),
        Ok(_) | Err(QuireError::NotFound) => Err(QuireError::NoLogRecords),
        Err(e) => Err(e),
    }
}
