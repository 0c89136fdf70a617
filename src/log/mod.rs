//! Write-ahead log.
//!
//! The log is an append-only sequence of records addressed by [`Lsn`]. Pages
//! and transactions refer to it only through the [`LogManager`] trait; the
//! crate ships one file-backed implementation, [`LogFile`].

mod findckp;
mod log_file;
mod record;

pub use findckp::*;
pub use log_file::*;
pub use record::*;

use crate::common::{Lsn, Result};

/// Options for [`LogManager::append`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PutFlags {
    /// Force the log to stable storage through this record before returning.
    pub flush: bool,
    /// Remember this record as the most recent checkpoint.
    pub checkpoint: bool,
}

impl PutFlags {
    pub const NONE: PutFlags = PutFlags {
        flush: false,
        checkpoint: false,
    };
    pub const FLUSH: PutFlags = PutFlags {
        flush: true,
        checkpoint: false,
    };
    pub const CHECKPOINT: PutFlags = PutFlags {
        flush: true,
        checkpoint: true,
    };
}

/// Positioning for [`LogManager::get`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogQuery {
    /// The record starting exactly at this LSN.
    Set(Lsn),
    First,
    Last,
    /// The record following the one at this LSN.
    Next(Lsn),
    /// The record preceding the one at this LSN.
    Prev(Lsn),
    /// The most recent record appended with [`PutFlags::checkpoint`].
    Checkpoint,
}

/// Append-only durable record log.
///
/// Positional queries that run off either end of the log, and a checkpoint
/// query on a log without checkpoints, return [`QuireError::NotFound`].
/// A `Set` query on an LSN where no record starts returns
/// [`QuireError::LogRecordNotFound`].
///
/// [`QuireError::NotFound`]: crate::common::QuireError::NotFound
/// [`QuireError::LogRecordNotFound`]: crate::common::QuireError::LogRecordNotFound
pub trait LogManager: Send + Sync {
    /// Appends a record and returns its LSN.
    fn append(&self, record: &[u8], flags: PutFlags) -> Result<Lsn>;

    /// Reads a record, returning its LSN alongside its bytes.
    fn get(&self, query: LogQuery) -> Result<(Lsn, Vec<u8>)>;

    /// LSN the next appended record will receive.
    fn current_lsn(&self) -> Lsn;

    /// Forces every record up to and including `lsn` to stable storage.
    fn flush(&self, lsn: Lsn) -> Result<()>;

    /// Bytes appended since the last checkpoint record.
    fn bytes_since_checkpoint(&self) -> u64;
}
