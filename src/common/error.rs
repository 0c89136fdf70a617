use thiserror::Error;

use super::types::{LockerId, Lsn, PageId, TxnId};

/// Database error types
#[derive(Error, Debug)]
pub enum QuireError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Page {0} not found")]
    PageNotFound(PageId),

    #[error("Buffer pool is full, no evictable frames available")]
    BufferPoolFull,

    #[error("Invalid page ID: {0}")]
    InvalidPageId(PageId),

    #[error("Disk scheduler error: {0}")]
    DiskScheduler(String),

    #[error("Page {0} is full")]
    PageFull(PageId),

    #[error("Record not found")]
    NotFound,

    #[error("Page {page_id}: unrecognized page type {page_type}")]
    PageFormat { page_id: PageId, page_type: u8 },

    #[error("Transaction region exhausted: {0} transactions active")]
    RegionExhausted(usize),

    #[error("Deadlock detected for {0}")]
    Deadlock(LockerId),

    #[error("Lock on {page_id} not granted to {locker}")]
    LockNotGranted { locker: LockerId, page_id: PageId },

    #[error("Lock not held: {0}")]
    LockNotHeld(String),

    #[error("Transaction {txn_id} is {status}, operation requires {expected}")]
    InvalidTxnState {
        txn_id: TxnId,
        status: &'static str,
        expected: &'static str,
    },

    #[error("Invalid flag combination: {0}")]
    InvalidFlags(&'static str),

    #[error("Transaction ID wrapping: snapshot the database and start a new log")]
    TxnIdWrap,

    #[error("Fatal error, run database recovery: {0}")]
    RunRecovery(String),

    #[error("Log corrupted at {lsn}: {reason}")]
    LogCorrupted { lsn: Lsn, reason: String },

    #[error("No log record at {0}")]
    LogRecordNotFound(Lsn),

    #[error("No log records")]
    NoLogRecords,

    #[error("No recovery handler registered for record type {0}")]
    UnknownRecordType(u32),

    #[error("Page {page_id}: cached record count {cached}, subtree holds {actual}")]
    CountMismatch {
        page_id: PageId,
        cached: u32,
        actual: u32,
    },
}

impl QuireError {
    /// Deadlock-class failures: the caller is expected to abort and retry
    /// the enclosing transaction.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            QuireError::Deadlock(_) | QuireError::LockNotGranted { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, QuireError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deadlock_class_is_retryable() {
        assert!(QuireError::Deadlock(LockerId::new(7)).is_retryable());
        assert!(QuireError::LockNotGranted {
            locker: LockerId::new(7),
            page_id: PageId::new(1),
        }
        .is_retryable());
        assert!(!QuireError::NotFound.is_retryable());
        assert!(!QuireError::TxnIdWrap.is_retryable());
    }

    #[test]
    fn test_error_display() {
        let err = QuireError::PageFormat {
            page_id: PageId::new(3),
            page_type: 99,
        };
        assert_eq!(err.to_string(), "Page PageId(3): unrecognized page type 99");
    }
}
