use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::common::{Lsn, QuireError, Result, TxnId};
use crate::log::{LogRecord, RecordType};
use crate::txn::TxnList;

/// Why a record is being handed to its handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryPass {
    /// Reapply unconditionally.
    Redo,
    /// Roll back unconditionally, as an abort does.
    Undo,
    /// Recovery's first pass: only file registrations are replayed.
    OpenFiles,
    /// Recovery's backward pass: roll back work of transactions not known
    /// to have committed.
    BackwardRoll,
    /// Recovery's forward pass: reapply work of committed transactions.
    ForwardRoll,
}

impl RecoveryPass {
    pub fn is_redo(self) -> bool {
        matches!(self, RecoveryPass::Redo | RecoveryPass::ForwardRoll)
    }

    pub fn is_undo(self) -> bool {
        matches!(self, RecoveryPass::Undo | RecoveryPass::BackwardRoll)
    }
}

impl fmt::Display for RecoveryPass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RecoveryPass::Redo => "redo",
            RecoveryPass::Undo => "undo",
            RecoveryPass::OpenFiles => "open files",
            RecoveryPass::BackwardRoll => "backward roll",
            RecoveryPass::ForwardRoll => "forward roll",
        };
        f.write_str(name)
    }
}

/// Applies or reverts one type of log record.
pub trait RecoveryHandler: Send + Sync {
    fn recover(
        &self,
        lsn: Lsn,
        record: &LogRecord,
        pass: RecoveryPass,
        txnlist: &mut TxnList,
    ) -> Result<()>;
}

/// Record-type to handler map, filled once when the environment opens.
#[derive(Default)]
pub struct Dispatcher {
    handlers: HashMap<RecordType, Arc<dyn RecoveryHandler>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs `handler` for `record_type`, replacing any earlier one.
    pub fn register(&mut self, record_type: RecordType, handler: Arc<dyn RecoveryHandler>) {
        self.handlers.insert(record_type, handler);
    }

    pub fn is_registered(&self, record_type: RecordType) -> bool {
        self.handlers.contains_key(&record_type)
    }

    /// Routes the record at `lsn` to its handler if `pass` applies to it,
    /// and returns the LSN of the previous record in the same transaction.
    pub fn dispatch(
        &self,
        lsn: Lsn,
        bytes: &[u8],
        pass: RecoveryPass,
        txnlist: &mut TxnList,
    ) -> Result<Lsn> {
        let record = LogRecord::decode(lsn, bytes)?;
        let record_type = record.record_type();
        txnlist.note_id(record.txn_id);
        let always = record_type == RecordType::FILE_REGISTER || record_type == RecordType::TXN_CKP;

        let call = match pass {
            RecoveryPass::Redo | RecoveryPass::Undo => true,
            RecoveryPass::OpenFiles => record_type < RecordType::TXN_BEGIN,
            RecoveryPass::BackwardRoll => {
                always || (record.txn_id != TxnId::NONE && !txnlist.find(record.txn_id))
            }
            RecoveryPass::ForwardRoll => {
                always || record.txn_id == TxnId::NONE || txnlist.find(record.txn_id)
            }
        };
        if call {
            let handler = self
                .handlers
                .get(&record_type)
                .ok_or(QuireError::UnknownRecordType(record_type.as_u32()))?;
            tracing::trace!(%lsn, %record_type, %pass, "dispatch");
            handler.recover(lsn, &record, pass, txnlist)?;
        }
        Ok(record.prev_lsn)
    }
}

#[cfg(test)]
mod tests {
    use parking_lot::Mutex;

    use super::*;
    use crate::log::RecordBody;

    #[derive(Default)]
    struct Recorder {
        calls: Mutex<Vec<(Lsn, RecoveryPass)>>,
    }

    impl RecoveryHandler for Recorder {
        fn recover(
            &self,
            lsn: Lsn,
            _record: &LogRecord,
            pass: RecoveryPass,
            _txnlist: &mut TxnList,
        ) -> Result<()> {
            self.calls.lock().push((lsn, pass));
            Ok(())
        }
    }

    fn commit(txn: u32, prev: u64) -> Vec<u8> {
        LogRecord::new(TxnId::new(txn), Lsn::new(prev), RecordBody::Commit { timestamp: 0 })
            .encode()
            .to_vec()
    }

    #[test]
    fn test_roll_passes_follow_txnlist() {
        let recorder = Arc::new(Recorder::default());
        let mut dispatcher = Dispatcher::new();
        dispatcher.register(RecordType::TXN_REGOP, recorder.clone());

        let mut txnlist = TxnList::new();
        txnlist.add(TxnId::new(0x8000_0001));
        let committed = commit(0x8000_0001, 40);
        let loser = commit(0x8000_0002, 0);

        let prev = dispatcher
            .dispatch(Lsn::new(100), &committed, RecoveryPass::BackwardRoll, &mut txnlist)
            .unwrap();
        assert_eq!(prev, Lsn::new(40));
        dispatcher
            .dispatch(Lsn::new(200), &loser, RecoveryPass::BackwardRoll, &mut txnlist)
            .unwrap();
        dispatcher
            .dispatch(Lsn::new(100), &committed, RecoveryPass::ForwardRoll, &mut txnlist)
            .unwrap();
        dispatcher
            .dispatch(Lsn::new(200), &loser, RecoveryPass::ForwardRoll, &mut txnlist)
            .unwrap();
        dispatcher
            .dispatch(Lsn::new(200), &loser, RecoveryPass::OpenFiles, &mut txnlist)
            .unwrap();

        assert_eq!(
            *recorder.calls.lock(),
            vec![
                (Lsn::new(200), RecoveryPass::BackwardRoll),
                (Lsn::new(100), RecoveryPass::ForwardRoll),
            ]
        );
    }

    #[test]
    fn test_unregistered_type() {
        let dispatcher = Dispatcher::new();
        let mut txnlist = TxnList::new();
        assert!(matches!(
            dispatcher.dispatch(Lsn::new(8), &commit(0x8000_0001, 0), RecoveryPass::Undo, &mut txnlist),
            Err(QuireError::UnknownRecordType(6))
        ));
    }
}
