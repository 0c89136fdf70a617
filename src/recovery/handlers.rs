use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::buffer::PageStore;
use crate::common::{Lsn, PageId, QuireError, Result};
use crate::index::{PageView, PageViewMut};
use crate::log::{CountAdjust, LeafItem, LogRecord, RecordBody, RecordType};
use crate::txn::TxnList;

use super::{Dispatcher, RecoveryHandler, RecoveryPass};

impl Dispatcher {
    /// A dispatcher with every record type this crate writes registered.
    /// `dir` is where registered files are looked up.
    pub fn with_builtin_handlers(store: Arc<dyn PageStore>, dir: &Path) -> Self {
        let mut dispatcher = Dispatcher::new();
        let pages: Arc<dyn RecoveryHandler> = Arc::new(PageHandler::new(store));
        dispatcher.register(RecordType::COUNT_ADJUST, pages.clone());
        dispatcher.register(RecordType::LEAF_INSERT, pages.clone());
        dispatcher.register(RecordType::LEAF_DELETE, pages);

        let txns: Arc<dyn RecoveryHandler> = Arc::new(TxnHandler);
        for record_type in [
            RecordType::TXN_REGOP,
            RecordType::TXN_CHILD,
            RecordType::TXN_PREPARE,
            RecordType::TXN_CKP,
        ] {
            dispatcher.register(record_type, txns.clone());
        }
        dispatcher.register(
            RecordType::FILE_REGISTER,
            Arc::new(FileRegisterHandler::new(dir)),
        );
        dispatcher
    }
}

fn slot_error(lsn: Lsn, page_id: PageId, indx: u16, num: u16) -> QuireError {
    QuireError::LogCorrupted {
        lsn,
        reason: format!("slot {indx} out of range on {page_id} with {num} entries"),
    }
}

/// Replays count adjustments and leaf changes.
///
/// A change is redone only when the page still carries the LSN it had
/// before the change, and undone only when it carries the change's own
/// LSN, so replaying a record twice is harmless.
pub struct PageHandler {
    store: Arc<dyn PageStore>,
}

impl PageHandler {
    pub fn new(store: Arc<dyn PageStore>) -> Self {
        Self { store }
    }

    fn apply<R, U>(
        &self,
        page_id: PageId,
        before: Lsn,
        lsn: Lsn,
        pass: RecoveryPass,
        redo: R,
        undo: U,
    ) -> Result<()>
    where
        R: FnOnce(&mut PageViewMut<'_>) -> Result<()>,
        U: FnOnce(&mut PageViewMut<'_>) -> Result<()>,
    {
        let mut page = self.store.fetch(page_id)?;
        let page_lsn = PageView::new(&page.data()[..]).lsn();
        if pass.is_redo() && page_lsn == before {
            let mut data = page.data_mut();
            let mut view = PageViewMut::new(&mut data[..]);
            redo(&mut view)?;
            view.set_lsn(lsn);
        } else if pass.is_undo() && page_lsn == lsn {
            let mut data = page.data_mut();
            let mut view = PageViewMut::new(&mut data[..]);
            undo(&mut view)?;
            view.set_lsn(before);
        }
        Ok(())
    }

    fn count_adjust(&self, lsn: Lsn, change: &CountAdjust, pass: RecoveryPass) -> Result<()> {
        let indx = change.indx;
        let check = move |view: &PageViewMut<'_>| {
            let num = view.view().num_entries();
            if indx >= num {
                return Err(slot_error(lsn, change.page_id, indx, num));
            }
            Ok(())
        };
        let shift = move |view: &mut PageViewMut<'_>, adjust: i32| -> Result<()> {
            check(view)?;
            view.adjust_internal_nrecs(indx as usize, adjust);
            if change.root {
                view.adjust_root_nrecs(adjust);
            }
            Ok(())
        };
        self.apply(
            change.page_id,
            change.page_lsn,
            lsn,
            pass,
            |view| shift(view, change.adjust),
            |view| shift(view, -change.adjust),
        )
    }

    fn leaf_insert(&self, lsn: Lsn, item: &LeafItem, pass: RecoveryPass) -> Result<()> {
        let indx = item.indx;
        self.apply(
            item.page_id,
            item.page_lsn,
            lsn,
            pass,
            |view| {
                let num = view.view().num_entries();
                if indx > num {
                    return Err(slot_error(lsn, item.page_id, indx, num));
                }
                view.insert_leaf(indx as usize, &item.key, &item.data, false)
            },
            |view| remove_slot(view, lsn, item),
        )
    }

    fn leaf_delete(&self, lsn: Lsn, item: &LeafItem, pass: RecoveryPass) -> Result<()> {
        let indx = item.indx;
        if item.logical {
            let flag = move |view: &mut PageViewMut<'_>, deleted: bool| -> Result<()> {
                let num = view.view().num_entries();
                if indx >= num {
                    return Err(slot_error(lsn, item.page_id, indx, num));
                }
                view.set_deleted(indx as usize, deleted);
                Ok(())
            };
            return self.apply(
                item.page_id,
                item.page_lsn,
                lsn,
                pass,
                |view| flag(view, true),
                |view| flag(view, false),
            );
        }
        self.apply(
            item.page_id,
            item.page_lsn,
            lsn,
            pass,
            |view| remove_slot(view, lsn, item),
            |view| {
                let num = view.view().num_entries();
                if indx > num {
                    return Err(slot_error(lsn, item.page_id, indx, num));
                }
                view.insert_leaf(indx as usize, &item.key, &item.data, false)
            },
        )
    }
}

fn remove_slot(view: &mut PageViewMut<'_>, lsn: Lsn, item: &LeafItem) -> Result<()> {
    let num = view.view().num_entries();
    if item.indx >= num {
        return Err(slot_error(lsn, item.page_id, item.indx, num));
    }
    view.remove(item.indx as usize);
    Ok(())
}

impl RecoveryHandler for PageHandler {
    fn recover(
        &self,
        lsn: Lsn,
        record: &LogRecord,
        pass: RecoveryPass,
        _txnlist: &mut TxnList,
    ) -> Result<()> {
        match &record.body {
            RecordBody::CountAdjust(change) => self.count_adjust(lsn, change, pass),
            RecordBody::LeafInsert(item) => self.leaf_insert(lsn, item, pass),
            RecordBody::LeafDelete(item) => self.leaf_delete(lsn, item, pass),
            other => Err(QuireError::UnknownRecordType(other.record_type().as_u32())),
        }
    }
}

/// Transaction outcome records. They change no pages; during the backward
/// pass they teach the scratch list which transactions committed.
pub struct TxnHandler;

impl RecoveryHandler for TxnHandler {
    fn recover(
        &self,
        _lsn: Lsn,
        record: &LogRecord,
        pass: RecoveryPass,
        txnlist: &mut TxnList,
    ) -> Result<()> {
        if pass != RecoveryPass::BackwardRoll {
            return Ok(());
        }
        match record.body {
            RecordBody::Commit { .. } => txnlist.add(record.txn_id),
            // The parent's outcome was seen first: it is later in the log.
            RecordBody::ChildCommit { parent } if txnlist.find(parent) => {
                txnlist.add(record.txn_id)
            }
            _ => {}
        }
        Ok(())
    }
}

/// Notes registered files that no longer exist.
pub struct FileRegisterHandler {
    dir: PathBuf,
}

impl FileRegisterHandler {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl RecoveryHandler for FileRegisterHandler {
    fn recover(
        &self,
        lsn: Lsn,
        record: &LogRecord,
        pass: RecoveryPass,
        txnlist: &mut TxnList,
    ) -> Result<()> {
        let RecordBody::FileRegister { file_id, name } = &record.body else {
            return Err(QuireError::UnknownRecordType(record.record_type().as_u32()));
        };
        if pass == RecoveryPass::OpenFiles && !self.dir.join(name).exists() {
            tracing::debug!(%lsn, file = %name, file_id, "registered file is missing");
            txnlist.delete_file(name, Some(*file_id), false);
        }
        Ok(())
    }
}
