use crate::common::{Recno, Result};
use crate::lock::LockMode;
use crate::log::{CountAdjust, RecordBody};
use crate::txn::Txn;

use super::page::{PageType, PageView, PageViewMut};
use super::{log_change, Cursor, RecnoTree};

/// Live records held by one page: non-deleted slots on a btree leaf, all
/// slots on a recno leaf, the sum of the cached child counts on an
/// internal page.
pub fn total(view: &PageView<'_>) -> Result<Recno> {
    let num = view.num_entries() as usize;
    Ok(match view.page_type()? {
        PageType::LeafBtree => (0..num).filter(|&i| !view.is_deleted(i)).count() as Recno,
        PageType::LeafRecno => num as Recno,
        PageType::InternalBtree | PageType::InternalRecno => {
            (0..num).map(|i| view.internal(i).nrecs).sum()
        }
    })
}

impl Cursor<'_> {
    /// Applies `adjust` to the record counts along the stacked path: the
    /// followed entry of every internal page, and the root's tree total.
    ///
    /// Each page change is logged before the page is touched, and the page
    /// LSN moves to the new record.
    pub fn adjust(&mut self, adjust: i32) -> Result<()> {
        let tree = self.tree;
        let root = tree.root();
        let log = tree.log();
        let txn = self.txn;

        for frame in self.stack.iter_mut() {
            let (internal, page_lsn) = {
                let data = frame.page.data();
                let view = PageView::new(&data[..]);
                (view.page_type()?.is_internal(), view.lsn())
            };
            if !internal {
                continue;
            }
            let page_id = frame.page.page_id();
            let is_root = page_id == root;
            let lsn = log_change(
                log,
                txn,
                RecordBody::CountAdjust(CountAdjust {
                    page_id,
                    page_lsn,
                    indx: frame.indx as u16,
                    adjust,
                    root: is_root,
                }),
            )?;

            let indx = frame.indx;
            let mut data = frame.page.data_mut();
            let mut page = PageViewMut::new(&mut data[..]);
            page.adjust_internal_nrecs(indx, adjust);
            if is_root {
                page.adjust_root_nrecs(adjust);
            }
            if let Some(lsn) = lsn {
                page.set_lsn(lsn);
            }
        }
        Ok(())
    }
}

impl RecnoTree {
    /// Number of live records in the tree, read from the root under a read
    /// lock.
    pub fn nrecs(&self, txn: Option<&Txn>) -> Result<Recno> {
        let cursor = self.cursor(txn)?;
        let _lock = cursor.lock_page(self.root(), LockMode::Read)?;
        let page = self.store().fetch(self.root())?;
        let data = page.data();
        let view = PageView::new(&data[..]);
        if view.page_type()?.is_internal() {
            Ok(view.root_nrecs())
        } else {
            total(&view)
        }
    }
}
