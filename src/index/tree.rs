use std::sync::Arc;

use crate::buffer::PageStore;
use crate::common::{PageId, QuireError, Recno, Result};
use crate::lock::LockManager;
use crate::log::{LeafItem, LogManager, RecordBody};
use crate::txn::Txn;

use super::adjust::total;
use super::page::{InternalEntry, PageType, PageView, PageViewMut};
use super::{log_change, Cursor, SearchFlags};

/// A record read back from a tree. Recno leaves carry no key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub key: Vec<u8>,
    pub data: Vec<u8>,
}

/// Handle to one record-number tree rooted at a fixed page.
pub struct RecnoTree {
    root: PageId,
    leaf_type: PageType,
    store: Arc<dyn PageStore>,
    locks: Arc<dyn LockManager>,
    log: Option<Arc<dyn LogManager>>,
}

impl RecnoTree {
    /// Allocates an empty single-leaf tree.
    pub fn create(
        leaf_type: PageType,
        store: Arc<dyn PageStore>,
        locks: Arc<dyn LockManager>,
        log: Option<Arc<dyn LogManager>>,
    ) -> Result<Self> {
        let mut page = store.allocate()?;
        let root = page.page_id();
        PageViewMut::new(&mut page.data_mut()[..]).init(root, leaf_type, 0);
        drop(page);
        // Tree creation is not logged; the root must be on disk before any
        // logged change refers to it.
        store.flush(root)?;
        tracing::debug!(%root, ?leaf_type, "created record-number tree");
        Ok(Self {
            root,
            leaf_type,
            store,
            locks,
            log,
        })
    }

    /// Opens the tree rooted at `root`, reading the leaf kind off the root.
    pub fn open(
        root: PageId,
        store: Arc<dyn PageStore>,
        locks: Arc<dyn LockManager>,
        log: Option<Arc<dyn LogManager>>,
    ) -> Result<Self> {
        let page = store.fetch(root)?;
        let leaf_type = match PageView::new(&page.data()[..]).page_type()? {
            PageType::InternalBtree | PageType::LeafBtree => PageType::LeafBtree,
            PageType::InternalRecno | PageType::LeafRecno => PageType::LeafRecno,
        };
        drop(page);
        Ok(Self {
            root,
            leaf_type,
            store,
            locks,
            log,
        })
    }

    pub fn root(&self) -> PageId {
        self.root
    }

    pub fn leaf_type(&self) -> PageType {
        self.leaf_type
    }

    pub fn store(&self) -> &Arc<dyn PageStore> {
        &self.store
    }

    pub fn locks(&self) -> &Arc<dyn LockManager> {
        &self.locks
    }

    pub fn log(&self) -> Option<&dyn LogManager> {
        self.log.as_deref()
    }

    pub fn cursor<'a>(&'a self, txn: Option<&'a Txn>) -> Result<Cursor<'a>> {
        Cursor::new(self, txn)
    }

    /// Reads record `recno`.
    pub fn get(&self, txn: Option<&Txn>, recno: Recno) -> Result<Record> {
        let mut cursor = self.cursor(txn)?;
        cursor.rsearch(recno, SearchFlags::READ, 0)?;
        let frame = cursor.top().ok_or(QuireError::NotFound)?;
        let data = frame.page.data();
        let entry = PageView::new(&data[..]).leaf(frame.indx);
        Ok(Record {
            key: entry.key.to_vec(),
            data: entry.data.to_vec(),
        })
    }

    /// Inserts a record so that it becomes record `recno`; later records
    /// shift up by one. `recno` may be one past the last record.
    pub fn put(&self, txn: Option<&Txn>, recno: Recno, key: &[u8], data: &[u8]) -> Result<()> {
        let mut cursor = self.cursor(txn)?;
        cursor.rsearch(recno, SearchFlags::INSERT, 0)?;
        self.insert_at(&mut cursor, key, data)
    }

    /// Adds a record after the last one and returns its record number.
    pub fn append(&self, txn: Option<&Txn>, key: &[u8], data: &[u8]) -> Result<Recno> {
        let mut cursor = self.cursor(txn)?;
        let found = cursor.rsearch(0, SearchFlags::INSERT | SearchFlags::APPEND, 0)?;
        self.insert_at(&mut cursor, key, data)?;
        Ok(found.recno)
    }

    /// Deletes record `recno`. Btree leaves keep the slot flagged deleted;
    /// recno leaves drop it.
    pub fn delete(&self, txn: Option<&Txn>, recno: Recno) -> Result<()> {
        let mut cursor = self.cursor(txn)?;
        let found = cursor.rsearch(recno, SearchFlags::DELETE, 0)?;
        if !found.exact {
            return Err(QuireError::NotFound);
        }
        let txn = cursor.txn;
        let frame = cursor.top_mut().ok_or(QuireError::NotFound)?;
        let indx = frame.indx;
        let page_id = frame.page.page_id();

        let (item, logical) = {
            let data = frame.page.data();
            let view = PageView::new(&data[..]);
            let entry = view.leaf(indx);
            let logical = view.page_type()? == PageType::LeafBtree;
            let item = LeafItem {
                page_id,
                page_lsn: view.lsn(),
                indx: indx as u16,
                page_type: view.raw_type(),
                logical,
                key: entry.key.to_vec(),
                data: entry.data.to_vec(),
            };
            (item, logical)
        };
        let lsn = log_change(self.log(), txn, RecordBody::LeafDelete(item))?;
        {
            let mut data = frame.page.data_mut();
            let mut page = PageViewMut::new(&mut data[..]);
            if logical {
                page.set_deleted(indx, true);
            } else {
                page.remove(indx);
            }
            if let Some(lsn) = lsn {
                page.set_lsn(lsn);
            }
        }
        cursor.adjust(-1)
    }

    fn insert_at(&self, cursor: &mut Cursor<'_>, key: &[u8], data: &[u8]) -> Result<()> {
        let txn = cursor.txn;
        let frame = cursor.top_mut().ok_or(QuireError::NotFound)?;
        let indx = frame.indx;
        let page_id = frame.page.page_id();

        let item = {
            let bytes = frame.page.data();
            let view = PageView::new(&bytes[..]);
            if !view.fits(view.leaf_entry_len(key, data)) {
                return Err(QuireError::PageFull(page_id));
            }
            LeafItem {
                page_id,
                page_lsn: view.lsn(),
                indx: indx as u16,
                page_type: view.raw_type(),
                logical: false,
                key: key.to_vec(),
                data: data.to_vec(),
            }
        };
        let lsn = log_change(self.log(), txn, RecordBody::LeafInsert(item))?;
        {
            let mut bytes = frame.page.data_mut();
            let mut page = PageViewMut::new(&mut bytes[..]);
            page.insert_leaf(indx, key, data, false)?;
            if let Some(lsn) = lsn {
                page.set_lsn(lsn);
            }
        }
        cursor.adjust(1)
    }

    /// Recomputes every cached count from the leaves up and checks it
    /// against the stored one. Returns the live record total.
    ///
    /// Takes no locks; callers quiesce the tree first.
    pub fn verify(&self) -> Result<Recno> {
        let actual = self.verify_page(self.root)?;
        let page = self.store.fetch(self.root)?;
        let data = page.data();
        let view = PageView::new(&data[..]);
        if view.page_type()?.is_internal() && view.root_nrecs() != actual {
            return Err(QuireError::CountMismatch {
                page_id: self.root,
                cached: view.root_nrecs(),
                actual,
            });
        }
        Ok(actual)
    }

    fn verify_page(&self, page_id: PageId) -> Result<Recno> {
        let children: Vec<InternalEntry> = {
            let page = self.store.fetch(page_id)?;
            let data = page.data();
            let view = PageView::new(&data[..]);
            if !view.page_type()?.is_internal() {
                return total(&view);
            }
            (0..view.num_entries() as usize)
                .map(|i| view.internal(i))
                .collect()
        };

        let mut sum: Recno = 0;
        for entry in children {
            let actual = self.verify_page(entry.child)?;
            if actual != entry.nrecs {
                return Err(QuireError::CountMismatch {
                    page_id: entry.child,
                    cached: entry.nrecs,
                    actual,
                });
            }
            sum += actual;
        }
        Ok(sum)
    }
}

/// Bulk-loads a tree bottom-up: leaves filled to `leaf_capacity` entries,
/// internal levels to `fanout` children, counts computed on the way up.
/// Nothing is logged.
pub struct TreeBuilder {
    leaf_type: PageType,
    leaf_capacity: usize,
    fanout: usize,
    records: Vec<(Vec<u8>, Vec<u8>, bool)>,
}

impl TreeBuilder {
    pub fn new(leaf_type: PageType) -> Self {
        Self {
            leaf_type,
            leaf_capacity: 64,
            fanout: 64,
            records: Vec::new(),
        }
    }

    pub fn leaf_capacity(mut self, leaf_capacity: usize) -> Self {
        self.leaf_capacity = leaf_capacity.max(1);
        self
    }

    pub fn fanout(mut self, fanout: usize) -> Self {
        self.fanout = fanout.max(2);
        self
    }

    pub fn record(mut self, key: &[u8], data: &[u8]) -> Self {
        self.records.push((key.to_vec(), data.to_vec(), false));
        self
    }

    /// Adds a slot already flagged deleted. Recno leaves cannot hold one
    /// and store it as a live record.
    pub fn deleted_record(mut self, key: &[u8], data: &[u8]) -> Self {
        self.records.push((key.to_vec(), data.to_vec(), true));
        self
    }

    pub fn build(
        self,
        store: Arc<dyn PageStore>,
        locks: Arc<dyn LockManager>,
        log: Option<Arc<dyn LogManager>>,
    ) -> Result<RecnoTree> {
        if self.records.is_empty() {
            return RecnoTree::create(self.leaf_type, store, locks, log);
        }

        let mut created = Vec::new();
        let mut level_entries = Vec::new();
        for chunk in self.records.chunks(self.leaf_capacity) {
            let mut page = store.allocate()?;
            let page_id = page.page_id();
            created.push(page_id);
            let mut data = page.data_mut();
            let mut view = PageViewMut::new(&mut data[..]);
            view.init(page_id, self.leaf_type, 0);
            for (i, (key, value, deleted)) in chunk.iter().enumerate() {
                view.insert_leaf(i, key, value, *deleted)?;
            }
            level_entries.push(InternalEntry {
                child: page_id,
                nrecs: total(&view.view())?,
            });
        }

        let internal_type = self.leaf_type.internal_for();
        let mut level = 0u8;
        while level_entries.len() > 1 {
            level += 1;
            let mut parents = Vec::new();
            for chunk in level_entries.chunks(self.fanout) {
                let mut page = store.allocate()?;
                let page_id = page.page_id();
                created.push(page_id);
                let mut data = page.data_mut();
                let mut view = PageViewMut::new(&mut data[..]);
                view.init(page_id, internal_type, level);
                for (i, entry) in chunk.iter().enumerate() {
                    view.insert_internal(i, *entry, &[])?;
                }
                parents.push(InternalEntry {
                    child: page_id,
                    nrecs: chunk.iter().map(|e| e.nrecs).sum(),
                });
            }
            level_entries = parents;
        }

        let root = level_entries[0];
        if level > 0 {
            let mut page = store.fetch(root.child)?;
            PageViewMut::new(&mut page.data_mut()[..]).set_root_nrecs(root.nrecs);
        }
        for page_id in created {
            store.flush(page_id)?;
        }
        tracing::debug!(root = %root.child, levels = level + 1, records = root.nrecs, "bulk-loaded tree");
        Ok(RecnoTree {
            root: root.child,
            leaf_type: self.leaf_type,
            store,
            locks,
            log,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::BufferPoolManager;
    use crate::lock::LockTable;
    use crate::storage::disk::DiskManager;

    fn setup() -> (tempfile::TempDir, Arc<dyn PageStore>, Arc<dyn LockManager>) {
        let dir = tempfile::tempdir().unwrap();
        let dm = Arc::new(DiskManager::new(dir.path().join("tree.db")).unwrap());
        (dir, Arc::new(BufferPoolManager::new(64, 2, dm)), Arc::new(LockTable::new()))
    }

    #[test]
    fn test_empty_tree_append_and_get() {
        let (_dir, store, locks) = setup();
        let tree = RecnoTree::create(PageType::LeafRecno, store, locks, None).unwrap();
        assert_eq!(tree.nrecs(None).unwrap(), 0);
        assert_eq!(tree.append(None, b"", b"first").unwrap(), 1);
        assert_eq!(tree.append(None, b"", b"second").unwrap(), 2);
        assert_eq!(tree.get(None, 2).unwrap().data, b"second");
        assert!(matches!(tree.get(None, 3), Err(QuireError::NotFound)));
    }

    #[test]
    fn test_put_shifts_later_records() {
        let (_dir, store, locks) = setup();
        let mut builder = TreeBuilder::new(PageType::LeafBtree).leaf_capacity(2).fanout(2);
        for i in 1..=6u8 {
            builder = builder.record(&[i], &[i]);
        }
        let tree = builder.build(store, locks, None).unwrap();

        tree.put(None, 3, b"new", b"new").unwrap();
        assert_eq!(tree.get(None, 3).unwrap().data, b"new");
        assert_eq!(tree.get(None, 4).unwrap().data, [3]);
        assert_eq!(tree.nrecs(None).unwrap(), 7);
        assert_eq!(tree.verify().unwrap(), 7);
    }

    #[test]
    fn test_delete_btree_is_logical() {
        let (_dir, store, locks) = setup();
        let tree = TreeBuilder::new(PageType::LeafBtree)
            .leaf_capacity(2)
            .record(b"a", b"1")
            .record(b"b", b"2")
            .record(b"c", b"3")
            .build(store.clone(), locks, None)
            .unwrap();

        tree.delete(None, 1).unwrap();
        assert_eq!(tree.get(None, 1).unwrap().key, b"b");
        assert_eq!(tree.nrecs(None).unwrap(), 2);
        assert_eq!(tree.verify().unwrap(), 2);
        assert!(matches!(tree.delete(None, 3), Err(QuireError::NotFound)));
    }

    #[test]
    fn test_delete_recno_is_physical() {
        let (_dir, store, locks) = setup();
        let tree = RecnoTree::create(PageType::LeafRecno, store.clone(), locks, None).unwrap();
        for data in [b"x", b"y", b"z"] {
            tree.append(None, b"", data).unwrap();
        }
        tree.delete(None, 2).unwrap();
        let page = store.fetch(tree.root()).unwrap();
        assert_eq!(PageView::new(&page.data()[..]).num_entries(), 2);
        drop(page);
        assert_eq!(tree.get(None, 2).unwrap().data, b"z");
    }

    #[test]
    fn test_full_leaf() {
        let (_dir, store, locks) = setup();
        let tree = RecnoTree::create(PageType::LeafRecno, store, locks, None).unwrap();
        let record = [7u8; 1000];
        for _ in 0..4 {
            tree.append(None, b"", &record).unwrap();
        }
        assert!(matches!(
            tree.append(None, b"", &record),
            Err(QuireError::PageFull(_))
        ));
        assert_eq!(tree.nrecs(None).unwrap(), 4);
    }

    #[test]
    fn test_reopen_reads_leaf_type() {
        let (_dir, store, locks) = setup();
        let tree = TreeBuilder::new(PageType::LeafRecno)
            .leaf_capacity(1)
            .record(b"", b"a")
            .record(b"", b"b")
            .build(store.clone(), locks.clone(), None)
            .unwrap();
        let reopened = RecnoTree::open(tree.root(), store, locks, None).unwrap();
        assert_eq!(reopened.leaf_type(), PageType::LeafRecno);
        assert_eq!(reopened.nrecs(None).unwrap(), 2);
    }
}
