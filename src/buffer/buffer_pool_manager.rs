use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::common::{FrameId, Lsn, PageId, QuireError, Result, INVALID_PAGE_ID};
use crate::log::LogManager;
use crate::storage::disk::{DiskManager, DiskScheduler};

use super::{FrameHeader, LruKReplacer, PageStore, PinnedPage, ReleaseCallback, SyncStatus};

struct PoolTables {
    page_table: HashMap<PageId, FrameId>,
    free_list: VecDeque<FrameId>,
}

/// State shared with the release callbacks of outstanding pins.
struct BufferPoolState {
    frames: Vec<Arc<FrameHeader>>,
    /// Guards residency and pin transitions
    tables: Mutex<PoolTables>,
    replacer: LruKReplacer,
}

/// BufferPoolManager caches pages of one data file in a fixed set of
/// frames, evicting with LRU-K.
///
/// When a log is attached, no dirty page is written before the log is
/// durable through that page's LSN.
pub struct BufferPoolManager {
    pool_size: usize,
    state: Arc<BufferPoolState>,
    disk_scheduler: DiskScheduler,
    log: Option<Arc<dyn LogManager>>,
}

impl BufferPoolManager {
    pub fn new(pool_size: usize, k: usize, disk_manager: Arc<DiskManager>) -> Self {
        let frames = (0..pool_size)
            .map(|i| Arc::new(FrameHeader::new(FrameId::new(i as u32))))
            .collect();
        let free_list = (0..pool_size).map(|i| FrameId::new(i as u32)).collect();

        let state = Arc::new(BufferPoolState {
            frames,
            tables: Mutex::new(PoolTables {
                page_table: HashMap::new(),
                free_list,
            }),
            replacer: LruKReplacer::new(k, pool_size),
        });

        Self {
            pool_size,
            state,
            disk_scheduler: DiskScheduler::new(disk_manager),
            log: None,
        }
    }

    /// Enforces write-ahead logging against `log` for every page write.
    pub fn with_log_manager(mut self, log: Arc<dyn LogManager>) -> Self {
        self.log = Some(log);
        self
    }

    /// Allocates a new zeroed page on disk and pins it.
    pub fn new_page(&self) -> Result<PinnedPage> {
        let mut tables = self.state.tables.lock();
        let frame_id = self.free_frame(&mut tables)?;
        let page_id = match self.disk_scheduler.disk_manager().allocate_page() {
            Ok(page_id) => page_id,
            Err(e) => {
                tables.free_list.push_back(frame_id);
                return Err(e);
            }
        };

        let frame = &self.state.frames[frame_id.as_usize()];
        frame.reset();
        frame.set_page_id(page_id);
        tables.page_table.insert(page_id, frame_id);

        tracing::trace!(%page_id, %frame_id, "allocated page");
        Ok(self.pin(page_id, frame_id))
    }

    /// Pins a page, reading it from disk if it is not resident.
    pub fn fetch_page(&self, page_id: PageId) -> Result<PinnedPage> {
        if page_id == INVALID_PAGE_ID {
            return Err(QuireError::InvalidPageId(page_id));
        }

        let mut tables = self.state.tables.lock();
        if let Some(&frame_id) = tables.page_table.get(&page_id) {
            return Ok(self.pin(page_id, frame_id));
        }

        if page_id.as_u32() >= self.disk_scheduler.disk_manager().num_pages() {
            return Err(QuireError::PageNotFound(page_id));
        }

        let frame_id = self.free_frame(&mut tables)?;
        let image = match self.disk_scheduler.read_sync(page_id) {
            Ok(image) => image,
            Err(e) => {
                tables.free_list.push_back(frame_id);
                return Err(e);
            }
        };

        let frame = &self.state.frames[frame_id.as_usize()];
        frame.reset();
        frame.load(&image);
        frame.set_page_id(page_id);
        tables.page_table.insert(page_id, frame_id);

        Ok(self.pin(page_id, frame_id))
    }

    /// Writes a resident page to disk. Returns false if it is not resident.
    pub fn flush_page(&self, page_id: PageId) -> Result<bool> {
        let tables = self.state.tables.lock();
        match tables.page_table.get(&page_id) {
            Some(&frame_id) => {
                self.write_frame(&self.state.frames[frame_id.as_usize()])?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Writes every dirty resident page and syncs the data file.
    pub fn flush_all_pages(&self) -> Result<()> {
        let tables = self.state.tables.lock();
        for &frame_id in tables.page_table.values() {
            let frame = &self.state.frames[frame_id.as_usize()];
            if frame.is_dirty() {
                self.write_frame(frame)?;
            }
        }
        self.disk_scheduler.sync()
    }

    /// Makes every change logged at or before `lsn` durable in the data
    /// file. A page's LSN only names its newest change, so every dirty page
    /// is written whatever its LSN. Pinned dirty pages are skipped and make
    /// the result `Incomplete`.
    pub fn sync_up_to(&self, lsn: Lsn) -> Result<SyncStatus> {
        let tables = self.state.tables.lock();
        let mut status = SyncStatus::Done;
        let mut written = 0usize;

        for &frame_id in tables.page_table.values() {
            let frame = &self.state.frames[frame_id.as_usize()];
            if !frame.is_dirty() {
                continue;
            }
            if frame.pin_count() > 0 {
                tracing::debug!(page_id = %frame.page_id(), "dirty page pinned during sync");
                status = SyncStatus::Incomplete;
                continue;
            }
            self.write_frame(frame)?;
            written += 1;
        }
        drop(tables);

        if written > 0 {
            self.disk_scheduler.sync()?;
        }
        tracing::debug!(%lsn, written, ?status, "page sync");
        Ok(status)
    }

    pub fn get_pin_count(&self, page_id: PageId) -> Option<u32> {
        let tables = self.state.tables.lock();
        tables
            .page_table
            .get(&page_id)
            .map(|&frame_id| self.state.frames[frame_id.as_usize()].pin_count())
    }

    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    pub fn free_frame_count(&self) -> usize {
        self.state.tables.lock().free_list.len()
    }

    pub fn disk_manager(&self) -> &Arc<DiskManager> {
        self.disk_scheduler.disk_manager()
    }

    /// Pins a resident frame. Caller holds the tables lock.
    fn pin(&self, page_id: PageId, frame_id: FrameId) -> PinnedPage {
        let frame = Arc::clone(&self.state.frames[frame_id.as_usize()]);
        frame.pin();
        self.state.replacer.record_access(frame_id);
        self.state.replacer.set_evictable(frame_id, false);
        PinnedPage::new(page_id, frame, self.release_callback(frame_id))
    }

    fn release_callback(&self, frame_id: FrameId) -> ReleaseCallback {
        let state = Arc::clone(&self.state);
        Box::new(move |_page_id, dirty| {
            let _tables = state.tables.lock();
            let frame = &state.frames[frame_id.as_usize()];
            if dirty {
                frame.set_dirty(true);
            }
            if frame.unpin() == Some(0) {
                state.replacer.set_evictable(frame_id, true);
            }
        })
    }

    /// Takes a frame from the free list or evicts one.
    fn free_frame(&self, tables: &mut PoolTables) -> Result<FrameId> {
        if let Some(frame_id) = tables.free_list.pop_front() {
            return Ok(frame_id);
        }

        let frame_id = self.state.replacer.evict().ok_or(QuireError::BufferPoolFull)?;
        let frame = &self.state.frames[frame_id.as_usize()];
        if frame.is_dirty() {
            if let Err(e) = self.write_frame(frame) {
                self.state.replacer.record_access(frame_id);
                self.state.replacer.set_evictable(frame_id, true);
                return Err(e);
            }
        }
        tables.page_table.remove(&frame.page_id());
        frame.reset();
        Ok(frame_id)
    }

    fn write_frame(&self, frame: &FrameHeader) -> Result<()> {
        let page_lsn = frame.page_lsn();
        if let Some(log) = &self.log {
            if !page_lsn.is_zero() {
                log.flush(page_lsn)?;
            }
        }
        self.disk_scheduler.write_sync(frame.page_id(), frame.snapshot())?;
        frame.set_dirty(false);
        Ok(())
    }
}

impl PageStore for BufferPoolManager {
    fn fetch(&self, page_id: PageId) -> Result<PinnedPage> {
        self.fetch_page(page_id)
    }

    fn allocate(&self) -> Result<PinnedPage> {
        self.new_page()
    }

    fn sync_up_to(&self, lsn: Lsn) -> Result<SyncStatus> {
        BufferPoolManager::sync_up_to(self, lsn)
    }

    fn flush(&self, page_id: PageId) -> Result<()> {
        if self.flush_page(page_id)? {
            self.disk_scheduler.sync()?;
        }
        Ok(())
    }
}

impl Drop for BufferPoolManager {
    fn drop(&mut self) {
        if let Err(e) = self.flush_all_pages() {
            tracing::warn!(error = %e, "flushing buffer pool on close failed");
        }
    }
}
