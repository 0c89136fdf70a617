mod buffer_pool_manager;
mod frame_header;
mod lru_k_replacer;
mod page_guard;

pub use buffer_pool_manager::*;
pub use frame_header::*;
pub use lru_k_replacer::*;
pub use page_guard::*;

use crate::common::{Lsn, PageId, Result};

/// Outcome of [`PageStore::sync_up_to`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStatus {
    /// Every dirty page reached disk.
    Done,
    /// Some dirty pages were pinned and could not be written yet.
    Incomplete,
}

/// Paginated page cache the access methods and the transaction manager
/// work against.
pub trait PageStore: Send + Sync {
    /// Pins an existing page.
    fn fetch(&self, page_id: PageId) -> Result<PinnedPage>;

    /// Allocates a fresh zeroed page and pins it.
    fn allocate(&self) -> Result<PinnedPage>;

    /// Unpins a page, recording whether it was modified.
    fn put(&self, page: PinnedPage, dirty: bool) {
        page.put(dirty);
    }

    /// Makes every change logged at or before `lsn` durable in the data
    /// file. Pages newer than `lsn` may still hold older changes, so they
    /// are written too.
    fn sync_up_to(&self, lsn: Lsn) -> Result<SyncStatus>;

    /// Writes one resident page through to stable storage, dirty or not.
    fn flush(&self, page_id: PageId) -> Result<()>;
}
