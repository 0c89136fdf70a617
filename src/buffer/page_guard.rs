use std::fmt;
use std::sync::Arc;

use parking_lot::{RwLockReadGuard, RwLockWriteGuard};

use crate::common::PageId;

use super::{FrameHeader, PageData};

/// Called once when a pin is given back: `(page_id, dirty)`.
pub(crate) type ReleaseCallback = Box<dyn FnOnce(PageId, bool) + Send + Sync>;

/// A pinned page. The frame cannot be evicted while this handle lives.
///
/// Pinning is not latching: `data()` and `data_mut()` take the frame latch
/// only for the lifetime of the returned guard. Serialization between
/// writers of the same page is the job of the page locks.
pub struct PinnedPage {
    page_id: PageId,
    frame: Arc<FrameHeader>,
    dirty: bool,
    release: Option<ReleaseCallback>,
}

impl PinnedPage {
    pub(crate) fn new(page_id: PageId, frame: Arc<FrameHeader>, release: ReleaseCallback) -> Self {
        Self {
            page_id,
            frame,
            dirty: false,
            release: Some(release),
        }
    }

    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    pub fn data(&self) -> RwLockReadGuard<'_, PageData> {
        self.frame.read_data()
    }

    /// Latches the page for writing and marks it dirty.
    pub fn data_mut(&mut self) -> RwLockWriteGuard<'_, PageData> {
        self.dirty = true;
        self.frame.write_data()
    }

    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Returns the page to the pool, recording whether it was modified.
    pub fn put(mut self, dirty: bool) {
        self.dirty |= dirty;
    }
}

impl fmt::Debug for PinnedPage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PinnedPage")
            .field("page_id", &self.page_id)
            .field("frame_id", &self.frame.frame_id())
            .field("dirty", &self.dirty)
            .finish()
    }
}

impl Drop for PinnedPage {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            release(self.page_id, self.dirty);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::FrameId;
    use std::sync::atomic::{AtomicBool, Ordering};

    fn tracked(frame: Arc<FrameHeader>) -> (PinnedPage, Arc<AtomicBool>, Arc<AtomicBool>) {
        let released = Arc::new(AtomicBool::new(false));
        let dirty = Arc::new(AtomicBool::new(false));
        let (r, d) = (Arc::clone(&released), Arc::clone(&dirty));
        let page = PinnedPage::new(
            PageId::new(1),
            frame,
            Box::new(move |_, is_dirty| {
                r.store(true, Ordering::SeqCst);
                d.store(is_dirty, Ordering::SeqCst);
            }),
        );
        (page, released, dirty)
    }

    #[test]
    fn test_read_only_release_is_clean() {
        let frame = Arc::new(FrameHeader::new(FrameId::new(0)));
        let (page, released, dirty) = tracked(Arc::clone(&frame));

        assert_eq!(page.data()[0], 0);
        drop(page);
        assert!(released.load(Ordering::SeqCst));
        assert!(!dirty.load(Ordering::SeqCst));
    }

    #[test]
    fn test_write_marks_dirty() {
        let frame = Arc::new(FrameHeader::new(FrameId::new(0)));
        let (mut page, released, dirty) = tracked(Arc::clone(&frame));

        page.data_mut()[10] = 42;
        assert!(!released.load(Ordering::SeqCst));
        page.put(false);

        assert!(released.load(Ordering::SeqCst));
        assert!(dirty.load(Ordering::SeqCst));
        assert_eq!(frame.read_data()[10], 42);
    }

    #[test]
    fn test_put_dirty_flag() {
        let frame = Arc::new(FrameHeader::new(FrameId::new(0)));
        let (page, _released, dirty) = tracked(frame);
        page.put(true);
        assert!(dirty.load(Ordering::SeqCst));
    }
}
