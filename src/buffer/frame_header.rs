use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::common::{FrameId, Lsn, PageId, INVALID_PAGE_ID, PAGE_SIZE};

/// Byte image of one page held by a frame.
pub type PageData = Box<[u8; PAGE_SIZE]>;

/// One slot of the buffer pool: the resident page image plus the
/// bookkeeping the pool needs to pin, evict and write it back.
pub struct FrameHeader {
    frame_id: FrameId,
    page_id: RwLock<PageId>,
    pin_count: AtomicU32,
    is_dirty: AtomicBool,
    /// Short-term latch over the page bytes
    data: RwLock<PageData>,
}

impl FrameHeader {
    pub fn new(frame_id: FrameId) -> Self {
        Self {
            frame_id,
            page_id: RwLock::new(INVALID_PAGE_ID),
            pin_count: AtomicU32::new(0),
            is_dirty: AtomicBool::new(false),
            data: RwLock::new(Box::new([0u8; PAGE_SIZE])),
        }
    }

    pub fn frame_id(&self) -> FrameId {
        self.frame_id
    }

    pub fn page_id(&self) -> PageId {
        *self.page_id.read()
    }

    pub fn set_page_id(&self, page_id: PageId) {
        *self.page_id.write() = page_id;
    }

    pub fn pin_count(&self) -> u32 {
        self.pin_count.load(Ordering::Acquire)
    }

    /// Increments the pin count and returns the new value.
    pub fn pin(&self) -> u32 {
        self.pin_count.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Decrements the pin count and returns the new value, or `None` if the
    /// frame was not pinned.
    pub fn unpin(&self) -> Option<u32> {
        self.pin_count
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |count| count.checked_sub(1))
            .ok()
            .map(|previous| previous - 1)
    }

    pub fn is_dirty(&self) -> bool {
        self.is_dirty.load(Ordering::Acquire)
    }

    pub fn set_dirty(&self, dirty: bool) {
        self.is_dirty.store(dirty, Ordering::Release);
    }

    pub fn read_data(&self) -> RwLockReadGuard<'_, PageData> {
        self.data.read()
    }

    pub fn write_data(&self) -> RwLockWriteGuard<'_, PageData> {
        self.data.write()
    }

    /// LSN of the last logged change to the resident page. Every page
    /// format keeps it in its first eight bytes.
    pub fn page_lsn(&self) -> Lsn {
        let data = self.data.read();
        let mut raw = [0u8; 8];
        raw.copy_from_slice(&data[..8]);
        Lsn::new(u64::from_le_bytes(raw))
    }

    /// Replaces the page image, e.g. after a disk read.
    pub fn load(&self, image: &[u8; PAGE_SIZE]) {
        self.data.write().copy_from_slice(image);
    }

    /// Copies the page image out for a disk write.
    pub fn snapshot(&self) -> PageData {
        Box::new(**self.data.read())
    }

    pub fn reset(&self) {
        *self.page_id.write() = INVALID_PAGE_ID;
        self.pin_count.store(0, Ordering::Release);
        self.is_dirty.store(false, Ordering::Release);
        self.data.write().fill(0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_header_pin_unpin() {
        let frame = FrameHeader::new(FrameId::new(0));
        assert_eq!(frame.page_id(), INVALID_PAGE_ID);

        assert_eq!(frame.pin(), 1);
        assert_eq!(frame.pin(), 2);
        assert_eq!(frame.unpin(), Some(1));
        assert_eq!(frame.unpin(), Some(0));
        assert_eq!(frame.unpin(), None);
    }

    #[test]
    fn test_frame_header_page_lsn() {
        let frame = FrameHeader::new(FrameId::new(0));
        assert_eq!(frame.page_lsn(), Lsn::ZERO);

        let mut image = [0u8; PAGE_SIZE];
        image[..8].copy_from_slice(&777u64.to_le_bytes());
        frame.load(&image);
        assert_eq!(frame.page_lsn(), Lsn::new(777));
        assert_eq!(frame.snapshot()[..8], image[..8]);
    }

    #[test]
    fn test_frame_header_reset() {
        let frame = FrameHeader::new(FrameId::new(3));
        frame.set_page_id(PageId::new(5));
        frame.pin();
        frame.set_dirty(true);
        frame.load(&[1u8; PAGE_SIZE]);

        frame.reset();

        assert_eq!(frame.page_id(), INVALID_PAGE_ID);
        assert_eq!(frame.pin_count(), 0);
        assert!(!frame.is_dirty());
        assert!(frame.read_data().iter().all(|&b| b == 0));
    }
}
