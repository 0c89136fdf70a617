use crate::common::{Lsn, PageId, QuireError, Recno, Result, PAGE_SIZE};

const LSN_OFFSET: usize = 0;
const PAGE_ID_OFFSET: usize = 8;
const TYPE_OFFSET: usize = 12;
const LEVEL_OFFSET: usize = 13;
const NUM_ENTRIES_OFFSET: usize = 14;
const NRECS_OFFSET: usize = 16;
const HIGH_OFFSET: usize = 20;

pub const PAGE_HEADER_SIZE: usize = 24;
const SLOT_SIZE: usize = 2;

/// Leaf-btree flag: the slot is logically deleted.
const ITEM_DELETED: u8 = 0x80;

/// Page types understood by the record-number code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PageType {
    InternalBtree = 3,
    InternalRecno = 4,
    LeafBtree = 5,
    LeafRecno = 6,
}

impl PageType {
    pub fn from_u8(raw: u8) -> Option<Self> {
        match raw {
            3 => Some(Self::InternalBtree),
            4 => Some(Self::InternalRecno),
            5 => Some(Self::LeafBtree),
            6 => Some(Self::LeafRecno),
            _ => None,
        }
    }

    pub fn is_internal(self) -> bool {
        matches!(self, Self::InternalBtree | Self::InternalRecno)
    }

    /// Internal page type of a tree whose leaves are `self`.
    pub fn internal_for(self) -> Self {
        match self {
            Self::LeafBtree | Self::InternalBtree => Self::InternalBtree,
            Self::LeafRecno | Self::InternalRecno => Self::InternalRecno,
        }
    }
}

/// Child reference held by an internal page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InternalEntry {
    pub child: PageId,
    /// Live records reachable under `child`
    pub nrecs: Recno,
}

/// One leaf slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LeafEntry<'a> {
    pub deleted: bool,
    pub key: &'a [u8],
    pub data: &'a [u8],
}

fn read_u16(data: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([data[offset], data[offset + 1]])
}

fn read_u32(data: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        data[offset],
        data[offset + 1],
        data[offset + 2],
        data[offset + 3],
    ])
}

fn write_u16(data: &mut [u8], offset: usize, value: u16) {
    data[offset..offset + 2].copy_from_slice(&value.to_le_bytes());
}

fn write_u32(data: &mut [u8], offset: usize, value: u32) {
    data[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

/// Read-only view over a record-number tree page.
///
/// Layout: a 24 byte header (LSN, page number, type, level, entry count,
/// root record total, heap start), then a slot array of u16 entry offsets
/// growing up, and entries packed down from the end of the page.
#[derive(Clone, Copy)]
pub struct PageView<'a> {
    data: &'a [u8],
}

impl<'a> PageView<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        assert_eq!(data.len(), PAGE_SIZE);
        Self { data }
    }

    pub fn lsn(&self) -> Lsn {
        let mut raw = [0u8; 8];
        raw.copy_from_slice(&self.data[LSN_OFFSET..LSN_OFFSET + 8]);
        Lsn::new(u64::from_le_bytes(raw))
    }

    pub fn page_id(&self) -> PageId {
        PageId::new(read_u32(self.data, PAGE_ID_OFFSET))
    }

    pub fn raw_type(&self) -> u8 {
        self.data[TYPE_OFFSET]
    }

    /// The page type, or a format error for anything else.
    pub fn page_type(&self) -> Result<PageType> {
        PageType::from_u8(self.raw_type()).ok_or(QuireError::PageFormat {
            page_id: self.page_id(),
            page_type: self.raw_type(),
        })
    }

    pub fn level(&self) -> u8 {
        self.data[LEVEL_OFFSET]
    }

    pub fn num_entries(&self) -> u16 {
        read_u16(self.data, NUM_ENTRIES_OFFSET)
    }

    /// Whole-tree record total; only maintained on the root.
    pub fn root_nrecs(&self) -> Recno {
        read_u32(self.data, NRECS_OFFSET)
    }

    fn high(&self) -> usize {
        match read_u16(self.data, HIGH_OFFSET) {
            0 => PAGE_SIZE,
            high => high as usize,
        }
    }

    pub fn free_space(&self) -> usize {
        let slots_end = PAGE_HEADER_SIZE + self.num_entries() as usize * SLOT_SIZE;
        self.high().saturating_sub(slots_end)
    }

    /// Whether an entry of `len` bytes fits once the page is compacted.
    pub fn fits(&self, len: usize) -> bool {
        let num = self.num_entries() as usize;
        let used: usize = (0..num).map(|i| self.entry(i).len()).sum();
        PAGE_HEADER_SIZE + (num + 1) * SLOT_SIZE + used + len <= PAGE_SIZE
    }

    /// Encoded size of a leaf slot holding `key` and `data` on this page.
    pub fn leaf_entry_len(&self, key: &[u8], data: &[u8]) -> usize {
        if self.raw_type() == PageType::LeafRecno as u8 {
            2 + data.len()
        } else {
            5 + key.len() + data.len()
        }
    }

    fn entry_offset(&self, index: usize) -> usize {
        read_u16(self.data, PAGE_HEADER_SIZE + index * SLOT_SIZE) as usize
    }

    fn entry_len(&self, offset: usize) -> usize {
        let d = self.data;
        match PageType::from_u8(self.raw_type()) {
            Some(PageType::InternalRecno) => 8,
            Some(PageType::InternalBtree) => 10 + read_u16(d, offset + 8) as usize,
            Some(PageType::LeafBtree) => {
                5 + read_u16(d, offset + 1) as usize + read_u16(d, offset + 3) as usize
            }
            Some(PageType::LeafRecno) => 2 + read_u16(d, offset) as usize,
            None => 0,
        }
    }

    fn entry(&self, index: usize) -> &'a [u8] {
        let offset = self.entry_offset(index);
        &self.data[offset..offset + self.entry_len(offset)]
    }

    /// Child reference `index` of an internal page.
    pub fn internal(&self, index: usize) -> InternalEntry {
        let offset = self.entry_offset(index);
        InternalEntry {
            child: PageId::new(read_u32(self.data, offset)),
            nrecs: read_u32(self.data, offset + 4),
        }
    }

    /// Separator key of an internal-btree entry.
    pub fn internal_key(&self, index: usize) -> &'a [u8] {
        let offset = self.entry_offset(index);
        let len = read_u16(self.data, offset + 8) as usize;
        &self.data[offset + 10..offset + 10 + len]
    }

    /// Leaf slot `index`. Leaf-recno slots have an empty key and are never
    /// deleted.
    pub fn leaf(&self, index: usize) -> LeafEntry<'a> {
        let offset = self.entry_offset(index);
        let d = self.data;
        if self.raw_type() == PageType::LeafRecno as u8 {
            let len = read_u16(d, offset) as usize;
            return LeafEntry {
                deleted: false,
                key: &[],
                data: &d[offset + 2..offset + 2 + len],
            };
        }
        let key_len = read_u16(d, offset + 1) as usize;
        let data_len = read_u16(d, offset + 3) as usize;
        let key_start = offset + 5;
        let data_start = key_start + key_len;
        LeafEntry {
            deleted: d[offset] & ITEM_DELETED != 0,
            key: &d[key_start..data_start],
            data: &d[data_start..data_start + data_len],
        }
    }

    pub fn is_deleted(&self, index: usize) -> bool {
        self.raw_type() == PageType::LeafBtree as u8
            && self.data[self.entry_offset(index)] & ITEM_DELETED != 0
    }
}

/// Mutable view over a record-number tree page.
pub struct PageViewMut<'a> {
    data: &'a mut [u8],
}

impl<'a> PageViewMut<'a> {
    pub fn new(data: &'a mut [u8]) -> Self {
        assert_eq!(data.len(), PAGE_SIZE);
        Self { data }
    }

    pub fn view(&self) -> PageView<'_> {
        PageView { data: &*self.data }
    }

    pub fn init(&mut self, page_id: PageId, page_type: PageType, level: u8) {
        self.data.fill(0);
        write_u32(self.data, PAGE_ID_OFFSET, page_id.as_u32());
        self.data[TYPE_OFFSET] = page_type as u8;
        self.data[LEVEL_OFFSET] = level;
    }

    pub fn set_lsn(&mut self, lsn: Lsn) {
        self.data[LSN_OFFSET..LSN_OFFSET + 8].copy_from_slice(&lsn.as_u64().to_le_bytes());
    }

    pub fn set_raw_type(&mut self, raw: u8) {
        self.data[TYPE_OFFSET] = raw;
    }

    pub fn set_root_nrecs(&mut self, nrecs: Recno) {
        write_u32(self.data, NRECS_OFFSET, nrecs);
    }

    pub fn adjust_root_nrecs(&mut self, adjust: i32) {
        let nrecs = self.view().root_nrecs().wrapping_add_signed(adjust);
        self.set_root_nrecs(nrecs);
    }

    pub fn set_internal_nrecs(&mut self, index: usize, nrecs: Recno) {
        let offset = self.view().entry_offset(index);
        write_u32(self.data, offset + 4, nrecs);
    }

    pub fn adjust_internal_nrecs(&mut self, index: usize, adjust: i32) {
        let nrecs = self.view().internal(index).nrecs.wrapping_add_signed(adjust);
        self.set_internal_nrecs(index, nrecs);
    }

    pub fn set_deleted(&mut self, index: usize, deleted: bool) {
        let offset = self.view().entry_offset(index);
        if deleted {
            self.data[offset] |= ITEM_DELETED;
        } else {
            self.data[offset] &= !ITEM_DELETED;
        }
    }

    /// Inserts a child reference at `index`. `key` is ignored on
    /// internal-recno pages.
    pub fn insert_internal(&mut self, index: usize, entry: InternalEntry, key: &[u8]) -> Result<()> {
        let mut bytes = Vec::with_capacity(10 + key.len());
        bytes.extend_from_slice(&entry.child.as_u32().to_le_bytes());
        bytes.extend_from_slice(&entry.nrecs.to_le_bytes());
        if self.view().raw_type() == PageType::InternalBtree as u8 {
            bytes.extend_from_slice(&(key.len() as u16).to_le_bytes());
            bytes.extend_from_slice(key);
        }
        self.insert_entry(index, &bytes)
    }

    /// Inserts a leaf slot at `index`. `key` and `deleted` are ignored on
    /// leaf-recno pages.
    pub fn insert_leaf(&mut self, index: usize, key: &[u8], data: &[u8], deleted: bool) -> Result<()> {
        let mut bytes = Vec::with_capacity(5 + key.len() + data.len());
        if self.view().raw_type() == PageType::LeafRecno as u8 {
            bytes.extend_from_slice(&(data.len() as u16).to_le_bytes());
        } else {
            bytes.push(if deleted { ITEM_DELETED } else { 0 });
            bytes.extend_from_slice(&(key.len() as u16).to_le_bytes());
            bytes.extend_from_slice(&(data.len() as u16).to_le_bytes());
            bytes.extend_from_slice(key);
        }
        bytes.extend_from_slice(data);
        self.insert_entry(index, &bytes)
    }

    fn insert_entry(&mut self, index: usize, bytes: &[u8]) -> Result<()> {
        let num = self.view().num_entries() as usize;
        assert!(index <= num, "insert index {index} past {num} entries");

        let needed = bytes.len() + SLOT_SIZE;
        if self.view().free_space() < needed {
            self.compact();
            if self.view().free_space() < needed {
                return Err(QuireError::PageFull(self.view().page_id()));
            }
        }

        let offset = self.view().high() - bytes.len();
        self.data[offset..offset + bytes.len()].copy_from_slice(bytes);
        write_u16(self.data, HIGH_OFFSET, offset as u16);

        let slot = PAGE_HEADER_SIZE + index * SLOT_SIZE;
        let slots_end = PAGE_HEADER_SIZE + num * SLOT_SIZE;
        self.data.copy_within(slot..slots_end, slot + SLOT_SIZE);
        write_u16(self.data, slot, offset as u16);
        write_u16(self.data, NUM_ENTRIES_OFFSET, (num + 1) as u16);
        Ok(())
    }

    /// Removes slot `index`; its bytes are reclaimed by the next compaction.
    pub fn remove(&mut self, index: usize) {
        let num = self.view().num_entries() as usize;
        assert!(index < num, "remove index {index} past {num} entries");
        let slot = PAGE_HEADER_SIZE + index * SLOT_SIZE;
        let slots_end = PAGE_HEADER_SIZE + num * SLOT_SIZE;
        self.data.copy_within(slot + SLOT_SIZE..slots_end, slot);
        write_u16(self.data, NUM_ENTRIES_OFFSET, (num - 1) as u16);
    }

    /// Repacks live entries against the end of the page.
    pub fn compact(&mut self) {
        let num = self.view().num_entries() as usize;
        let entries: Vec<Vec<u8>> = (0..num).map(|i| self.view().entry(i).to_vec()).collect();

        let mut high = PAGE_SIZE;
        for (i, entry) in entries.iter().enumerate() {
            high -= entry.len();
            self.data[high..high + entry.len()].copy_from_slice(entry);
            write_u16(self.data, PAGE_HEADER_SIZE + i * SLOT_SIZE, high as u16);
        }
        let high = if high == PAGE_SIZE { 0 } else { high as u16 };
        write_u16(self.data, HIGH_OFFSET, high);
    }
}
