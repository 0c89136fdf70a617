use std::collections::HashSet;

use crate::common::TxnId;

/// A file recovery could not find, or saw deleted, with the number of
/// records that referred to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileMarker {
    pub name: String,
    pub file_id: Option<u32>,
    pub count: u32,
    pub deleted: bool,
    pub closed: bool,
}

impl FileMarker {
    /// Records referred to a file that was never deleted.
    fn unresolved(&self) -> bool {
        !self.deleted && self.count != 0
    }
}

/// Scratch list built during one recovery run: the transactions known to
/// have committed, each stamped with the generation it was added in, and
/// markers for missing or deleted files.
#[derive(Debug, Default)]
pub struct TxnList {
    txns: HashSet<(TxnId, i32)>,
    files: Vec<FileMarker>,
    generation: i32,
    max_id: Option<TxnId>,
}

impl TxnList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, txn_id: TxnId) {
        self.txns.insert((txn_id, self.generation));
        self.note_id(txn_id);
    }

    /// Remembers `txn_id` as seen in the log without marking it committed.
    pub fn note_id(&mut self, txn_id: TxnId) {
        if txn_id == TxnId::NONE {
            return;
        }
        if self.max_id.map_or(true, |max| txn_id > max) {
            self.max_id = Some(txn_id);
        }
    }

    /// Whether `txn_id` was added in the current generation.
    pub fn find(&self, txn_id: TxnId) -> bool {
        self.txns.contains(&(txn_id, self.generation))
    }

    /// Largest id added or noted.
    pub fn max_id(&self) -> Option<TxnId> {
        self.max_id
    }

    pub fn generation(&self) -> i32 {
        self.generation
    }

    /// Moves to another generation; ids added before stop matching.
    pub fn shift_generation(&mut self, delta: i32) {
        self.generation += delta;
    }

    /// Marks `name` missing (`deleted == false`) or deleted. An existing
    /// marker for the same file is updated in place.
    pub fn delete_file(&mut self, name: &str, file_id: Option<u32>, deleted: bool) {
        let existing = self
            .files
            .iter_mut()
            .find(|f| f.name == name || (file_id.is_some() && f.file_id == file_id));
        match existing {
            Some(marker) => marker.deleted |= deleted,
            None => self.files.push(FileMarker {
                name: name.to_string(),
                file_id,
                count: 0,
                deleted,
                closed: false,
            }),
        }
    }

    /// Charges `count` operations to the open marker for `file_id` and
    /// closes it.
    pub fn close_file(&mut self, file_id: u32, count: u32) {
        if let Some(marker) = self
            .files
            .iter_mut()
            .find(|f| f.file_id == Some(file_id) && !f.closed)
        {
            marker.count += count;
            marker.closed = true;
        }
    }

    pub fn files(&self) -> &[FileMarker] {
        &self.files
    }

    /// Discards the list, warning about every file left with unresolved
    /// operations. Returns the names warned about.
    pub fn end(self) -> Vec<String> {
        self.files
            .into_iter()
            .filter(FileMarker::unresolved)
            .map(|f| {
                tracing::warn!(file = %f.name, count = f.count, "file missing during recovery");
                f.name
            })
            .collect()
    }
}
