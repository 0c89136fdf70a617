use crate::common::{PageId, QuireError, Recno, Result, LEAF_LEVEL};
use crate::lock::LockMode;

use super::adjust::total;
use super::page::{PageType, PageView};
use super::{Cursor, SearchFlags};

/// Outcome of a record-number search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Found {
    /// The record number searched for; `total + 1` under `APPEND`.
    pub recno: Recno,
    /// False when the position is one past the last record.
    pub exact: bool,
}

/// What one page tells the descent to do next.
enum Step {
    Leaf { slot: usize, exact: bool },
    Descend { indx: usize, child: PageId, nrecs_before: Recno, level: u8 },
}

/// Slot of the `target`-th live entry of a leaf. With `past_eof`, a target
/// one past the last live entry maps to the end of the page.
fn leaf_slot(view: &PageView<'_>, target: Recno, past_eof: bool) -> Result<(usize, bool)> {
    let num = view.num_entries() as usize;
    if target == 0 {
        return Err(QuireError::NotFound);
    }
    let mut remaining = target;
    for slot in 0..num {
        if view.is_deleted(slot) {
            continue;
        }
        remaining -= 1;
        if remaining == 0 {
            return Ok((slot, true));
        }
    }
    if past_eof && remaining == 1 {
        return Ok((num, false));
    }
    Err(QuireError::NotFound)
}

impl Cursor<'_> {
    /// Descends from the root to the leaf slot holding record `recno`,
    /// counting records through the per-entry totals of internal pages.
    ///
    /// On success the stack's top frame is the leaf and its slot. With
    /// `STACK` every page on the path is kept write-locked; with `PARENT`
    /// the descent stops at level `stop`. Any previous stack is released
    /// first, and an error leaves the stack empty.
    pub fn rsearch(&mut self, recno: Recno, flags: SearchFlags, stop: u8) -> Result<Found> {
        self.release_stack();
        match self.descend(recno, flags, stop) {
            Ok(found) => Ok(found),
            Err(e) => {
                self.release_stack();
                Err(e)
            }
        }
    }

    fn descend(&mut self, recno: Recno, flags: SearchFlags, stop: u8) -> Result<Found> {
        let tree = self.tree;
        let store = tree.store();
        let parent = flags.contains(SearchFlags::PARENT);
        let write = flags.contains(SearchFlags::WRITE);

        let mut page_id = tree.root();
        let mut stack = flags.contains(SearchFlags::STACK);
        let mode = if stack { LockMode::Write } else { LockMode::Read };
        let mut lock = self.lock_page(page_id, mode)?;
        let mut page = store.fetch(page_id)?;

        // Retry with a write lock if this search ends at the root.
        let level = PageView::new(&page.data()[..]).level();
        if !stack
            && ((parent && stop.wrapping_add(1) >= level) || (write && level == LEAF_LEVEL))
        {
            drop(page);
            lock.release()?;
            lock = self.lock_page(page_id, LockMode::Write)?;
            page = store.fetch(page_id)?;
            stack = true;
        }

        let tree_total = {
            let data = page.data();
            let view = PageView::new(&data[..]);
            if view.page_type()?.is_internal() {
                view.root_nrecs()
            } else {
                total(&view)?
            }
        };
        let (recno, exact) = if flags.contains(SearchFlags::APPEND) {
            (tree_total + 1, false)
        } else if recno == 0 {
            return Err(QuireError::NotFound);
        } else if recno <= tree_total {
            (recno, true)
        } else if flags.contains(SearchFlags::PAST_EOF) && recno == tree_total + 1 {
            (recno, false)
        } else {
            return Err(QuireError::NotFound);
        };
        let past_eof = !exact;

        let mut before: Recno = 0;
        loop {
            let step = {
                let data = page.data();
                let view = PageView::new(&data[..]);
                match view.page_type()? {
                    PageType::LeafBtree => {
                        let (slot, exact) = leaf_slot(&view, recno - before, past_eof)?;
                        Step::Leaf { slot, exact }
                    }
                    PageType::LeafRecno => {
                        let slot = (recno - before)
                            .checked_sub(1)
                            .map(|slot| slot as usize)
                            .filter(|&slot| slot <= view.num_entries() as usize)
                            .ok_or(QuireError::NotFound)?;
                        Step::Leaf { slot, exact }
                    }
                    PageType::InternalBtree | PageType::InternalRecno => {
                        let top = view.num_entries() as usize;
                        if top == 0 {
                            return Err(QuireError::PageFormat {
                                page_id: view.page_id(),
                                page_type: view.raw_type(),
                            });
                        }
                        let mut nrecs_before = before;
                        let mut indx = 0;
                        let entry = loop {
                            let entry = view.internal(indx);
                            if indx + 1 == top || nrecs_before + entry.nrecs >= recno {
                                break entry;
                            }
                            nrecs_before += entry.nrecs;
                            indx += 1;
                        };
                        Step::Descend {
                            indx,
                            child: entry.child,
                            nrecs_before,
                            level: view.level(),
                        }
                    }
                }
            };

            let (indx, child, nrecs_before, level) = match step {
                Step::Leaf { slot, exact } => {
                    self.push(page, slot, lock);
                    return Ok(Found { recno, exact });
                }
                Step::Descend {
                    indx,
                    child,
                    nrecs_before,
                    level,
                } => (indx, child, nrecs_before, level),
            };
            before = nrecs_before;

            if stack {
                self.push(page, indx, lock);
                if parent && stop == level {
                    return Ok(Found { recno, exact });
                }
                lock = self.lock_page(child, LockMode::Write)?;
            } else {
                // Start stacking at the level above the target.
                if (parent && stop.wrapping_add(1) >= level.wrapping_sub(1))
                    || level.wrapping_sub(1) == LEAF_LEVEL
                {
                    stack = true;
                }
                drop(page);
                let mode = if stack && write {
                    LockMode::Write
                } else {
                    LockMode::Read
                };
                // Couple: take the child before letting go of the parent.
                lock = self.lock_page(child, mode)?;
            }
            page_id = child;
            page = store.fetch(page_id)?;
        }
    }
}
