//! Record-number trees.
//!
//! Internal pages cache, per child, the number of live records below it;
//! the root also caches the tree total. Lookups by record number descend by
//! summing those counts, and every insert or delete walks the search stack
//! to keep them exact.

mod adjust;
mod cursor;
pub mod page;
mod rsearch;
mod tree;

pub use adjust::total;
pub(crate) use cursor::log_change;
pub use cursor::{Cursor, SearchFlags, StackFrame};
pub use page::{InternalEntry, LeafEntry, PageType, PageView, PageViewMut};
pub use rsearch::Found;
pub use tree::{RecnoTree, Record, TreeBuilder};
