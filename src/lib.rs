//! Quire - record-number B-trees with nested transactions over a paged store
//!
//! Records are addressed by their position (1-based record number) rather
//! than by key. Internal pages cache how many live records sit below each
//! child, so a lookup descends by counting, and every insert or delete
//! corrects those counts on the way back up.
//!
//! # Architecture
//!
//! - **Storage** (`storage`): the page file and its I/O thread
//! - **Buffer Pool** (`buffer`): LRU-K page cache that honours write-ahead
//!   logging before writing a page out
//! - **Locks** (`lock`): page locks with transaction-family awareness and
//!   deadlock detection
//! - **Log** (`log`): the write-ahead log, its record formats and checkpoint
//!   search
//! - **Index** (`index`): record-number trees, the `rsearch` descent and
//!   count adjustment
//! - **Transactions** (`txn`): nested transactions, commit, abort and
//!   checkpoints
//! - **Recovery** (`recovery`): record dispatch and crash recovery
//!
//! # Example
//!
//! ```rust,no_run
//! use quire::{EnvConfig, Environment, PageType, TxnFlags};
//!
//! let env = Environment::open("data", EnvConfig::default()).unwrap();
//! env.recover().unwrap();
//!
//! let tree = env.create_tree(PageType::LeafRecno).unwrap();
//! let txns = env.txn_manager();
//! let txn = txns.begin(None, TxnFlags::NONE).unwrap();
//! let recno = tree.append(Some(&txn), b"", b"first record").unwrap();
//! txns.commit(&txn, TxnFlags::NONE).unwrap();
//!
//! assert_eq!(tree.get(None, recno).unwrap().data, b"first record");
//! env.close().unwrap();
//! ```

pub mod buffer;
pub mod common;
pub mod env;
pub mod index;
pub mod lock;
pub mod log;
pub mod recovery;
pub mod storage;
pub mod txn;

// Re-export commonly used types at the crate root
pub use common::{EnvConfig, LockerId, Lsn, PageId, QuireError, Recno, Result, TxnId};
pub use env::Environment;
pub use index::{PageType, RecnoTree, Record, SearchFlags, TreeBuilder};
pub use txn::{CheckpointStatus, Txn, TxnFlags, TxnManager};
