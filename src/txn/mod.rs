//! Nested transactions.
//!
//! A [`TxnManager`] hands out [`Txn`] handles, keeps the active set in a
//! fixed-capacity region, and drives commit, abort and checkpoints. A child
//! transaction's outcome is folded into its parent's: its locks pass to the
//! parent at commit and its work is undone with the parent's on abort.

mod family;
mod manager;
mod region;
mod txnlist;

pub use family::FamilyLsns;
pub use manager::{CheckpointStatus, Txn, TxnFlags, TxnManager};
pub use region::{ActiveTxn, DetailId, TxnStat, TxnStatus};
pub use txnlist::{FileMarker, TxnList};
