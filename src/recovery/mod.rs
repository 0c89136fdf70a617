//! Log replay.
//!
//! Every record type is owned by a [`RecoveryHandler`] registered with the
//! environment's [`Dispatcher`]. Transaction abort replays one family's
//! records backward; [`recover`] replays the whole log after a crash.

mod dispatch;
mod handlers;
mod recover;

pub use dispatch::*;
pub use handlers::*;
pub use recover::*;
