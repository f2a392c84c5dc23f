//! Checkpoint persistence
//!
//! [`CheckpointStore`] wraps a `slotstore::Store` and runs its blocking file
//! I/O off the async runtime. The store is the only state shared between
//! sessions.

mod messages;
mod recovery;
mod store;

pub use messages::{StateError, StateResponse};
pub use recovery::{INTERRUPTED_REASON, RecoveryStats, recover};
pub use store::CheckpointStore;
