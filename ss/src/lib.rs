//! SlotStore - durable keyed JSON records
//!
//! Every record lives in its own file under `<root>/<collection>/<id>.json`.
//! Writes go to a uniquely named temp file in the same directory, are synced
//! to disk and then renamed over the target, so a reader sees either the old
//! record or the new one, never a partial write.
//!
//! Writers of distinct ids never contend, and concurrent writers of the same
//! id resolve as last-rename-wins. A process that must act on the store
//! alone can take the advisory [`StoreLock`].

mod error;
mod lock;
mod record;
mod store;

pub use error::{StoreError, StoreResult};
pub use lock::StoreLock;
pub use record::Record;
pub use store::Store;
