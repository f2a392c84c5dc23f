//! Record trait for anything the store persists

use serde::Serialize;
use serde::de::DeserializeOwned;

/// A persistable record, addressed by collection name and id
pub trait Record: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Unique id within the collection (used as the file stem)
    fn id(&self) -> &str;

    /// Collection (directory) name
    fn collection_name() -> &'static str;

    /// Last update timestamp (Unix milliseconds)
    fn updated_at(&self) -> i64;
}
