//! File-backed record store

use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::{StoreError, StoreResult};
use crate::lock::StoreLock;
use crate::record::Record;

const RECORD_EXT: &str = "json";

/// Store rooted at a directory, one subdirectory per collection
#[derive(Debug, Clone)]
pub struct Store {
    root: PathBuf,
}

impl Store {
    /// Open (and create if needed) a store rooted at `root`
    pub fn open(root: impl AsRef<Path>) -> StoreResult<Self> {
        let root = root.as_ref().to_path_buf();
        debug!(root = %root.display(), "Store::open: called");
        fs::create_dir_all(&root).map_err(|e| StoreError::io(&root, e))?;
        Ok(Self { root })
    }

    /// Root directory of the store
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path where a record with this id is (or would be) stored
    pub fn path_for<R: Record>(&self, id: &str) -> StoreResult<PathBuf> {
        validate_id(id)?;
        Ok(self.collection_dir::<R>().join(format!("{}.{}", id, RECORD_EXT)))
    }

    /// Insert or overwrite a record
    pub fn put<R: Record>(&self, record: &R) -> StoreResult<()> {
        let id = record.id();
        debug!(%id, collection = R::collection_name(), "Store::put: called");
        let path = self.path_for::<R>(id)?;

        let content = serde_json::to_vec_pretty(record).map_err(|e| StoreError::Serialization {
            id: id.to_string(),
            source: e,
        })?;

        atomic_write(&path, &content)
    }

    /// Fetch a record by id
    pub fn get<R: Record>(&self, id: &str) -> StoreResult<Option<R>> {
        debug!(%id, collection = R::collection_name(), "Store::get: called");
        let path = self.path_for::<R>(id)?;

        let content = match fs::read(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(%id, "Store::get: record not found");
                return Ok(None);
            }
            Err(e) => return Err(StoreError::io(&path, e)),
        };

        serde_json::from_slice(&content)
            .map(Some)
            .map_err(|e| StoreError::Serialization {
                id: id.to_string(),
                source: e,
            })
    }

    /// Delete a record, returning whether it existed
    pub fn delete<R: Record>(&self, id: &str) -> StoreResult<bool> {
        debug!(%id, collection = R::collection_name(), "Store::delete: called");
        let path = self.path_for::<R>(id)?;

        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StoreError::io(&path, e)),
        }
    }

    /// List every record in a collection, ordered by id
    ///
    /// Files that fail to parse are skipped with a warning.
    pub fn list<R: Record>(&self) -> StoreResult<Vec<R>> {
        let dir = self.collection_dir::<R>();
        debug!(dir = %dir.display(), "Store::list: called");

        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StoreError::io(&dir, e)),
        };

        let mut paths = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| StoreError::io(&dir, e))?;
            let path = entry.path();
            let is_record = path.extension().is_some_and(|ext| ext == RECORD_EXT)
                && !entry.file_name().to_string_lossy().starts_with('.');
            if is_record {
                paths.push(path);
            }
        }
        paths.sort();

        let mut records = Vec::with_capacity(paths.len());
        for path in paths {
            let content = match fs::read(&path) {
                Ok(content) => content,
                // Deleted between read_dir and read
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(StoreError::io(&path, e)),
            };
            match serde_json::from_slice::<R>(&content) {
                Ok(record) => records.push(record),
                Err(e) => warn!(path = %path.display(), error = %e, "Skipping unreadable record"),
            }
        }

        Ok(records)
    }

    /// Take the exclusive advisory lock named `name` under the root
    ///
    /// Fails with [`StoreError::Locked`] while another holder has it.
    pub fn try_lock(&self, name: &str) -> StoreResult<StoreLock> {
        validate_id(name)?;
        StoreLock::acquire(&self.root.join(format!("{}.lock", name)))
    }

    fn collection_dir<R: Record>(&self) -> PathBuf {
        self.root.join(R::collection_name())
    }
}

/// Ids become file stems, so they must not escape the collection directory
fn validate_id(id: &str) -> StoreResult<()> {
    let valid = !id.is_empty()
        && !id.starts_with('.')
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if valid {
        Ok(())
    } else {
        Err(StoreError::InvalidId(id.to_string()))
    }
}

/// Write to a temp file in the target's directory, sync, then rename over the target
fn atomic_write(path: &Path, content: &[u8]) -> StoreResult<()> {
    let parent = path
        .parent()
        .ok_or_else(|| StoreError::InvalidId(path.display().to_string()))?;
    fs::create_dir_all(parent).map_err(|e| StoreError::io(parent, e))?;

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    // Unique per writer so concurrent writers of one id never share a temp file
    let temp_path = parent.join(format!(".{}.{}.tmp", file_name, uuid::Uuid::now_v7().simple()));

    let result = (|| {
        let mut file = File::create(&temp_path).map_err(|e| StoreError::io(&temp_path, e))?;
        file.write_all(content).map_err(|e| StoreError::io(&temp_path, e))?;
        file.sync_all().map_err(|e| StoreError::io(&temp_path, e))?;
        fs::rename(&temp_path, path).map_err(|e| StoreError::io(path, e))
    })();

    if result.is_err() {
        let _ = fs::remove_file(&temp_path);
    }
    result
}
