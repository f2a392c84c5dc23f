//! Advisory whole-store lock
//!
//! Record writes never need it. It exists for processes that must be the
//! only one acting on a store, e.g. one that owns in-flight work recorded in
//! it. The lock is an OS file lock, so it is released when the holder exits,
//! however it exits.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use tracing::debug;

use crate::error::{StoreError, StoreResult};

/// Held exclusive lock on a store; released on drop
#[derive(Debug)]
pub struct StoreLock {
    file: File,
    path: PathBuf,
}

impl StoreLock {
    /// Take the lock at `path` without blocking
    ///
    /// The lock file is created if missing and never removed, so every
    /// holder locks the same inode.
    pub(crate) fn acquire(path: &Path) -> StoreResult<Self> {
        debug!(path = %path.display(), "StoreLock::acquire: called");
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .map_err(|e| StoreError::io(path, e))?;

        match file.try_lock_exclusive() {
            Ok(()) => {
                debug!(path = %path.display(), "StoreLock::acquire: locked");
                Ok(Self {
                    file,
                    path: path.to_path_buf(),
                })
            }
            Err(e) if e.kind() == fs2::lock_contended_error().kind() => Err(StoreError::Locked(path.to_path_buf())),
            Err(e) => Err(StoreError::io(path, e)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for StoreLock {
    fn drop(&mut self) {
        debug!(path = %self.path.display(), "StoreLock: released");
        let _ = FileExt::unlock(&self.file);
    }
}
