//! Checkpoint store errors

use slotstore::StoreError;
use thiserror::Error;

/// Errors from state operations
#[derive(Debug, Error)]
pub enum StateError {
    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Store error: {0}")]
    StoreError(#[from] StoreError),

    #[error("Blocking task failed: {0}")]
    TaskJoin(String),
}

/// Response from state operations
pub type StateResponse<T> = Result<T, StateError>;
