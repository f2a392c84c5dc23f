//! Agent error taxonomy

use thiserror::Error;

use crate::domain::Rejection;
use crate::state::{INTERRUPTED_REASON, StateError};

#[derive(Debug, Error)]
pub enum AgentError {
    /// Answer failed validation; the slot is re-asked
    #[error("Invalid answer for {slot_id}: {rejection}")]
    Validation { slot_id: String, rejection: Rejection },

    /// Checkpoint no longer matches its template
    #[error("Template drift: {0}")]
    TemplateDrift(String),

    #[error("Execution timed out")]
    ExecutionTimeout,

    /// Executor reported failure; the reason is kept verbatim
    #[error("Execution failed: {0}")]
    ExecutionFailure(String),

    /// RUNNING task with no live executor in this process
    #[error("Execution interrupted")]
    ExecutionInterrupted,

    #[error("Task cancelled")]
    Cancelled,

    /// Another message for the session is being processed
    #[error("Session {0} is busy")]
    ConcurrentAccess(String),

    #[error("Invalid command: {0}")]
    InvalidCommand(String),

    #[error(transparent)]
    State(#[from] StateError),
}

impl AgentError {
    /// Reason string recorded on a FAILED checkpoint
    pub fn reason(&self) -> String {
        match self {
            Self::Validation { rejection, .. } => rejection.code.to_string(),
            Self::TemplateDrift(_) => "template_drift".to_string(),
            Self::ExecutionTimeout => "execution_timeout".to_string(),
            Self::ExecutionFailure(reason) => reason.clone(),
            Self::ExecutionInterrupted => INTERRUPTED_REASON.to_string(),
            Self::Cancelled => "cancelled".to_string(),
            Self::ConcurrentAccess(_) => "busy".to_string(),
            Self::InvalidCommand(_) => "invalid_command".to_string(),
            Self::State(_) => "storage_error".to_string(),
        }
    }

    /// Recoverable errors leave the task in its current mode
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Validation { .. } | Self::ConcurrentAccess(_) | Self::InvalidCommand(_) | Self::State(_)
        )
    }
}
