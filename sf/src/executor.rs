//! Task executors
//!
//! An executor consumes a fully filled slot set and produces a result. It is
//! invoked once per task, when the last required slot is filled.

use async_trait::async_trait;
use serde_json::{Value, json};
use thiserror::Error;
use tracing::debug;

use crate::domain::{SlotMap, TaskKind};

/// Executor failure; `reason` is recorded verbatim on the failed task
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{reason}")]
pub struct ExecutionError {
    pub reason: String,
}

impl ExecutionError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self { reason: reason.into() }
    }
}

#[async_trait]
pub trait TaskExecutor: Send + Sync {
    async fn execute(&self, kind: TaskKind, slots: &SlotMap) -> Result<Value, ExecutionError>;
}

/// Returns a JSON summary of the slots it was given
#[derive(Debug, Clone, Copy, Default)]
pub struct EchoExecutor;

#[async_trait]
impl TaskExecutor for EchoExecutor {
    async fn execute(&self, kind: TaskKind, slots: &SlotMap) -> Result<Value, ExecutionError> {
        debug!(%kind, slot_count = slots.len(), "EchoExecutor::execute: called");
        let summary = slots
            .iter()
            .map(|(id, value)| format!("{}={}", id, value))
            .collect::<Vec<_>>()
            .join(", ");
        let slots = serde_json::to_value(slots).map_err(|e| ExecutionError::new(format!("serialize slots: {}", e)))?;
        Ok(json!({
            "kind": kind,
            "slots": slots,
            "summary": summary,
        }))
    }
}
