//! Crash recovery
//!
//! A checkpoint left in RUNNING by a previous process has no live executor.
//! Executors are never re-invoked, so such tasks are finalized as FAILED.

use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::domain::TaskMode;

use super::{CheckpointStore, StateResponse};

/// Failure reason recorded on recovered tasks
pub const INTERRUPTED_REASON: &str = "execution_interrupted";

/// Recovery statistics
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RecoveryStats {
    /// Checkpoints inspected
    pub scanned: usize,
    /// RUNNING checkpoints finalized as FAILED
    pub interrupted: usize,
}

impl std::fmt::Display for RecoveryStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "scanned: {}, interrupted: {}", self.scanned, self.interrupted)
    }
}

/// Finalize every RUNNING checkpoint as FAILED `execution_interrupted`
///
/// Call before any executor is started in this process.
pub async fn recover(store: &CheckpointStore, clock: &dyn Clock) -> StateResponse<RecoveryStats> {
    debug!("recover: called");
    let checkpoints = store.list(None).await?;
    let mut stats = RecoveryStats {
        scanned: checkpoints.len(),
        ..Default::default()
    };

    for mut checkpoint in checkpoints.into_iter().filter(|c| c.mode == TaskMode::Running) {
        warn!(task_id = %checkpoint.task_id, "Found interrupted task, marking failed");
        checkpoint.mode = TaskMode::Failed;
        checkpoint.pending_optional = None;
        checkpoint.reason = Some(INTERRUPTED_REASON.to_string());
        checkpoint.updated_at = clock.now_ms();
        store.save(&checkpoint).await?;
        stats.interrupted += 1;
    }

    info!(%stats, "Recovery scan complete");
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::domain::{Checkpoint, TaskKind};
    use tempfile::TempDir;

    fn checkpoint(task_id: &str, mode: TaskMode) -> Checkpoint {
        Checkpoint {
            task_id: task_id.to_string(),
            session_id: "sess-1".to_string(),
            task_kind: TaskKind::Generic,
            mode,
            cursor: None,
            slots: Vec::new(),
            asked_optional: Vec::new(),
            pending_optional: Some("task.priority".to_string()),
            result: None,
            reason: None,
            created_at: 1,
            updated_at: 1,
        }
    }

    #[tokio::test]
    async fn test_recover_marks_running_failed() {
        let temp = TempDir::new().unwrap();
        let store = CheckpointStore::open(temp.path()).unwrap();
        let clock = FixedClock::at_millis(500);

        store.save(&checkpoint("task-a", TaskMode::Running)).await.unwrap();
        store.save(&checkpoint("task-b", TaskMode::NeedsInfo)).await.unwrap();
        store.save(&checkpoint("task-c", TaskMode::Completed)).await.unwrap();

        let stats = recover(&store, &clock).await.unwrap();
        assert_eq!(stats, RecoveryStats { scanned: 3, interrupted: 1 });

        let recovered = store.require("task-a").await.unwrap();
        assert_eq!(recovered.mode, TaskMode::Failed);
        assert_eq!(recovered.reason.as_deref(), Some(INTERRUPTED_REASON));
        assert!(recovered.pending_optional.is_none());
        assert_eq!(recovered.updated_at, 500);

        assert_eq!(store.require("task-b").await.unwrap().mode, TaskMode::NeedsInfo);
        assert_eq!(store.require("task-c").await.unwrap().mode, TaskMode::Completed);
    }

    #[tokio::test]
    async fn test_recover_empty_store() {
        let temp = TempDir::new().unwrap();
        let store = CheckpointStore::open(temp.path()).unwrap();
        let stats = recover(&store, &FixedClock::at_millis(0)).await.unwrap();
        assert_eq!(stats.to_string(), "scanned: 0, interrupted: 0");
    }
}
