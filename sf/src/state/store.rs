//! CheckpointStore - async handle over the record store

use std::path::Path;
use std::sync::Arc;

use slotstore::{Store, StoreLock, StoreResult};
use tokio::task;
use tracing::{debug, info};

use crate::domain::{Checkpoint, SessionRecord, TaskMode};

use super::messages::{StateError, StateResponse};

/// Lock file name under the store root
const AGENT_LOCK: &str = "agent";

/// Handle to the checkpoint and session-binding records
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    store: Arc<Store>,
}

impl CheckpointStore {
    /// Open (creating if needed) the store rooted at `path`
    pub fn open(path: impl AsRef<Path>) -> StateResponse<Self> {
        debug!(path = %path.as_ref().display(), "CheckpointStore::open: called");
        let store = Store::open(path.as_ref())?;
        info!(root = %store.root().display(), "CheckpointStore opened");
        Ok(Self { store: Arc::new(store) })
    }

    pub fn root(&self) -> &Path {
        self.store.root()
    }

    /// Claim the store for one agent; released when the lock drops
    pub fn lock_exclusive(&self) -> StateResponse<StoreLock> {
        debug!(root = %self.root().display(), "lock_exclusive: called");
        Ok(self.store.try_lock(AGENT_LOCK)?)
    }

    /// Run a store operation on the blocking pool
    async fn blocking<T, F>(&self, op: F) -> StateResponse<T>
    where
        T: Send + 'static,
        F: FnOnce(&Store) -> StoreResult<T> + Send + 'static,
    {
        let store = Arc::clone(&self.store);
        let result = task::spawn_blocking(move || op(&store))
            .await
            .map_err(|e| StateError::TaskJoin(e.to_string()))?;
        Ok(result?)
    }

    /// Overwrite the checkpoint for its task id
    pub async fn save(&self, checkpoint: &Checkpoint) -> StateResponse<()> {
        debug!(task_id = %checkpoint.task_id, mode = %checkpoint.mode, "save: called");
        let checkpoint = checkpoint.clone();
        self.blocking(move |store| store.put(&checkpoint)).await
    }

    pub async fn load(&self, task_id: &str) -> StateResponse<Option<Checkpoint>> {
        debug!(%task_id, "load: called");
        let task_id = task_id.to_string();
        self.blocking(move |store| store.get::<Checkpoint>(&task_id)).await
    }

    /// Load a checkpoint that must exist
    pub async fn require(&self, task_id: &str) -> StateResponse<Checkpoint> {
        self.load(task_id)
            .await?
            .ok_or_else(|| StateError::NotFound(task_id.to_string()))
    }

    /// Returns whether a checkpoint was removed
    pub async fn delete(&self, task_id: &str) -> StateResponse<bool> {
        debug!(%task_id, "delete: called");
        let task_id = task_id.to_string();
        self.blocking(move |store| store.delete::<Checkpoint>(&task_id)).await
    }

    /// All checkpoints, optionally filtered by mode, sorted by task id
    pub async fn list(&self, mode: Option<TaskMode>) -> StateResponse<Vec<Checkpoint>> {
        debug!(?mode, "list: called");
        let mut checkpoints = self.blocking(|store| store.list::<Checkpoint>()).await?;
        if let Some(mode) = mode {
            checkpoints.retain(|c| c.mode == mode);
        }
        Ok(checkpoints)
    }

    /// Point `session_id` at `task_id`, keeping the original creation time
    pub async fn bind_session(&self, session_id: &str, task_id: &str, now_ms: i64) -> StateResponse<()> {
        debug!(%session_id, %task_id, "bind_session: called");
        let session_id = session_id.to_string();
        let task_id = task_id.to_string();
        self.blocking(move |store| {
            let created_at = store
                .get::<SessionRecord>(&session_id)?
                .map(|r| r.created_at)
                .unwrap_or(now_ms);
            store.put(&SessionRecord {
                session_id,
                task_id,
                created_at,
                updated_at: now_ms,
            })
        })
        .await
    }

    /// Task currently bound to `session_id`
    pub async fn session_task(&self, session_id: &str) -> StateResponse<Option<String>> {
        debug!(%session_id, "session_task: called");
        let session_id = session_id.to_string();
        let record = self.blocking(move |store| store.get::<SessionRecord>(&session_id)).await?;
        Ok(record.map(|r| r.task_id))
    }

    pub async fn unbind_session(&self, session_id: &str) -> StateResponse<bool> {
        debug!(%session_id, "unbind_session: called");
        let session_id = session_id.to_string();
        self.blocking(move |store| store.delete::<SessionRecord>(&session_id)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{FilledSlot, SlotValue, TaskKind};
    use tempfile::TempDir;

    fn checkpoint(task_id: &str, mode: TaskMode) -> Checkpoint {
        Checkpoint {
            task_id: task_id.to_string(),
            session_id: "sess-1".to_string(),
            task_kind: TaskKind::Generic,
            mode,
            cursor: None,
            slots: vec![FilledSlot {
                slot_id: "task.details".to_string(),
                value: SlotValue::Text {
                    value: "water plants".to_string(),
                },
            }],
            asked_optional: Vec::new(),
            pending_optional: None,
            result: None,
            reason: None,
            created_at: 1,
            updated_at: 1,
        }
    }

    #[tokio::test]
    async fn test_save_load_delete() {
        let temp = TempDir::new().unwrap();
        let store = CheckpointStore::open(temp.path()).unwrap();

        let cp = checkpoint("task-a", TaskMode::Running);
        store.save(&cp).await.unwrap();
        assert_eq!(store.load("task-a").await.unwrap(), Some(cp.clone()));
        assert_eq!(store.require("task-a").await.unwrap(), cp);

        assert!(store.delete("task-a").await.unwrap());
        assert!(store.load("task-a").await.unwrap().is_none());
        assert!(matches!(store.require("task-a").await, Err(StateError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_save_overwrites() {
        let temp = TempDir::new().unwrap();
        let store = CheckpointStore::open(temp.path()).unwrap();

        store.save(&checkpoint("task-a", TaskMode::Running)).await.unwrap();
        store.save(&checkpoint("task-a", TaskMode::Completed)).await.unwrap();
        assert_eq!(store.require("task-a").await.unwrap().mode, TaskMode::Completed);
        assert_eq!(store.list(None).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_list_filters_by_mode() {
        let temp = TempDir::new().unwrap();
        let store = CheckpointStore::open(temp.path()).unwrap();

        store.save(&checkpoint("task-a", TaskMode::Running)).await.unwrap();
        store.save(&checkpoint("task-b", TaskMode::Failed)).await.unwrap();
        store.save(&checkpoint("task-c", TaskMode::Running)).await.unwrap();

        let running = store.list(Some(TaskMode::Running)).await.unwrap();
        let ids: Vec<&str> = running.iter().map(|c| c.task_id.as_str()).collect();
        assert_eq!(ids, vec!["task-a", "task-c"]);
    }

    #[tokio::test]
    async fn test_session_binding() {
        let temp = TempDir::new().unwrap();
        let store = CheckpointStore::open(temp.path()).unwrap();

        assert!(store.session_task("sess-1").await.unwrap().is_none());
        store.bind_session("sess-1", "task-a", 10).await.unwrap();
        store.bind_session("sess-1", "task-b", 20).await.unwrap();
        assert_eq!(store.session_task("sess-1").await.unwrap().as_deref(), Some("task-b"));

        assert!(store.unbind_session("sess-1").await.unwrap());
        assert!(!store.unbind_session("sess-1").await.unwrap());
    }

    #[tokio::test]
    async fn test_invalid_id_is_store_error() {
        let temp = TempDir::new().unwrap();
        let store = CheckpointStore::open(temp.path()).unwrap();
        assert!(matches!(store.load("../etc").await, Err(StateError::StoreError(_))));
    }
}
