//! Persisted snapshots: task checkpoints and session bindings

use serde::{Deserialize, Serialize};
use serde_json::Value;
use slotstore::Record;

use super::task::TaskMode;
use super::template::TaskKind;
use super::value::SlotValue;

/// One filled slot, in the order it was filled
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilledSlot {
    pub slot_id: String,
    pub value: SlotValue,
}

/// Serializable snapshot of a task
///
/// `slots` is in fill order, which carries no meaning; index by `slot_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Checkpoint {
    pub task_id: String,
    pub session_id: String,
    pub task_kind: TaskKind,
    pub mode: TaskMode,
    /// Required slot awaiting an answer
    pub cursor: Option<String>,
    pub slots: Vec<FilledSlot>,

    /// Optional slots already asked (each is asked at most once)
    #[serde(default)]
    pub asked_optional: Vec<String>,

    /// Optional slot awaiting an answer while the task runs
    #[serde(default)]
    pub pending_optional: Option<String>,

    /// Executor result, once COMPLETED
    #[serde(default)]
    pub result: Option<Value>,

    /// Failure reason, once FAILED
    #[serde(default)]
    pub reason: Option<String>,

    /// Creation timestamp (Unix milliseconds)
    pub created_at: i64,

    /// Last update timestamp (Unix milliseconds)
    pub updated_at: i64,
}

impl Record for Checkpoint {
    fn id(&self) -> &str {
        &self.task_id
    }

    fn collection_name() -> &'static str {
        "checkpoints"
    }

    fn updated_at(&self) -> i64 {
        self.updated_at
    }
}

/// Binds a transport session to its current task
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    pub session_id: String,
    pub task_id: String,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Record for SessionRecord {
    fn id(&self) -> &str {
        &self.session_id
    }

    fn collection_name() -> &'static str {
        "sessions"
    }

    fn updated_at(&self) -> i64 {
        self.updated_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checkpoint_layout_is_camel_case() {
        let checkpoint = Checkpoint {
            task_id: "task-1".to_string(),
            session_id: "sess-1".to_string(),
            task_kind: TaskKind::FlightBooking,
            mode: TaskMode::NeedsInfo,
            cursor: Some("trip.destination".to_string()),
            slots: vec![FilledSlot {
                slot_id: "trip.origin".to_string(),
                value: SlotValue::Text {
                    value: "New York".to_string(),
                },
            }],
            asked_optional: Vec::new(),
            pending_optional: None,
            result: None,
            reason: None,
            created_at: 1,
            updated_at: 2,
        };

        let json = serde_json::to_value(&checkpoint).unwrap();
        assert_eq!(json["taskId"], "task-1");
        assert_eq!(json["taskKind"], "flight_booking");
        assert_eq!(json["mode"], "NEEDS_INFO");
        assert_eq!(json["cursor"], "trip.destination");
        assert_eq!(json["slots"][0]["slotId"], "trip.origin");
        assert_eq!(json["slots"][0]["value"]["value"], "New York");
        assert_eq!(json["createdAt"], 1);
        assert_eq!(json["updatedAt"], 2);
    }

    #[test]
    fn test_checkpoint_tolerates_missing_optional_fields() {
        let json = r#"{
            "taskId": "task-1",
            "sessionId": "sess-1",
            "taskKind": "generic",
            "mode": "COMPLETED",
            "cursor": null,
            "slots": [],
            "createdAt": 1,
            "updatedAt": 1
        }"#;
        let checkpoint: Checkpoint = serde_json::from_str(json).unwrap();
        assert_eq!(checkpoint.mode, TaskMode::Completed);
        assert!(checkpoint.asked_optional.is_empty());
        assert!(checkpoint.result.is_none());
    }
}
