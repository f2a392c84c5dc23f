//! Task domain type
//!
//! A [`Task`] pairs an immutable [`Template`] with its mutable [`Checkpoint`].
//! The checkpoint is the whole persisted state, so restoring one reconstructs
//! the task exactly.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use super::checkpoint::{Checkpoint, FilledSlot};
use super::template::{TaskKind, Template, TemplateRegistry};
use super::value::SlotValue;

/// Filled slot values keyed by slot id
pub type SlotMap = BTreeMap<String, SlotValue>;

/// Task mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskMode {
    /// Waiting for required information
    #[default]
    NeedsInfo,
    /// Executor invoked
    Running,
    /// Executor reported success
    Completed,
    /// Executor failure, cancellation, timeout or invariant violation
    Failed,
}

impl TaskMode {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NeedsInfo => "NEEDS_INFO",
            Self::Running => "RUNNING",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
        }
    }
}

impl fmt::Display for TaskMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for TaskMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().replace('-', "_").as_str() {
            "NEEDS_INFO" => Ok(Self::NeedsInfo),
            "RUNNING" => Ok(Self::Running),
            "COMPLETED" => Ok(Self::Completed),
            "FAILED" => Ok(Self::Failed),
            _ => Err(format!(
                "Unknown mode: {}. Use: needs_info, running, completed, failed",
                s
            )),
        }
    }
}

/// One instantiated request bound to a template
#[derive(Debug, Clone)]
pub struct Task {
    template: Arc<Template>,
    state: Checkpoint,
}

impl Task {
    /// Create a fresh task; the state machine decides the initial mode and cursor
    pub fn new(
        task_id: impl Into<String>,
        session_id: impl Into<String>,
        template: Arc<Template>,
        now_ms: i64,
    ) -> Self {
        let task_id = task_id.into();
        debug!(%task_id, kind = %template.kind, "Task::new: called");
        let state = Checkpoint {
            task_id,
            session_id: session_id.into(),
            task_kind: template.kind,
            mode: TaskMode::NeedsInfo,
            cursor: None,
            slots: Vec::new(),
            asked_optional: Vec::new(),
            pending_optional: None,
            result: None,
            reason: None,
            created_at: now_ms,
            updated_at: now_ms,
        };
        Self { template, state }
    }

    /// Rebuild a task from its checkpoint
    ///
    /// No consistency checks happen here; see `StateMachine::verify_resume`.
    pub fn restore(checkpoint: Checkpoint, registry: &TemplateRegistry) -> Self {
        debug!(task_id = %checkpoint.task_id, "Task::restore: called");
        let template = Arc::clone(registry.get(checkpoint.task_kind));
        Self {
            template,
            state: checkpoint,
        }
    }

    pub fn checkpoint(&self) -> &Checkpoint {
        &self.state
    }

    pub fn into_checkpoint(self) -> Checkpoint {
        self.state
    }

    pub fn template(&self) -> &Template {
        &self.template
    }

    pub fn id(&self) -> &str {
        &self.state.task_id
    }

    pub fn session_id(&self) -> &str {
        &self.state.session_id
    }

    pub fn kind(&self) -> TaskKind {
        self.state.task_kind
    }

    pub fn mode(&self) -> TaskMode {
        self.state.mode
    }

    pub fn cursor(&self) -> Option<&str> {
        self.state.cursor.as_deref()
    }

    pub fn pending_optional(&self) -> Option<&str> {
        self.state.pending_optional.as_deref()
    }

    pub fn result(&self) -> Option<&Value> {
        self.state.result.as_ref()
    }

    pub fn reason(&self) -> Option<&str> {
        self.state.reason.as_deref()
    }

    pub fn value(&self, slot_id: &str) -> Option<&SlotValue> {
        self.state
            .slots
            .iter()
            .find(|s| s.slot_id == slot_id)
            .map(|s| &s.value)
    }

    pub fn is_filled(&self, slot_id: &str) -> bool {
        self.value(slot_id).is_some()
    }

    pub fn was_asked_optional(&self, slot_id: &str) -> bool {
        self.state.asked_optional.iter().any(|id| id == slot_id)
    }

    /// All filled values keyed by slot id
    pub fn filled(&self) -> SlotMap {
        self.state
            .slots
            .iter()
            .map(|s| (s.slot_id.clone(), s.value.clone()))
            .collect()
    }

    pub(crate) fn fill(&mut self, slot_id: &str, value: SlotValue, now_ms: i64) {
        debug!(task_id = %self.state.task_id, %slot_id, "Task::fill: called");
        self.state.slots.retain(|s| s.slot_id != slot_id);
        self.state.slots.push(FilledSlot {
            slot_id: slot_id.to_string(),
            value,
        });
        self.touch(now_ms);
    }

    pub(crate) fn clear(&mut self, slot_id: &str, now_ms: i64) -> bool {
        debug!(task_id = %self.state.task_id, %slot_id, "Task::clear: called");
        let before = self.state.slots.len();
        self.state.slots.retain(|s| s.slot_id != slot_id);
        let removed = self.state.slots.len() != before;
        if removed {
            self.touch(now_ms);
        }
        removed
    }

    pub(crate) fn set_cursor(&mut self, cursor: Option<String>) {
        self.state.cursor = cursor;
    }

    pub(crate) fn set_mode(&mut self, mode: TaskMode, now_ms: i64) {
        debug!(task_id = %self.state.task_id, from = %self.state.mode, to = %mode, "Task::set_mode: called");
        self.state.mode = mode;
        self.touch(now_ms);
    }

    pub(crate) fn mark_optional_asked(&mut self, slot_id: &str) {
        if !self.was_asked_optional(slot_id) {
            self.state.asked_optional.push(slot_id.to_string());
        }
        self.state.pending_optional = Some(slot_id.to_string());
    }

    pub(crate) fn clear_pending_optional(&mut self) {
        self.state.pending_optional = None;
    }

    pub(crate) fn set_result(&mut self, result: Value) {
        self.state.result = Some(result);
    }

    pub(crate) fn set_reason(&mut self, reason: impl Into<String>) {
        self.state.reason = Some(reason.into());
    }

    fn touch(&mut self, now_ms: i64) {
        self.state.updated_at = now_ms;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flight_task() -> Task {
        let registry = TemplateRegistry::builtin();
        Task::new(
            "task-1",
            "sess-1",
            Arc::clone(registry.get(TaskKind::FlightBooking)),
            100,
        )
    }

    #[test]
    fn test_new_task_defaults() {
        let task = flight_task();
        assert_eq!(task.mode(), TaskMode::NeedsInfo);
        assert!(task.cursor().is_none());
        assert!(task.filled().is_empty());
        assert_eq!(task.checkpoint().created_at, 100);
    }

    #[test]
    fn test_fill_replaces_and_touches() {
        let mut task = flight_task();
        let paris = SlotValue::Text {
            value: "Paris".to_string(),
        };
        task.fill("trip.origin", SlotValue::Text { value: "Rome".to_string() }, 200);
        task.fill("trip.origin", paris.clone(), 300);

        assert_eq!(task.value("trip.origin"), Some(&paris));
        assert_eq!(task.checkpoint().slots.len(), 1);
        assert_eq!(task.checkpoint().updated_at, 300);
    }

    #[test]
    fn test_clear() {
        let mut task = flight_task();
        task.fill("trip.origin", SlotValue::Text { value: "Rome".to_string() }, 200);
        assert!(task.clear("trip.origin", 300));
        assert!(!task.clear("trip.origin", 400));
        assert!(!task.is_filled("trip.origin"));
        assert_eq!(task.checkpoint().updated_at, 300);
    }

    #[test]
    fn test_restore_roundtrip() {
        let registry = TemplateRegistry::builtin();
        let mut task = flight_task();
        task.fill("trip.origin", SlotValue::Text { value: "Rome".to_string() }, 200);
        task.set_cursor(Some("trip.destination".to_string()));

        let checkpoint = task.checkpoint().clone();
        let restored = Task::restore(checkpoint.clone(), &registry);
        assert_eq!(restored.checkpoint(), &checkpoint);
        assert_eq!(restored.template().kind, TaskKind::FlightBooking);
    }

    #[test]
    fn test_mode_parse_and_terminal() {
        assert_eq!("needs_info".parse::<TaskMode>().unwrap(), TaskMode::NeedsInfo);
        assert_eq!("Failed".parse::<TaskMode>().unwrap(), TaskMode::Failed);
        assert!("paused".parse::<TaskMode>().is_err());
        assert!(TaskMode::Completed.is_terminal());
        assert!(!TaskMode::Running.is_terminal());
    }
}
