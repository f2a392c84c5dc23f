//! Transport event types
//!
//! Newline-delimited JSON: one event per line. Outbound events are tagged by
//! `type` and use camelCase fields.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::{Rejection, TaskMode};
use crate::planner::{Progress, Question};

/// A message from a client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundEvent {
    /// Omit on first contact; echo the assigned id afterwards to resume
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    pub message: String,
}

impl InboundEvent {
    pub fn new(session_id: Option<String>, message: impl Into<String>) -> Self {
        Self {
            session_id,
            message: message.into(),
        }
    }
}

/// An event sent to a client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum OutboundEvent {
    /// A slot needs an answer
    Question {
        session_id: String,
        task_id: String,
        slot_id: String,
        question_text: String,
        suggestions: Vec<String>,
        progress: Progress,
        optional: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        details: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        rejection: Option<Rejection>,
    },

    /// Required information complete and the executor is working
    Running {
        session_id: String,
        task_id: String,
        progress: Progress,
    },

    Completed {
        session_id: String,
        task_id: String,
        result: Value,
    },

    Failed {
        session_id: String,
        task_id: String,
        reason: String,
    },

    /// A previous message for this session is still being processed
    Busy { session_id: String },

    /// Reply to `/status`
    Status {
        session_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        task_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        mode: Option<TaskMode>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        progress: Option<Progress>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        summary: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        question: Option<Question>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },

    /// Session closed and its task removed
    Closed { session_id: String },

    /// Protocol or storage error; no task state changed
    Error {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        session_id: Option<String>,
        message: String,
    },
}

impl OutboundEvent {
    pub fn question(session_id: &str, task_id: &str, question: Question) -> Self {
        Self::Question {
            session_id: session_id.to_string(),
            task_id: task_id.to_string(),
            slot_id: question.slot_id,
            question_text: question.text,
            suggestions: question.suggestions,
            progress: question.progress,
            optional: question.optional,
            details: question.details,
            rejection: question.rejection,
        }
    }

    pub fn session_id(&self) -> Option<&str> {
        match self {
            Self::Question { session_id, .. }
            | Self::Running { session_id, .. }
            | Self::Completed { session_id, .. }
            | Self::Failed { session_id, .. }
            | Self::Busy { session_id }
            | Self::Status { session_id, .. }
            | Self::Closed { session_id } => Some(session_id),
            Self::Error { session_id, .. } => session_id.as_deref(),
        }
    }

    pub fn task_id(&self) -> Option<&str> {
        match self {
            Self::Question { task_id, .. }
            | Self::Running { task_id, .. }
            | Self::Completed { task_id, .. }
            | Self::Failed { task_id, .. } => Some(task_id),
            Self::Status { task_id, .. } => task_id.as_deref(),
            Self::Busy { .. } | Self::Closed { .. } | Self::Error { .. } => None,
        }
    }

    /// Completed or Failed
    pub fn is_final(&self) -> bool {
        matches!(self, Self::Completed { .. } | Self::Failed { .. })
    }

    /// Whether a `completed` or `failed` event for this reply's task is still to come
    ///
    /// Optional follow-ups are only offered while the task is running.
    pub fn awaits_outcome(&self) -> bool {
        matches!(self, Self::Running { .. } | Self::Question { optional: true, .. })
    }
}
