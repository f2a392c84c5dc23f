//! Task state machine
//!
//! Synchronous transitions over a [`Task`]. Nothing here touches storage or
//! the executor; the runtime persists the task after each successful step.
//!
//! ```text
//! NEEDS_INFO --answer--> NEEDS_INFO      (next required slot)
//! NEEDS_INFO --answer--> RUNNING         (last required slot)
//! RUNNING    --result--> COMPLETED | FAILED
//! any active --cancel/drift--> FAILED
//! ```
//!
//! An optional follow-up asked while RUNNING survives completion, so a late
//! answer is still recorded on the COMPLETED task. No new follow-up is
//! offered after completion.

use chrono::NaiveDate;
use serde_json::Value;
use tracing::{debug, info};

use crate::domain::{Rejection, SlotMap, Task, TaskMode};
use crate::planner::{Question, SlotPlanner};

use super::error::AgentError;

/// What the runtime should do after a transition
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    /// Ask a required slot
    Ask(Question),
    /// Required slots complete: invoke the executor with `slots`
    Execute { slots: SlotMap, follow_up: Option<Question> },
    /// Optional answer handled while RUNNING
    Noted { follow_up: Option<Question> },
}

#[derive(Debug, Clone, Default)]
pub struct StateMachine {
    planner: SlotPlanner,
}

impl StateMachine {
    pub fn new(planner: SlotPlanner) -> Self {
        Self { planner }
    }

    pub fn planner(&self) -> &SlotPlanner {
        &self.planner
    }

    /// Enter the initial mode for a fresh task
    pub fn start(&self, task: &mut Task, today: NaiveDate, now_ms: i64) -> Step {
        debug!(task_id = %task.id(), "start: called");
        self.advance(task, today, now_ms)
    }

    /// Check a restored checkpoint against its template
    pub fn verify_resume(&self, task: &Task) -> Result<(), AgentError> {
        debug!(task_id = %task.id(), mode = %task.mode(), "verify_resume: called");
        let template = task.template();

        if let Some(unknown) = task.checkpoint().slots.iter().find(|s| template.slot(&s.slot_id).is_none()) {
            return Err(AgentError::TemplateDrift(format!("filled slot {} is not in the template", unknown.slot_id)));
        }

        match task.mode() {
            TaskMode::NeedsInfo => {
                let cursor = task
                    .cursor()
                    .ok_or_else(|| AgentError::TemplateDrift("no cursor while waiting for information".to_string()))?;
                let slot = template
                    .slot(cursor)
                    .ok_or_else(|| AgentError::TemplateDrift(format!("cursor {} is not in the template", cursor)))?;
                if !slot.required {
                    return Err(AgentError::TemplateDrift(format!("cursor {} is no longer required", cursor)));
                }
                if task.is_filled(cursor) {
                    return Err(AgentError::TemplateDrift(format!("cursor {} is already filled", cursor)));
                }
            }
            TaskMode::Running | TaskMode::Completed => {
                let pending = task.pending_optional();
                if let Some(pending) = pending.filter(|id| template.slot(id).is_none_or(|s| s.required)) {
                    return Err(AgentError::TemplateDrift(format!(
                        "pending optional slot {} is not an optional slot",
                        pending
                    )));
                }
            }
            TaskMode::Failed => {}
        }
        Ok(())
    }

    /// Apply an answer to the cursor slot
    ///
    /// A rejection leaves `task` untouched.
    pub fn answer(&self, task: &mut Task, raw: &str, today: NaiveDate, now_ms: i64) -> Result<Step, AgentError> {
        debug!(task_id = %task.id(), "answer: called");
        if task.mode() != TaskMode::NeedsInfo {
            return Err(AgentError::InvalidCommand(format!("task is {}, not waiting for an answer", task.mode())));
        }
        let slot = task
            .cursor()
            .and_then(|cursor| task.template().slot(cursor))
            .ok_or_else(|| AgentError::TemplateDrift("cursor does not name a template slot".to_string()))?;

        let value = slot.validate(raw, today).map_err(|rejection| AgentError::Validation {
            slot_id: slot.id.clone(),
            rejection,
        })?;

        let slot_id = slot.id.clone();
        task.fill(&slot_id, value, now_ms);
        Ok(self.advance(task, today, now_ms))
    }

    /// Apply an answer to the pending optional slot while RUNNING or COMPLETED
    ///
    /// The slot is asked once: an invalid answer leaves it absent.
    pub fn answer_optional(&self, task: &mut Task, raw: &str, today: NaiveDate, now_ms: i64) -> Step {
        debug!(task_id = %task.id(), "answer_optional: called");
        let slot = task.pending_optional().and_then(|id| task.template().slot(id));
        if let Some(slot) = slot {
            match slot.validate(raw, today) {
                Ok(value) => {
                    let slot_id = slot.id.clone();
                    task.fill(&slot_id, value, now_ms);
                }
                Err(rejection) => {
                    debug!(slot_id = %slot.id, code = %rejection.code, "answer_optional: rejected, leaving slot absent");
                }
            }
        }
        task.clear_pending_optional();
        Step::Noted {
            follow_up: self.next_follow_up(task, today),
        }
    }

    /// Decline the pending optional slot
    pub fn skip(&self, task: &mut Task, today: NaiveDate) -> Step {
        debug!(task_id = %task.id(), pending = ?task.pending_optional(), "skip: called");
        task.clear_pending_optional();
        Step::Noted {
            follow_up: self.next_follow_up(task, today),
        }
    }

    /// Clear a filled slot on user correction; NEEDS_INFO only
    pub fn reset(&self, task: &mut Task, slot_id: &str, today: NaiveDate, now_ms: i64) -> Result<Step, AgentError> {
        debug!(task_id = %task.id(), %slot_id, "reset: called");
        if task.mode() != TaskMode::NeedsInfo {
            return Err(AgentError::InvalidCommand(format!(
                "cannot reset while task is {}",
                task.mode()
            )));
        }
        if task.template().slot(slot_id).is_none() {
            return Err(AgentError::InvalidCommand(format!("unknown slot: {}", slot_id)));
        }
        if !task.clear(slot_id, now_ms) {
            return Err(AgentError::InvalidCommand(format!("slot {} is not filled", slot_id)));
        }
        Ok(self.advance(task, today, now_ms))
    }

    /// Finalize with the executor result; a pending follow-up stays answerable
    pub fn complete(&self, task: &mut Task, result: Value, now_ms: i64) {
        info!(task_id = %task.id(), pending = ?task.pending_optional(), "Task completed");
        task.set_cursor(None);
        task.set_result(result);
        task.set_mode(TaskMode::Completed, now_ms);
    }

    pub fn fail(&self, task: &mut Task, reason: &str, now_ms: i64) {
        info!(task_id = %task.id(), %reason, "Task failed");
        task.set_cursor(None);
        task.clear_pending_optional();
        task.set_reason(reason);
        task.set_mode(TaskMode::Failed, now_ms);
    }

    /// The question currently awaiting an answer, if any
    pub fn current(&self, task: &Task, today: NaiveDate, rejection: Option<Rejection>) -> Option<Question> {
        let slot_id = match task.mode() {
            TaskMode::NeedsInfo => task.cursor(),
            TaskMode::Running | TaskMode::Completed => task.pending_optional(),
            TaskMode::Failed => None,
        }?;
        let slot = task.template().slot(slot_id)?;
        Some(self.planner.question(task, slot, today, rejection))
    }

    /// Move the cursor to the next required slot, or enter RUNNING
    fn advance(&self, task: &mut Task, today: NaiveDate, now_ms: i64) -> Step {
        if let Some(next) = self.planner.next_required(task) {
            let question = self.planner.question(task, next, today, None);
            let next_id = next.id.clone();
            task.set_cursor(Some(next_id));
            if task.mode() != TaskMode::NeedsInfo {
                task.set_mode(TaskMode::NeedsInfo, now_ms);
            }
            return Step::Ask(question);
        }

        info!(task_id = %task.id(), kind = %task.kind(), "Required information complete, running");
        task.set_cursor(None);
        task.set_mode(TaskMode::Running, now_ms);
        let slots = task.filled();
        Step::Execute {
            slots,
            follow_up: self.offer_optional(task, today),
        }
    }

    /// Further optional questions are only offered while RUNNING
    fn next_follow_up(&self, task: &mut Task, today: NaiveDate) -> Option<Question> {
        match task.mode() {
            TaskMode::Running => self.offer_optional(task, today),
            _ => None,
        }
    }

    /// Mark the next optional slot as asked and build its question
    fn offer_optional(&self, task: &mut Task, today: NaiveDate) -> Option<Question> {
        let slot = self.planner.next_optional(task)?.clone();
        task.mark_optional_asked(&slot.id);
        Some(self.planner.question(task, &slot, today, None))
    }
}
