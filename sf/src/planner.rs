//! Slot planner
//!
//! Chooses which slot to ask about next and phrases the question. Required
//! slots are exhausted in template order before any optional slot is
//! considered; each optional slot is offered at most once.

use std::fmt;

use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::{DATE_FORMAT, Rejection, SlotRule, SlotSpec, Task, format_number};

/// Default cap on suggestions per question
pub const DEFAULT_MAX_SUGGESTIONS: usize = 5;

/// Enum options listed inline in the question text
const INLINE_OPTIONS: usize = 4;

/// Days offered for date slots without explicit suggestions
const DATE_SUGGESTION_DAYS: u64 = 3;

/// Required-slot progress
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Progress {
    pub filled_required: usize,
    pub total_required: usize,
}

impl Progress {
    pub fn is_complete(&self) -> bool {
        self.filled_required >= self.total_required
    }
}

impl fmt::Display for Progress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.filled_required, self.total_required)
    }
}

/// A question for one slot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    pub slot_id: String,
    pub text: String,
    pub suggestions: Vec<String>,
    pub progress: Progress,
    pub optional: bool,
    /// Why the slot is needed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    /// Set when this is a re-ask after a rejected answer
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rejection: Option<Rejection>,
}

#[derive(Debug, Clone)]
pub struct SlotPlanner {
    max_suggestions: usize,
}

impl Default for SlotPlanner {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_SUGGESTIONS)
    }
}

impl SlotPlanner {
    pub fn new(max_suggestions: usize) -> Self {
        Self { max_suggestions }
    }

    pub fn max_suggestions(&self) -> usize {
        self.max_suggestions
    }

    /// First unfilled required slot in template order
    pub fn next_required<'a>(&self, task: &'a Task) -> Option<&'a SlotSpec> {
        let next = task.template().required().find(|s| !task.is_filled(&s.id));
        debug!(task_id = %task.id(), next = ?next.map(|s| &s.id), "next_required: called");
        next
    }

    /// First optional slot that is unfilled and has not been offered yet
    pub fn next_optional<'a>(&self, task: &'a Task) -> Option<&'a SlotSpec> {
        let next = task
            .template()
            .optional()
            .find(|s| !task.is_filled(&s.id) && !task.was_asked_optional(&s.id));
        debug!(task_id = %task.id(), next = ?next.map(|s| &s.id), "next_optional: called");
        next
    }

    pub fn progress(&self, task: &Task) -> Progress {
        let template = task.template();
        Progress {
            filled_required: template.required().filter(|s| task.is_filled(&s.id)).count(),
            total_required: template.required_count(),
        }
    }

    /// Build the question for `slot`, surfacing `rejection` on a re-ask
    pub fn question(&self, task: &Task, slot: &SlotSpec, today: NaiveDate, rejection: Option<Rejection>) -> Question {
        debug!(task_id = %task.id(), slot_id = %slot.id, rejected = rejection.is_some(), "question: called");
        Question {
            slot_id: slot.id.clone(),
            text: question_text(slot),
            suggestions: self.suggestions(slot, today),
            progress: self.progress(task),
            optional: !slot.required,
            details: slot.reason.clone(),
            rejection,
        }
    }

    /// Declared suggestions, or ones derived from the rule, capped
    pub fn suggestions(&self, slot: &SlotSpec, today: NaiveDate) -> Vec<String> {
        let mut suggestions = if !slot.suggestions.is_empty() {
            slot.suggestions.clone()
        } else {
            match &slot.rule {
                SlotRule::Enum { options } => options.clone(),
                SlotRule::Date { .. } => (1..=DATE_SUGGESTION_DAYS)
                    .filter_map(|n| today.checked_add_days(Days::new(n)))
                    .map(|d| d.format(DATE_FORMAT).to_string())
                    .collect(),
                _ => Vec::new(),
            }
        };
        suggestions.truncate(self.max_suggestions);
        suggestions
    }

    /// "So far I have: ..." recap of filled slots, in template order
    pub fn summary(&self, task: &Task) -> Option<String> {
        let parts: Vec<String> = task
            .template()
            .slots
            .iter()
            .filter_map(|s| task.value(&s.id).map(|v| format!("{} = {}", s.label, v)))
            .collect();
        if parts.is_empty() {
            None
        } else {
            Some(format!("So far I have: {}.", parts.join(", ")))
        }
    }
}

fn question_text(slot: &SlotSpec) -> String {
    let label = slot.label.to_lowercase();
    let mut text = match &slot.rule {
        SlotRule::Text => format!("What is the {}?", label),
        SlotRule::Number { min, max, .. } => match (min, max) {
            (Some(lo), Some(hi)) => format!(
                "What is the {}? (enter a number between {} and {})",
                label,
                format_number(*lo),
                format_number(*hi)
            ),
            _ => format!("What is the {}? (enter a number)", label),
        },
        SlotRule::Date { .. } => format!("What is the {}? (YYYY-MM-DD format)", label),
        SlotRule::Enum { options } => {
            let mut shown = options.iter().take(INLINE_OPTIONS).cloned().collect::<Vec<_>>().join(", ");
            if options.len() > INLINE_OPTIONS {
                shown.push_str(&format!(" (or {} more options)", options.len() - INLINE_OPTIONS));
            }
            format!("Choose {}: {}", label, shown)
        }
        SlotRule::Currency => format!("What is your {}? (e.g., 500 USD, 1000 EUR)", label),
    };
    if !slot.required {
        text.push_str(" Optional, reply /skip to leave it out.");
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{SlotValue, TaskKind, TemplateRegistry};
    use std::sync::Arc;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 1, 1).unwrap()
    }

    fn task(kind: TaskKind) -> Task {
        let registry = TemplateRegistry::builtin();
        Task::new("task-1", "sess-1", Arc::clone(registry.get(kind)), 0)
    }

    fn text(v: &str) -> SlotValue {
        SlotValue::Text { value: v.to_string() }
    }

    #[test]
    fn test_next_required_follows_template_order() {
        let planner = SlotPlanner::default();
        let mut task = task(TaskKind::FlightBooking);
        assert_eq!(planner.next_required(&task).unwrap().id, "trip.origin");

        // Filling out of order does not change the ordering rule
        task.fill("trip.destination", text("Paris"), 1);
        assert_eq!(planner.next_required(&task).unwrap().id, "trip.origin");
        task.fill("trip.origin", text("New York"), 2);
        assert_eq!(planner.next_required(&task).unwrap().id, "trip.departure_date");
    }

    #[test]
    fn test_required_before_interleaved_optional() {
        let planner = SlotPlanner::default();
        let mut task = task(TaskKind::Research);
        task.fill("research.topic", text("AI"), 1);
        task.fill("research.depth", SlotValue::Choice { value: "Brief".to_string() }, 2);

        // research.deadline is optional and sits before research.format
        assert_eq!(planner.next_required(&task).unwrap().id, "research.format");
    }

    #[test]
    fn test_next_optional_skips_asked() {
        let planner = SlotPlanner::default();
        let mut task = task(TaskKind::WebAutomation);
        assert_eq!(planner.next_optional(&task).unwrap().id, "automation.schedule");
        task.mark_optional_asked("automation.schedule");
        assert_eq!(planner.next_optional(&task).unwrap().id, "automation.notify");
        task.mark_optional_asked("automation.notify");
        assert!(planner.next_optional(&task).is_none());
    }

    #[test]
    fn test_progress() {
        let planner = SlotPlanner::default();
        let mut task = task(TaskKind::FlightBooking);
        assert_eq!(planner.progress(&task).to_string(), "0/5");
        task.fill("trip.origin", text("New York"), 1);
        task.fill("trip.budget", SlotValue::Currency { amount: 1.0, code: "USD".to_string() }, 2);
        let progress = planner.progress(&task);
        assert_eq!(progress.filled_required, 1);
        assert!(!progress.is_complete());
    }

    #[test]
    fn test_question_hints() {
        let planner = SlotPlanner::default();
        let task = task(TaskKind::FlightBooking);
        let template = task.template();

        let date = planner.question(&task, template.slot("trip.departure_date").unwrap(), today(), None);
        assert!(date.text.contains("(YYYY-MM-DD format)"));
        assert_eq!(date.suggestions, vec!["2025-01-02", "2025-01-03", "2025-01-04"]);
        assert_eq!(date.details.as_deref(), Some("Departure date must be today or in the future"));

        let passengers = planner.question(&task, template.slot("trip.passengers").unwrap(), today(), None);
        assert!(passengers.text.contains("between 1 and 9"));

        let cabin = planner.question(&task, template.slot("trip.cabin_class").unwrap(), today(), None);
        assert_eq!(cabin.text, "Choose cabin class: Economy, Premium Economy, Business, First");
        assert_eq!(cabin.suggestions.len(), 4);

        let budget = planner.question(&task, template.slot("trip.budget").unwrap(), today(), None);
        assert!(budget.optional);
        assert!(budget.text.contains("/skip"));
    }

    #[test]
    fn test_suggestions_capped() {
        let planner = SlotPlanner::new(2);
        let task = task(TaskKind::FlightBooking);
        let origin = task.template().slot("trip.origin").unwrap();
        assert_eq!(planner.suggestions(origin, today()), vec!["New York", "London"]);
    }

    #[test]
    fn test_summary() {
        let planner = SlotPlanner::default();
        let mut task = task(TaskKind::FlightBooking);
        assert!(planner.summary(&task).is_none());
        task.fill("trip.destination", text("Paris"), 1);
        task.fill("trip.origin", text("Rome"), 2);
        assert_eq!(
            planner.summary(&task).unwrap(),
            "So far I have: Departure City = Rome, Destination City = Paris."
        );
    }
}
