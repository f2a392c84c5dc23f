//! Terminal rendering of outbound events

use colored::Colorize;

use crate::domain::TaskMode;
use crate::planner::{Progress, Question};
use crate::transport::OutboundEvent;

pub fn render_event(event: &OutboundEvent) -> String {
    match event {
        OutboundEvent::Question {
            question_text,
            suggestions,
            progress,
            details,
            rejection,
            ..
        } => {
            let mut out = String::new();
            if let Some(rejection) = rejection {
                out.push_str(&format!("{} {}\n", "✗".red(), rejection.message.red()));
            }
            out.push_str(&format!("{} {}", format!("[{}]", progress).dimmed(), question_text.bold()));
            if let Some(details) = details {
                out.push_str(&format!("\n  {}", details.dimmed()));
            }
            if !suggestions.is_empty() {
                out.push_str(&format!("\n  {} {}", "suggestions:".dimmed(), suggestions.join(" | ").cyan()));
            }
            out
        }
        OutboundEvent::Running { progress, .. } => {
            format!("{} All required information collected ({}). Working on it...", "▶".green(), progress)
        }
        OutboundEvent::Completed { result, .. } => {
            let body = result
                .get("summary")
                .and_then(|s| s.as_str())
                .map(str::to_string)
                .unwrap_or_else(|| result.to_string());
            format!("{} Done: {}", "✓".green().bold(), body)
        }
        OutboundEvent::Failed { reason, .. } => format!("{} Task failed: {}", "✗".red().bold(), reason.red()),
        OutboundEvent::Busy { .. } => format!("{} Still working on your previous message", "…".yellow()),
        OutboundEvent::Status {
            task_id,
            mode,
            progress,
            summary,
            question,
            reason,
            ..
        } => render_status(task_id.as_deref(), *mode, *progress, summary.as_deref(), question.as_ref(), reason.as_deref()),
        OutboundEvent::Closed { .. } => format!("{} Session closed", "■".dimmed()),
        OutboundEvent::Error { message, .. } => format!("{} {}", "!".yellow().bold(), message.yellow()),
    }
}

fn render_status(
    task_id: Option<&str>,
    mode: Option<TaskMode>,
    progress: Option<Progress>,
    summary: Option<&str>,
    question: Option<&Question>,
    reason: Option<&str>,
) -> String {
    let (Some(task_id), Some(mode)) = (task_id, mode) else {
        return "No active task. Describe what you need.".dimmed().to_string();
    };
    let mut lines = vec![format!("{} {} ({})", "Task".bold(), task_id, mode.to_string().cyan())];
    if let Some(progress) = progress {
        lines.push(format!("  progress: {}", progress));
    }
    if let Some(summary) = summary {
        lines.push(format!("  {}", summary));
    }
    if let Some(question) = question {
        lines.push(format!("  waiting for: {}", question.slot_id));
    }
    if let Some(reason) = reason {
        lines.push(format!("  reason: {}", reason));
    }
    lines.join("\n")
}
