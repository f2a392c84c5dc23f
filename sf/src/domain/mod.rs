//! Domain types for SlotFlow
//!
//! - [`SlotSpec`] / [`SlotValue`] - slot definitions and validated values
//! - [`Template`] / [`TemplateRegistry`] - immutable slot schemas per [`TaskKind`]
//! - [`Task`] - one instantiated request, persisted as a [`Checkpoint`]

mod checkpoint;
mod id;
mod slot;
mod task;
mod template;
mod value;

pub use checkpoint::{Checkpoint, FilledSlot, SessionRecord};
pub use id::{generate_id, session_id, task_id};
pub use slot::{SlotRule, SlotSpec, SlotType};
pub use task::{SlotMap, Task, TaskMode};
pub use template::{TaskKind, Template, TemplateRegistry};
pub use value::{DATE_FORMAT, Rejection, RejectionCode, SlotValue, format_number};
