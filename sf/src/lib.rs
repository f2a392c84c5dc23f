//! SlotFlow - Slot-Filling Conversational Task Agent
//!
//! SlotFlow turns an open-ended request ("book me a flight") into a fully
//! specified task by asking for one missing piece of information at a time,
//! validating each answer, and handing the completed slot set to an executor.
//!
//! # Core Concepts
//!
//! - **Templates**: each task kind has an immutable, ordered slot schema
//! - **One question per turn**: the planner always asks the next unfilled required slot
//! - **Checkpoints**: every accepted answer is persisted, so a session resumes exactly
//! - **Modes**: a task is NEEDS_INFO, RUNNING, COMPLETED or FAILED
//!
//! # Modules
//!
//! - [`domain`] - slots, values, templates, tasks and checkpoints
//! - [`planner`] - next-question selection and question text
//! - [`agent`] - state machine and concurrent runtime
//! - [`state`] - checkpoint persistence and startup recovery
//! - [`transport`] - Unix socket server and client
//! - [`config`] - Configuration types and loading
//! - [`cli`] - Command-line interface

pub mod agent;
pub mod cli;
pub mod clock;
pub mod config;
pub mod domain;
pub mod executor;
pub mod extract;
pub mod planner;
pub mod repl;
pub mod state;
pub mod transport;

// Re-export commonly used types
pub use agent::{Agent, AgentBuilder, AgentConfig, AgentError, StateMachine, Step};
pub use clock::{Clock, FixedClock, SystemClock};
pub use config::Config;
pub use domain::{
    Checkpoint, Rejection, RejectionCode, SlotMap, SlotRule, SlotSpec, SlotType, SlotValue, Task, TaskKind, TaskMode,
    Template, TemplateRegistry,
};
pub use executor::{EchoExecutor, ExecutionError, TaskExecutor};
pub use extract::{KeywordExtractor, PassthroughExtractor, ValueExtractor};
pub use planner::{Progress, Question, SlotPlanner};
pub use state::{CheckpointStore, RecoveryStats, StateError, StateResponse, recover};
pub use transport::{InboundEvent, OutboundEvent, TransportClient};
