//! Agent state machine and runtime
//!
//! - [`StateMachine`] - pure mode transitions over a task
//! - [`Agent`] - concurrent, checkpointed driver for many sessions

mod error;
mod machine;
mod runtime;

pub use error::AgentError;
pub use machine::{StateMachine, Step};
pub use runtime::{Agent, AgentBuilder, AgentConfig, DEFAULT_EXECUTION_TIMEOUT};
