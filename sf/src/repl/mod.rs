//! Interactive chat REPL
//!
//! Talks to an in-process [`Agent`]; answers, requests and session commands
//! are typed at the prompt.

mod render;
mod session;

pub use render::render_event;
pub use session::ChatSession;

use eyre::Result;

use crate::agent::Agent;

/// Run the interactive chat
///
/// This is the entry point for `slotflow chat`.
pub async fn run_interactive(agent: Agent, session_id: Option<String>, initial_request: Option<String>) -> Result<()> {
    let mut session = ChatSession::new(agent, session_id);
    session.run(initial_request).await
}
