//! Chat session loop

use std::time::Duration;

use colored::Colorize;
use eyre::Result;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use tokio::sync::broadcast;
use tracing::debug;

use crate::agent::Agent;
use crate::transport::{InboundEvent, OutboundEvent};

use super::render::render_event;

/// How long the chat waits for a running task before returning to the prompt
const COMPLETION_WAIT: Duration = Duration::from_secs(30);

/// Interactive chat against an in-process agent
pub struct ChatSession {
    agent: Agent,
    session_id: Option<String>,
    events: broadcast::Receiver<OutboundEvent>,
}

enum LocalCommand {
    Continue,
    Quit,
    Forward,
}

impl ChatSession {
    pub fn new(agent: Agent, session_id: Option<String>) -> Self {
        let events = agent.subscribe();
        Self {
            agent,
            session_id,
            events,
        }
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    /// Run the chat main loop
    pub async fn run(&mut self, initial_request: Option<String>) -> Result<()> {
        self.print_welcome();

        if let Some(request) = initial_request {
            println!("{} {}", ">".bright_green(), request);
            self.send(&request).await;
        }

        let mut rl = DefaultEditor::new().map_err(|e| eyre::eyre!("Failed to initialize readline: {}", e))?;

        loop {
            self.print_async_events();
            let readline = rl.readline(&format!("{} ", ">".bright_green()));

            match readline {
                Ok(line) => {
                    let input = line.trim();
                    if input.is_empty() {
                        continue;
                    }
                    let _ = rl.add_history_entry(input);

                    match self.local_command(input) {
                        LocalCommand::Continue => continue,
                        LocalCommand::Quit => break,
                        LocalCommand::Forward => self.send(input).await,
                    }
                }
                Err(ReadlineError::Interrupted) => {
                    println!("^C");
                    continue;
                }
                Err(ReadlineError::Eof) => {
                    println!();
                    break;
                }
                Err(err) => {
                    return Err(eyre::eyre!("Readline error: {}", err));
                }
            }
        }

        if let Some(session_id) = &self.session_id {
            println!("Resume later with: {} {}", "slotflow chat --session".dimmed(), session_id);
        }
        println!("Goodbye!");
        Ok(())
    }

    fn print_welcome(&self) {
        println!();
        println!("{}", "SlotFlow".bright_cyan().bold());
        println!("Describe a task and answer the questions.");
        println!("Type {} for help, {} to quit", "/help".yellow(), "/quit".yellow());
        println!();
    }

    fn local_command(&self, input: &str) -> LocalCommand {
        match input {
            "/help" | "/h" => {
                self.print_help();
                LocalCommand::Continue
            }
            "/quit" | "/q" | "/exit" => LocalCommand::Quit,
            _ => LocalCommand::Forward,
        }
    }

    fn print_help(&self) {
        println!("{}", "Commands:".bold());
        println!("  {}          Show the current task and pending question", "/status".yellow());
        println!("  {}  Clear an earlier answer and re-ask it", "/reset <slot-id>".yellow());
        println!("  {}            Decline the optional question", "/skip".yellow());
        println!("  {}          Cancel the active task", "/cancel".yellow());
        println!("  {}           Forget a finished task", "/close".yellow());
        println!("  {}            Leave the chat", "/quit".yellow());
    }

    /// Send one line to the agent and print the reply
    async fn send(&mut self, input: &str) {
        let reply = self
            .agent
            .handle(InboundEvent::new(self.session_id.clone(), input))
            .await;
        debug!(?reply, "ChatSession::send: reply");

        if self.session_id.is_none() {
            self.session_id = reply.session_id().map(str::to_string);
        }
        if matches!(reply, OutboundEvent::Closed { .. }) {
            self.session_id = None;
        }

        println!("{}", render_event(&reply));
        if matches!(reply, OutboundEvent::Running { .. }) {
            self.wait_for_completion().await;
        }
    }

    /// Block until the session's task finishes or the wait runs out
    async fn wait_for_completion(&mut self) {
        let deadline = tokio::time::sleep(COMPLETION_WAIT);
        tokio::pin!(deadline);
        loop {
            tokio::select! {
                received = self.events.recv() => match received {
                    Ok(event) if belongs_to(self.session_id.as_deref(), &event) => {
                        println!("{}", render_event(&event));
                        return;
                    }
                    Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => return,
                },
                _ = &mut deadline => {
                    println!("{}", "Still running; the result will appear at the next prompt.".dimmed());
                    return;
                }
            }
        }
    }

    fn print_async_events(&mut self) {
        while let Ok(event) = self.events.try_recv() {
            if belongs_to(self.session_id.as_deref(), &event) {
                println!("{}", render_event(&event));
            }
        }
    }
}

fn belongs_to(session_id: Option<&str>, event: &OutboundEvent) -> bool {
    session_id.is_some() && event.session_id() == session_id
}
