//! SlotFlow - Slot-Filling Conversational Task Agent
//!
//! CLI entry point for chatting with the agent, serving it over a socket and
//! inspecting stored tasks.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use clap::{CommandFactory, FromArgMatches};
use eyre::{Context, Result};
use tracing::{debug, info, warn};

use slotflow::agent::Agent;
use slotflow::cli::{Cli, Command, OutputFormat, generate_after_help};
use slotflow::config::{Config, ExtractorKind};
use slotflow::domain::{TaskMode, TemplateRegistry};
use slotflow::extract::{KeywordExtractor, PassthroughExtractor, ValueExtractor};
use slotflow::repl;
use slotflow::state::CheckpointStore;
use slotflow::transport::{self, InboundEvent, TransportClient};

/// How long `send --follow` waits for the task to finish
const FOLLOW_TIMEOUT: Duration = Duration::from_secs(300);

fn setup_logging(cli_log_level: Option<&str>, config_log_level: Option<&str>) -> Result<()> {
    // Logging isn't initialized yet, so errors go to stderr
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("slotflow")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    // Priority: CLI --log-level > config file > INFO
    let level = match cli_log_level.or(config_log_level) {
        Some(s) => match s.to_uppercase().as_str() {
            "TRACE" => tracing::Level::TRACE,
            "DEBUG" => tracing::Level::DEBUG,
            "INFO" => tracing::Level::INFO,
            "WARN" | "WARNING" => tracing::Level::WARN,
            "ERROR" => tracing::Level::ERROR,
            _ => {
                eprintln!("Warning: Unknown log-level '{}', defaulting to INFO", s);
                tracing::Level::INFO
            }
        },
        None => tracing::Level::INFO,
    };

    let log_file = fs::File::create(log_dir.join("slotflow.log")).context("Failed to create log file")?;

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_ansi(false)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    info!("Logging initialized (level: {:?})", level);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Build command with dynamic after_help that shows server status
    let cmd = Cli::command().after_help(generate_after_help());
    let cli = Cli::from_arg_matches(&cmd.get_matches())?;

    let config_log_level = Config::load_log_level(cli.config.as_ref());
    setup_logging(cli.log_level.as_deref(), config_log_level.as_deref()).context("Failed to setup logging")?;

    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;
    info!(
        store = %config.storage.store_path().display(),
        extractor = %config.agent.extractor,
        "SlotFlow loaded config"
    );

    debug!(command = ?cli.command, "main: dispatching command");
    match cli.command {
        Some(Command::Chat { request, session }) => {
            debug!(?request, ?session, "main: matched Chat command");
            cmd_chat(&config, session, request).await
        }
        Some(Command::Serve { socket }) => {
            debug!(?socket, "main: matched Serve command");
            cmd_serve(&config, socket).await
        }
        Some(Command::Send {
            message,
            session,
            socket,
            follow,
        }) => {
            debug!(%message, ?session, ?socket, follow, "main: matched Send command");
            cmd_send(&config, message, session, socket, follow).await
        }
        Some(Command::Tasks { mode, format }) => {
            debug!(?mode, %format, "main: matched Tasks command");
            cmd_tasks(&config, mode, format).await
        }
        Some(Command::Show { task_id }) => {
            debug!(%task_id, "main: matched Show command");
            cmd_show(&config, &task_id).await
        }
        Some(Command::Templates { format }) => {
            debug!(%format, "main: matched Templates command");
            cmd_templates(format)
        }
        None => {
            debug!("main: no command specified, starting chat");
            cmd_chat(&config, None, None).await
        }
    }
}

fn open_store(config: &Config) -> Result<CheckpointStore> {
    let path = config.storage.store_path();
    CheckpointStore::open(&path).context(format!("Failed to open store at {}", path.display()))
}

/// Build the store's only agent and finalize tasks interrupted by a previous run
async fn build_agent(config: &Config) -> Result<Agent> {
    let extractor: Arc<dyn ValueExtractor> = match config.agent.extractor {
        ExtractorKind::Keyword => Arc::new(KeywordExtractor),
        ExtractorKind::Passthrough => Arc::new(PassthroughExtractor),
    };

    let store_path = config.storage.store_path();
    let agent = Agent::builder(open_store(config)?)
        .extractor(extractor)
        .config(config.agent.to_agent_config())
        .build_exclusive()
        .context(format!(
            "Store at {} is in use; is another slotflow chat or serve running?",
            store_path.display()
        ))?;

    let stats = agent.recover_interrupted().await.context("Failed to recover interrupted tasks")?;
    info!("Recovery complete ({})", stats);
    Ok(agent)
}

/// Interactive chat with an in-process agent
async fn cmd_chat(config: &Config, session: Option<String>, request: Option<String>) -> Result<()> {
    debug!(?session, ?request, "cmd_chat: called");
    let agent = build_agent(config).await?;
    repl::run_interactive(agent, session, request).await
}

/// Serve the agent on a Unix socket until SIGINT or SIGTERM
async fn cmd_serve(config: &Config, socket: Option<PathBuf>) -> Result<()> {
    debug!(?socket, "cmd_serve: called");
    let socket_path = socket.unwrap_or_else(|| config.server.socket_path());
    let agent = build_agent(config).await?;

    let (listener, socket_path) = transport::create_listener_at(&socket_path)?;
    println!("SlotFlow listening on {}", socket_path.display());

    let result = transport::serve(agent, listener, shutdown_signal()).await;

    debug!("cmd_serve: cleaning up socket");
    transport::cleanup_socket(&socket_path);
    result
}

async fn shutdown_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    let (mut sigint, mut sigterm) = match (signal(SignalKind::interrupt()), signal(SignalKind::terminate())) {
        (Ok(sigint), Ok(sigterm)) => (sigint, sigterm),
        _ => {
            warn!("Failed to install signal handlers, falling back to ctrl_c");
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };

    tokio::select! {
        _ = sigint.recv() => warn!("SIGINT received"),
        _ = sigterm.recv() => warn!("SIGTERM received"),
    }
}

/// Send one message to a running server and print the replies as JSON lines
async fn cmd_send(
    config: &Config,
    message: String,
    session: Option<String>,
    socket: Option<PathBuf>,
    follow: bool,
) -> Result<()> {
    debug!(%message, ?session, follow, "cmd_send: called");
    let socket_path = socket.unwrap_or_else(|| config.server.socket_path());
    let client = TransportClient::with_socket_path(socket_path.clone());

    if !client.socket_exists() {
        return Err(eyre::eyre!(
            "SlotFlow server is not running (no socket at {}). Start it with: slotflow serve",
            socket_path.display()
        ));
    }

    let mut connection = client.connect().await?;
    connection.send(&InboundEvent::new(session, message)).await?;

    let reply = connection
        .next_event(Duration::from_secs(30))
        .await?
        .ok_or_else(|| eyre::eyre!("Connection closed before a reply arrived"))?;
    println!("{}", serde_json::to_string(&reply)?);

    if !follow || !reply.awaits_outcome() {
        return Ok(());
    }

    debug!("cmd_send: following task until it finishes");
    while let Some(event) = connection.next_event(FOLLOW_TIMEOUT).await? {
        println!("{}", serde_json::to_string(&event)?);
        if event.is_final() {
            break;
        }
    }
    Ok(())
}

/// List stored tasks
async fn cmd_tasks(config: &Config, mode: Option<TaskMode>, format: OutputFormat) -> Result<()> {
    debug!(?mode, %format, "cmd_tasks: called");
    let store = open_store(config)?;
    let mut checkpoints = store.list(mode).await?;
    checkpoints.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&checkpoints)?);
        }
        OutputFormat::Text => {
            if checkpoints.is_empty() {
                println!("No tasks found.");
                return Ok(());
            }
            println!("{:<40} {:<12} {:<16} {:<7} {:<20}", "ID", "MODE", "KIND", "SLOTS", "UPDATED");
            for checkpoint in &checkpoints {
                println!(
                    "{:<40} {:<12} {:<16} {:<7} {:<20}",
                    checkpoint.task_id,
                    checkpoint.mode.to_string(),
                    checkpoint.task_kind.to_string(),
                    checkpoint.slots.len(),
                    format_millis(checkpoint.updated_at)
                );
            }
        }
    }
    Ok(())
}

/// Print one task checkpoint as JSON
async fn cmd_show(config: &Config, task_id: &str) -> Result<()> {
    debug!(%task_id, "cmd_show: called");
    let store = open_store(config)?;
    let checkpoint = store.require(task_id).await?;
    println!("{}", serde_json::to_string_pretty(&checkpoint)?);
    Ok(())
}

/// List templates and their slots
fn cmd_templates(format: OutputFormat) -> Result<()> {
    debug!(%format, "cmd_templates: called");
    let registry = TemplateRegistry::builtin();

    match format {
        OutputFormat::Json => {
            let templates: Vec<_> = registry
                .iter()
                .map(|template| {
                    serde_json::json!({
                        "kind": template.kind,
                        "goal": template.goal,
                        "slots": template.slots.iter().map(|slot| serde_json::json!({
                            "id": slot.id,
                            "label": slot.label,
                            "type": slot.slot_type(),
                            "required": slot.required,
                        })).collect::<Vec<_>>(),
                    })
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&templates)?);
        }
        OutputFormat::Text => {
            for template in registry.iter() {
                println!("{} - {}", template.kind, template.goal);
                for slot in &template.slots {
                    let marker = if slot.required { "required" } else { "optional" };
                    println!(
                        "    {:<28} {:<10} {:<9} {}",
                        slot.id,
                        slot.slot_type().to_string(),
                        marker,
                        slot.label
                    );
                }
                println!();
            }
        }
    }
    Ok(())
}

fn format_millis(millis: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(millis)
        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| millis.to_string())
}
