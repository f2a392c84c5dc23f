//! CLI command definitions

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::debug;

use crate::domain::TaskMode;
use crate::transport::get_socket_path;

/// SlotFlow - slot-filling task agent
#[derive(Parser)]
#[command(
    name = "slotflow",
    about = "Turns open-ended task requests into fully specified tasks, one question at a time",
    version
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[arg(
        short = 'l',
        long = "log-level",
        global = true,
        help = "Log level (TRACE, DEBUG, INFO, WARN, ERROR)"
    )]
    pub log_level: Option<String>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// CLI subcommands
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Interactive chat with an in-process agent
    Chat {
        /// Opening request (prompted for when omitted)
        request: Option<String>,

        /// Resume an existing session
        #[arg(short, long)]
        session: Option<String>,
    },

    /// Run the agent behind the Unix socket transport
    Serve {
        /// Socket path (overrides config)
        #[arg(short, long)]
        socket: Option<PathBuf>,
    },

    /// Send one message to a running server
    Send {
        /// Message text (a request, an answer, or a /command)
        message: String,

        /// Session to continue
        #[arg(short = 'S', long)]
        session: Option<String>,

        /// Socket path (overrides config)
        #[arg(short, long)]
        socket: Option<PathBuf>,

        /// Wait for the task's completion or failure event
        #[arg(short, long)]
        follow: bool,
    },

    /// List stored tasks
    Tasks {
        /// Filter by mode (needs_info, running, completed, failed)
        #[arg(short, long)]
        mode: Option<TaskMode>,

        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// Print one task checkpoint as JSON
    Show {
        /// Task ID
        task_id: String,
    },

    /// List task templates and their slots
    Templates {
        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },
}

/// Output format for listing commands
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        debug!(%s, "OutputFormat::from_str: called");
        match s.to_lowercase().as_str() {
            "text" | "plain" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            _ => Err(format!("Unknown format: {}. Use: text or json", s)),
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Text => write!(f, "text"),
            Self::Json => write!(f, "json"),
        }
    }
}

/// Path of the log file
pub fn get_log_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("slotflow")
        .join("logs")
        .join("slotflow.log")
}

/// After-help text with the log location and server status
pub fn generate_after_help() -> String {
    let socket = get_socket_path();
    let server = if socket.exists() {
        format!("listening on {}", socket.display())
    } else {
        "not running".to_string()
    };
    format!(
        "Server: {}\nLogs are written to: {}\n\nIn chat, answer each question or use /status, /reset <slot>, /skip, /cancel, /close.",
        server,
        get_log_path().display()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_send() {
        let cli = Cli::try_parse_from(["slotflow", "send", "Paris", "-S", "sess-1", "--follow"]).unwrap();
        match cli.command {
            Some(Command::Send {
                message,
                session,
                follow,
                socket,
            }) => {
                assert_eq!(message, "Paris");
                assert_eq!(session.as_deref(), Some("sess-1"));
                assert!(follow);
                assert!(socket.is_none());
            }
            other => panic!("expected send, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_tasks_filters() {
        let cli = Cli::try_parse_from(["slotflow", "tasks", "--mode", "running", "--format", "json"]).unwrap();
        match cli.command {
            Some(Command::Tasks { mode, format }) => {
                assert_eq!(mode, Some(TaskMode::Running));
                assert_eq!(format, OutputFormat::Json);
            }
            other => panic!("expected tasks, got {:?}", other),
        }
    }

    #[test]
    fn test_no_command_defaults_to_none() {
        let cli = Cli::try_parse_from(["slotflow", "--log-level", "DEBUG"]).unwrap();
        assert!(cli.command.is_none());
        assert_eq!(cli.log_level.as_deref(), Some("DEBUG"));
    }

    #[test]
    fn test_log_path() {
        assert!(get_log_path().ends_with("slotflow/logs/slotflow.log"));
    }
}
