//! SlotFlow configuration types and loading

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::agent::AgentConfig;
use crate::planner::DEFAULT_MAX_SUGGESTIONS;

/// Main SlotFlow configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR); the CLI flag wins
    #[serde(rename = "log-level")]
    pub log_level: Option<String>,

    /// Agent behaviour
    pub agent: AgentSettings,

    /// Storage configuration
    pub storage: StorageConfig,

    /// Socket transport configuration
    pub server: ServerConfig,
}

impl Config {
    /// Load configuration with fallback chain
    ///
    /// Explicit path, then `./.slotflow.yml`, then
    /// `<config_dir>/slotflow/slotflow.yml`, then defaults.
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        for candidate in Self::candidates() {
            if candidate.exists() {
                match Self::load_from_file(&candidate) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        tracing::warn!("Failed to load config from {}: {}", candidate.display(), e);
                    }
                }
            }
        }

        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Read just the log level, before logging is initialized
    pub fn load_log_level(config_path: Option<&PathBuf>) -> Option<String> {
        match config_path {
            Some(path) => Self::load_from_file(path).ok()?.log_level,
            None => Self::candidates()
                .into_iter()
                .filter(|p| p.exists())
                .find_map(|p| Self::load_from_file(&p).ok())
                .and_then(|c| c.log_level),
        }
    }

    fn candidates() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from(".slotflow.yml")];
        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join("slotflow").join("slotflow.yml"));
        }
        paths
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;
        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;
        tracing::debug!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }
}

/// Which value extractor the agent uses
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractorKind {
    #[default]
    Keyword,
    Passthrough,
}

impl fmt::Display for ExtractorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Keyword => write!(f, "keyword"),
            Self::Passthrough => write!(f, "passthrough"),
        }
    }
}

impl FromStr for ExtractorKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "keyword" => Ok(Self::Keyword),
            "passthrough" => Ok(Self::Passthrough),
            _ => Err(format!("Unknown extractor: {}. Use: keyword, passthrough", s)),
        }
    }
}

/// Agent configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentSettings {
    /// Bound on one executor invocation
    #[serde(rename = "execution-timeout-ms")]
    pub execution_timeout_ms: u64,

    /// Cap on suggestions per question
    #[serde(rename = "max-suggestions")]
    pub max_suggestions: usize,

    pub extractor: ExtractorKind,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            execution_timeout_ms: 120_000,
            max_suggestions: DEFAULT_MAX_SUGGESTIONS,
            extractor: ExtractorKind::default(),
        }
    }
}

impl AgentSettings {
    pub fn to_agent_config(&self) -> AgentConfig {
        AgentConfig {
            execution_timeout: Duration::from_millis(self.execution_timeout_ms),
            max_suggestions: self.max_suggestions,
        }
    }
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory for checkpoint and session records
    #[serde(rename = "store-dir")]
    pub store_dir: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        // ~/.local/share/slotflow/store on Linux
        let store_dir = dirs::data_dir()
            .map(|d| d.join("slotflow").join("store"))
            .unwrap_or_else(|| PathBuf::from(".slotflow-store"))
            .to_string_lossy()
            .into_owned();
        Self { store_dir }
    }
}

impl StorageConfig {
    /// Store directory with a leading `~/` expanded
    pub fn store_path(&self) -> PathBuf {
        expand_home(&self.store_dir)
    }
}

/// Socket transport configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Unix socket path; the runtime directory default when unset
    #[serde(rename = "socket-path")]
    pub socket_path: Option<String>,
}

impl ServerConfig {
    pub fn socket_path(&self) -> PathBuf {
        self.socket_path
            .as_deref()
            .map(expand_home)
            .unwrap_or_else(crate::transport::get_socket_path)
    }
}

fn expand_home(path: &str) -> PathBuf {
    match (path.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(path),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.log_level.is_none());
        assert_eq!(config.agent.execution_timeout_ms, 120_000);
        assert_eq!(config.agent.max_suggestions, 5);
        assert_eq!(config.agent.extractor, ExtractorKind::Keyword);
        assert!(config.storage.store_dir.contains("slotflow"));
    }

    #[test]
    fn test_deserialize_config() {
        let yaml = r#"
log-level: DEBUG
agent:
  execution-timeout-ms: 500
  max-suggestions: 3
  extractor: passthrough
storage:
  store-dir: /tmp/slotflow-store
server:
  socket-path: /tmp/slotflow.sock
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.log_level.as_deref(), Some("DEBUG"));
        assert_eq!(config.agent.extractor, ExtractorKind::Passthrough);
        assert_eq!(config.storage.store_path(), PathBuf::from("/tmp/slotflow-store"));
        assert_eq!(config.server.socket_path(), PathBuf::from("/tmp/slotflow.sock"));

        let agent = config.agent.to_agent_config();
        assert_eq!(agent.execution_timeout, Duration::from_millis(500));
        assert_eq!(agent.max_suggestions, 3);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let yaml = "agent:\n  max-suggestions: 2\n";
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.agent.max_suggestions, 2);
        assert_eq!(config.agent.execution_timeout_ms, 120_000);
        assert!(config.server.socket_path.is_none());
    }

    #[test]
    fn test_load_explicit_path() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("slotflow.yml");
        std::fs::write(&path, "log-level: WARN\n").unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.log_level.as_deref(), Some("WARN"));
        assert_eq!(Config::load_log_level(Some(&path)).as_deref(), Some("WARN"));
    }

    #[test]
    fn test_load_explicit_missing_path_fails() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("missing.yml");
        assert!(Config::load(Some(&path)).is_err());
    }

    #[test]
    fn test_extractor_from_str() {
        assert_eq!("Keyword".parse::<ExtractorKind>().unwrap(), ExtractorKind::Keyword);
        assert!("llm".parse::<ExtractorKind>().is_err());
    }

    #[test]
    fn test_expand_home() {
        if let Some(home) = dirs::home_dir() {
            assert_eq!(expand_home("~/store"), home.join("store"));
        }
        assert_eq!(expand_home("/abs/store"), PathBuf::from("/abs/store"));
    }
}
