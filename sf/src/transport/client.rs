//! Transport client
//!
//! Used by the `send` CLI command and the integration tests.

use std::path::PathBuf;
use std::time::Duration;

use eyre::{Context, Result};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tracing::debug;

use super::messages::{InboundEvent, OutboundEvent};
use super::{MAX_MESSAGE_SIZE, get_socket_path};

/// Default timeout for connect and request/reply
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct TransportClient {
    socket_path: PathBuf,
    timeout: Duration,
}

impl Default for TransportClient {
    fn default() -> Self {
        Self::new()
    }
}

impl TransportClient {
    /// Client for the default socket path
    pub fn new() -> Self {
        Self::with_socket_path(get_socket_path())
    }

    pub fn with_socket_path(socket_path: PathBuf) -> Self {
        Self {
            socket_path,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn socket_exists(&self) -> bool {
        self.socket_path.exists()
    }

    pub async fn connect(&self) -> Result<Connection> {
        debug!(socket_path = ?self.socket_path, "TransportClient::connect: called");
        let stream = tokio::time::timeout(self.timeout, UnixStream::connect(&self.socket_path))
            .await
            .context("Connection timeout")?
            .context("Failed to connect to slotflow socket")?;
        let (read_half, write_half) = stream.into_split();
        Ok(Connection {
            reader: BufReader::new(read_half),
            writer: write_half,
            timeout: self.timeout,
        })
    }

    /// Send one event and wait for its reply
    pub async fn request(&self, event: &InboundEvent) -> Result<OutboundEvent> {
        let mut connection = self.connect().await?;
        connection.send(event).await?;
        connection
            .next_event(self.timeout)
            .await?
            .ok_or_else(|| eyre::eyre!("Connection closed before a reply arrived"))
    }
}

/// An open connection; keeps receiving async events until dropped
pub struct Connection {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
    timeout: Duration,
}

impl Connection {
    pub async fn send(&mut self, event: &InboundEvent) -> Result<()> {
        let json = serde_json::to_string(event).context("Failed to serialize message")?;
        if json.len() > MAX_MESSAGE_SIZE {
            return Err(eyre::eyre!("Message too large: {} bytes", json.len()));
        }

        tokio::time::timeout(self.timeout, async {
            self.writer
                .write_all(json.as_bytes())
                .await
                .context("Failed to write message")?;
            self.writer.write_all(b"\n").await.context("Failed to write newline")?;
            self.writer.flush().await.context("Failed to flush stream")?;
            Ok::<_, eyre::Error>(())
        })
        .await
        .context("Write timeout")??;
        debug!(?event, "Connection::send: sent");
        Ok(())
    }

    /// Next event, or `None` when the server closed the connection
    pub async fn next_event(&mut self, wait: Duration) -> Result<Option<OutboundEvent>> {
        let mut line = String::new();
        let bytes_read = tokio::time::timeout(wait, self.reader.read_line(&mut line))
            .await
            .context("Read timeout")?
            .context("Failed to read event")?;

        if bytes_read == 0 {
            return Ok(None);
        }
        if bytes_read > MAX_MESSAGE_SIZE {
            return Err(eyre::eyre!("Event too large: {} bytes", bytes_read));
        }

        let event: OutboundEvent = serde_json::from_str(line.trim()).context("Failed to parse event")?;
        debug!(?event, "Connection::next_event: received");
        Ok(Some(event))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_client_default_path() {
        let client = TransportClient::default();
        assert!(client.socket_path.ends_with("slotflow.sock"));
    }

    #[test]
    fn test_client_with_timeout() {
        let client = TransportClient::new().with_timeout(Duration::from_secs(10));
        assert_eq!(client.timeout, Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_connect_missing_socket_fails() {
        let temp = TempDir::new().unwrap();
        let client = TransportClient::with_socket_path(temp.path().join("missing.sock"));
        assert!(!client.socket_exists());
        assert!(client.connect().await.is_err());
    }
}
