//! Transport server
//!
//! Accepts Unix socket connections and feeds their lines to the [`Agent`].
//! Every inbound line is handled in its own task so a second message for a
//! session that is still being processed gets a `busy` reply.

use std::collections::HashSet;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use eyre::{Context, Result};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::unix::OwnedWriteHalf;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{Mutex, broadcast, mpsc};
use tracing::{debug, info, warn};

use crate::agent::Agent;
use crate::domain::session_id;

use super::MAX_MESSAGE_SIZE;
use super::messages::{InboundEvent, OutboundEvent};

/// Buffered outbound events per connection
const OUTBOUND_BUFFER: usize = 64;

/// One read from a connection
#[derive(Debug, PartialEq)]
enum InboundLine {
    Line(Vec<u8>),
    /// Over `MAX_MESSAGE_SIZE`; consumed and dropped
    TooLong(usize),
    Closed,
}

/// Create a listener at `socket_path`, replacing a stale socket file
pub fn create_listener_at(socket_path: &PathBuf) -> Result<(UnixListener, PathBuf)> {
    debug!(?socket_path, "create_listener_at: creating socket");

    if let Some(parent) = socket_path.parent() {
        std::fs::create_dir_all(parent).context("Failed to create socket directory")?;
    }

    if socket_path.exists() {
        debug!(?socket_path, "create_listener_at: removing stale socket");
        std::fs::remove_file(socket_path).context("Failed to remove stale socket")?;
    }

    let listener = UnixListener::bind(socket_path).context("Failed to bind socket")?;
    debug!(?socket_path, "create_listener_at: socket bound");

    Ok((listener, socket_path.clone()))
}

/// Remove the socket file on shutdown
pub fn cleanup_socket(socket_path: &PathBuf) {
    if socket_path.exists() {
        debug!(?socket_path, "cleanup_socket: removing socket file");
        if let Err(e) = std::fs::remove_file(socket_path) {
            warn!(?socket_path, error = %e, "Failed to remove socket file");
        }
    }
}

/// Accept connections until `shutdown` resolves
pub async fn serve(agent: Agent, listener: UnixListener, shutdown: impl Future<Output = ()>) -> Result<()> {
    info!("Transport server accepting connections");
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, _)) => {
                        debug!("serve: accepted connection");
                        let agent = agent.clone();
                        tokio::spawn(async move {
                            if let Err(e) = handle_connection(agent, stream).await {
                                warn!(error = %e, "Connection ended with error");
                            }
                        });
                    }
                    Err(e) => warn!(error = %e, "Failed to accept connection"),
                }
            }
            _ = &mut shutdown => {
                info!("Transport server shutting down");
                return Ok(());
            }
        }
    }
}

async fn handle_connection(agent: Agent, stream: UnixStream) -> Result<()> {
    let (read_half, write_half) = stream.into_split();
    let (tx, rx) = mpsc::channel::<OutboundEvent>(OUTBOUND_BUFFER);
    let sessions: Arc<Mutex<HashSet<String>>> = Arc::new(Mutex::new(HashSet::new()));

    let writer = tokio::spawn(write_events(write_half, rx));
    let forwarder = tokio::spawn(forward_async_events(agent.subscribe(), Arc::clone(&sessions), tx.clone()));

    let mut reader = BufReader::new(read_half);
    let result = loop {
        let line = match read_bounded_line(&mut reader).await {
            Ok(InboundLine::Line(line)) => line,
            Ok(InboundLine::TooLong(bytes_read)) => {
                let _ = tx
                    .send(OutboundEvent::Error {
                        session_id: None,
                        message: format!("Message too large: {} bytes", bytes_read),
                    })
                    .await;
                continue;
            }
            Ok(InboundLine::Closed) => {
                debug!("handle_connection: client disconnected");
                break Ok(());
            }
            Err(e) => break Err(e).context("Failed to read from connection"),
        };
        if line.iter().all(u8::is_ascii_whitespace) {
            continue;
        }

        let mut event: InboundEvent = match serde_json::from_slice(&line) {
            Ok(event) => event,
            Err(e) => {
                debug!(error = %e, "handle_connection: unparseable line");
                let _ = tx
                    .send(OutboundEvent::Error {
                        session_id: None,
                        message: format!("Invalid message: {}", e),
                    })
                    .await;
                continue;
            }
        };

        // Assign the id here so async events for it are forwarded from the start
        let session = event
            .session_id
            .clone()
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(session_id);
        event.session_id = Some(session.clone());
        sessions.lock().await.insert(session);

        let agent = agent.clone();
        let tx = tx.clone();
        tokio::spawn(async move {
            let outbound = agent.handle(event).await;
            let _ = tx.send(outbound).await;
        });
    };

    forwarder.abort();
    drop(tx);
    // Writer drains once in-flight handlers drop their senders
    let _ = writer.await;
    result
}

/// Read one newline-terminated line without buffering more than
/// `MAX_MESSAGE_SIZE + 1` bytes at a time
async fn read_bounded_line<R: AsyncBufRead + Unpin>(reader: &mut R) -> std::io::Result<InboundLine> {
    let limit = MAX_MESSAGE_SIZE as u64 + 1;
    let mut line = Vec::new();
    let bytes_read = (&mut *reader).take(limit).read_until(b'\n', &mut line).await?;
    if bytes_read == 0 {
        return Ok(InboundLine::Closed);
    }
    if bytes_read <= MAX_MESSAGE_SIZE {
        return Ok(InboundLine::Line(line));
    }

    debug!(bytes_read, "read_bounded_line: oversized line, discarding");
    let mut total = bytes_read;
    let mut ended = line.ends_with(b"\n");
    while !ended {
        line.clear();
        let n = (&mut *reader).take(limit).read_until(b'\n', &mut line).await?;
        if n == 0 {
            break;
        }
        total += n;
        ended = line.ends_with(b"\n");
    }
    Ok(InboundLine::TooLong(total))
}

async fn write_events(mut writer: OwnedWriteHalf, mut rx: mpsc::Receiver<OutboundEvent>) -> Result<()> {
    while let Some(event) = rx.recv().await {
        let json = serde_json::to_string(&event).context("Failed to serialize event")?;
        writer.write_all(json.as_bytes()).await.context("Failed to write event")?;
        writer.write_all(b"\n").await.context("Failed to write newline")?;
        writer.flush().await.context("Failed to flush event")?;
        debug!(?event, "write_events: sent event");
    }
    Ok(())
}

async fn forward_async_events(
    mut events: broadcast::Receiver<OutboundEvent>,
    sessions: Arc<Mutex<HashSet<String>>>,
    tx: mpsc::Sender<OutboundEvent>,
) {
    loop {
        match events.recv().await {
            Ok(event) => {
                let wanted = match event.session_id() {
                    Some(id) => sessions.lock().await.contains(id),
                    None => false,
                };
                if wanted && tx.send(event).await.is_err() {
                    break;
                }
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "Connection fell behind on async events");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_create_listener_creates_parent_dir() {
        let temp = TempDir::new().unwrap();
        let socket_path = temp.path().join("subdir").join("slotflow.sock");

        let (_, path) = create_listener_at(&socket_path).unwrap();
        assert_eq!(path, socket_path);
        assert!(socket_path.exists());
    }

    #[tokio::test]
    async fn test_create_listener_removes_stale_socket() {
        let temp = TempDir::new().unwrap();
        let socket_path = temp.path().join("slotflow.sock");
        std::fs::write(&socket_path, "stale").unwrap();

        assert!(create_listener_at(&socket_path).is_ok());
    }

    #[tokio::test]
    async fn test_oversized_line_is_skipped() {
        let mut input = vec![b'x'; MAX_MESSAGE_SIZE * 3];
        input.extend_from_slice(b"\n{\"message\":\"hi\"}\n");
        let mut reader = &input[..];

        assert_eq!(
            read_bounded_line(&mut reader).await.unwrap(),
            InboundLine::TooLong(MAX_MESSAGE_SIZE * 3 + 1)
        );
        assert_eq!(
            read_bounded_line(&mut reader).await.unwrap(),
            InboundLine::Line(b"{\"message\":\"hi\"}\n".to_vec())
        );
        assert_eq!(read_bounded_line(&mut reader).await.unwrap(), InboundLine::Closed);
    }

    #[tokio::test]
    async fn test_unterminated_last_line_is_returned() {
        let mut reader = &b"{\"message\":\"bye\"}"[..];
        assert_eq!(
            read_bounded_line(&mut reader).await.unwrap(),
            InboundLine::Line(b"{\"message\":\"bye\"}".to_vec())
        );
    }

    #[test]
    fn test_cleanup_socket() {
        let temp = TempDir::new().unwrap();
        let socket_path = temp.path().join("slotflow.sock");
        std::fs::write(&socket_path, "test").unwrap();

        cleanup_socket(&socket_path);
        assert!(!socket_path.exists());

        // Missing file is not an error
        cleanup_socket(&socket_path);
    }
}
