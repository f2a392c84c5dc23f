//! Unix domain socket transport
//!
//! Clients send one [`InboundEvent`] per line and receive one
//! [`OutboundEvent`] per line. A connection also receives the asynchronous
//! completion and failure events of every session it has spoken for.

use std::path::PathBuf;

pub mod client;
pub mod messages;
pub mod server;

pub use client::{Connection, TransportClient};
pub use messages::{InboundEvent, OutboundEvent};
pub use server::{cleanup_socket, create_listener_at, serve};

/// Longest accepted line, in bytes
pub const MAX_MESSAGE_SIZE: usize = 64 * 1024;

/// Default socket path
pub fn get_socket_path() -> PathBuf {
    dirs::runtime_dir()
        .or_else(dirs::data_local_dir)
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join("slotflow")
        .join("slotflow.sock")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_socket_path_ends_with_slotflow_sock() {
        let path = get_socket_path();
        assert!(path.ends_with("slotflow/slotflow.sock"));
    }
}
