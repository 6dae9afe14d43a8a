//! WebSocket error types

use thiserror::Error;

/// Errors that can occur while connecting, sending or receiving
#[derive(Debug, Error)]
pub enum WsError {
    #[error("Invalid WebSocket URL: {0}")]
    InvalidUrl(String),

    #[error("Already connected or running")]
    AlreadyConnected,

    #[error("Not connected")]
    NotConnected,

    #[error("Failed to resolve {host}: {reason}")]
    Resolve { host: String, reason: String },

    #[error("Failed to connect to {host}:{port}")]
    Connect { host: String, port: u16 },

    #[error("Handshake failed: {0}")]
    Handshake(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TLS transport error: {0}")]
    Tls(String),

    #[error("Connection closed by peer")]
    Closed,

    #[error("Message of {len} bytes exceeds the {max} byte limit")]
    MessageTooLarge { len: u64, max: usize },
}

impl WsError {
    /// Whether the error means the peer or the network ended the connection
    #[must_use]
    pub const fn is_closed(&self) -> bool {
        matches!(self, Self::Closed | Self::Io(_))
    }
}
