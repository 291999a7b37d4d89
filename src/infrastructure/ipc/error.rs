use std::path::PathBuf;
use thiserror::Error;

use super::connection::ConnectionId;

/// Errors raised by the agent socket transport.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Failed to bind socket {path}: {source}")]
    Bind {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed frame: {0}")]
    MalformedFrame(String),

    #[error("Frame of {len} bytes exceeds limit of {max} bytes")]
    FrameTooLarge { len: usize, max: usize },

    #[error("Invalid {kind} payload: {reason}")]
    InvalidPayload { kind: String, reason: String },

    #[error("Connection {0} is closed")]
    ConnectionClosed(ConnectionId),

    #[error("Unknown connection {0}")]
    UnknownConnection(ConnectionId),

    #[error("No connection handler registered")]
    NoHandler,

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type TransportResult<T> = Result<T, TransportError>;
