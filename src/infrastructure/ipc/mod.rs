//! Agent-facing inter-process transport.

pub mod connection;
pub mod error;
pub mod message;
pub mod server;

pub use connection::{ConnectionHandle, ConnectionId};
pub use error::{TransportError, TransportResult};
pub use message::{
    AuthPayload, AuthResponsePayload, IpcMessage, MessageType, PingPayload, ResponseStatus,
    TaskResponsePayload,
};
pub use server::{ConnectionHandler, SocketServer};
