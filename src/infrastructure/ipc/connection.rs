use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};

use super::error::{TransportError, TransportResult};
use super::message::IpcMessage;

pub type ConnectionId = u64;

/// Cloneable handle to one accepted agent connection.
///
/// Outbound messages are queued on a bounded channel drained by the
/// connection's writer task. Closing flips a watch flag that both the reader
/// and the writer observe.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    id: ConnectionId,
    outbound: mpsc::Sender<IpcMessage>,
    authenticated: Arc<AtomicBool>,
    closed: Arc<watch::Sender<bool>>,
}

impl ConnectionHandle {
    /// Create a handle and the receiving end of its outbound queue.
    pub fn new(id: ConnectionId, buffer: usize) -> (Self, mpsc::Receiver<IpcMessage>) {
        let (outbound, rx) = mpsc::channel(buffer.max(1));
        let (closed, _) = watch::channel(false);
        let handle = Self {
            id,
            outbound,
            authenticated: Arc::new(AtomicBool::new(false)),
            closed: Arc::new(closed),
        };
        (handle, rx)
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Queue a message for the writer task.
    ///
    /// Queuing a successful `auth_response` authenticates the connection.
    pub async fn send(&self, msg: IpcMessage) -> TransportResult<()> {
        if self.is_closed() {
            return Err(TransportError::ConnectionClosed(self.id));
        }
        let authenticates = msg.is_successful_auth_response();
        self.outbound
            .send(msg)
            .await
            .map_err(|_| TransportError::ConnectionClosed(self.id))?;
        if authenticates {
            self.authenticated.store(true, Ordering::SeqCst);
        }
        Ok(())
    }

    pub fn close(&self) {
        self.closed.send_replace(true);
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }

    pub fn is_authenticated(&self) -> bool {
        self.authenticated.load(Ordering::SeqCst)
    }

    /// Receiver that resolves once the connection is closed.
    pub fn close_signal(&self) -> watch::Receiver<bool> {
        self.closed.subscribe()
    }
}
