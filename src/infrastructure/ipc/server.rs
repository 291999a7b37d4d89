//! Unix domain socket server for agent connections.
//!
//! Frames are newline-delimited JSON. Each accepted connection gets its own
//! reader and writer task. The server knows nothing about agents: it frames
//! and types messages, enforces the authentication gate and the malformed
//! frame budget, and hands everything else to a [`ConnectionHandler`].

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{broadcast, mpsc, RwLock};
use tokio::task::JoinHandle;

use super::connection::{ConnectionHandle, ConnectionId};
use super::error::{TransportError, TransportResult};
use super::message::{decode, encode, IpcMessage, MessageType};
use crate::domain::models::TransportConfig;

/// Receives connection lifecycle events and authenticated traffic.
#[async_trait]
pub trait ConnectionHandler: Send + Sync + 'static {
    /// A connection was accepted; it is not authenticated yet.
    async fn on_connect(&self, _connection: &ConnectionHandle) {}

    /// A well-formed message passed the authentication gate.
    async fn on_message(&self, connection: &ConnectionHandle, message: IpcMessage);

    /// The connection is gone, for whatever reason.
    async fn on_disconnect(&self, _connection: &ConnectionHandle) {}
}

enum Frame {
    Line(Vec<u8>),
    TooLarge(usize),
    Eof,
}

/// Read one newline-terminated frame of at most `max` bytes.
///
/// An oversized frame is consumed up to its newline and reported.
async fn read_frame<R>(reader: &mut R, max: usize, buf: &mut Vec<u8>) -> std::io::Result<Frame>
where
    R: AsyncBufRead + Unpin,
{
    let limit = u64::try_from(max).unwrap_or(u64::MAX).saturating_add(1);
    buf.clear();
    let n = (&mut *reader).take(limit).read_until(b'\n', buf).await?;
    if n == 0 {
        return Ok(Frame::Eof);
    }
    if buf.last() == Some(&b'\n') {
        buf.pop();
        if buf.last() == Some(&b'\r') {
            buf.pop();
        }
        return Ok(Frame::Line(std::mem::take(buf)));
    }
    if n <= max {
        // Final frame without a trailing newline.
        return Ok(Frame::Line(std::mem::take(buf)));
    }

    let mut total = n;
    loop {
        buf.clear();
        let n = (&mut *reader).take(limit).read_until(b'\n', buf).await?;
        total += n;
        if n == 0 || buf.last() == Some(&b'\n') {
            break;
        }
    }
    Ok(Frame::TooLarge(total))
}

struct Shared {
    config: TransportConfig,
    handler: Arc<dyn ConnectionHandler>,
    connections: RwLock<HashMap<ConnectionId, ConnectionHandle>>,
    next_id: AtomicU64,
    shutdown_tx: broadcast::Sender<()>,
}

/// Local socket listener for agent processes.
pub struct SocketServer {
    config: TransportConfig,
    handler: Option<Arc<dyn ConnectionHandler>>,
    shared: Option<Arc<Shared>>,
    shutdown_tx: broadcast::Sender<()>,
}

impl SocketServer {
    pub fn new(config: TransportConfig) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            config,
            handler: None,
            shared: None,
            shutdown_tx,
        }
    }

    /// Register the handler that receives connection events.
    pub fn on_connection(&mut self, handler: Arc<dyn ConnectionHandler>) {
        self.handler = Some(handler);
    }

    pub fn socket_path(&self) -> &Path {
        &self.config.socket_path
    }

    /// Bind the socket and start accepting connections.
    ///
    /// A stale socket file at the configured path is removed first. The
    /// returned handle resolves once the server has shut down.
    pub async fn listen(&mut self) -> TransportResult<JoinHandle<()>> {
        let handler = self.handler.clone().ok_or(TransportError::NoHandler)?;
        let path = self.config.socket_path.clone();

        if path.exists() {
            std::fs::remove_file(&path).map_err(|source| TransportError::Bind {
                path: path.clone(),
                source,
            })?;
        }
        let listener = UnixListener::bind(&path).map_err(|source| TransportError::Bind {
            path: path.clone(),
            source,
        })?;

        let shared = Arc::new(Shared {
            config: self.config.clone(),
            handler,
            connections: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            shutdown_tx: self.shutdown_tx.clone(),
        });
        self.shared = Some(shared.clone());

        tracing::info!(socket = %path.display(), "agent socket listening");

        let mut shutdown_rx = self.shutdown_tx.subscribe();
        Ok(tokio::spawn(async move {
            loop {
                tokio::select! {
                    accepted = listener.accept() => match accepted {
                        Ok((stream, _addr)) => {
                            let shared = shared.clone();
                            tokio::spawn(async move { shared.serve(stream).await });
                        }
                        Err(e) => {
                            tracing::error!(error = %e, "failed to accept agent connection");
                        }
                    },
                    _ = shutdown_rx.recv() => {
                        tracing::info!("agent socket shutting down");
                        break;
                    }
                }
            }

            let open: Vec<ConnectionHandle> =
                shared.connections.read().await.values().cloned().collect();
            for conn in open {
                conn.close();
            }
            if let Err(e) = std::fs::remove_file(&path) {
                tracing::debug!(error = %e, "socket file already gone");
            }
        }))
    }

    /// Queue a message on a live connection.
    pub async fn send(&self, connection: ConnectionId, message: IpcMessage) -> TransportResult<()> {
        self.connection(connection).await?.send(message).await
    }

    /// Close a live connection.
    pub async fn close(&self, connection: ConnectionId) -> TransportResult<()> {
        self.connection(connection).await?.close();
        Ok(())
    }

    pub async fn connection_count(&self) -> usize {
        match &self.shared {
            Some(shared) => shared.connections.read().await.len(),
            None => 0,
        }
    }

    /// Stop accepting and close every connection.
    pub fn shutdown(&self) {
        if self.shutdown_tx.send(()).is_err() {
            tracing::debug!("shutdown requested with no listeners");
        }
    }

    /// Subscribe to the server's shutdown signal.
    pub fn shutdown_signal(&self) -> broadcast::Receiver<()> {
        self.shutdown_tx.subscribe()
    }

    async fn connection(&self, id: ConnectionId) -> TransportResult<ConnectionHandle> {
        let shared = self
            .shared
            .as_ref()
            .ok_or(TransportError::UnknownConnection(id))?;
        shared
            .connections
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(TransportError::UnknownConnection(id))
    }
}

impl Shared {
    async fn serve(self: Arc<Self>, stream: UnixStream) {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (conn, outbound_rx) = ConnectionHandle::new(id, self.config.outbound_buffer);
        let (read_half, write_half) = stream.into_split();

        self.connections.write().await.insert(id, conn.clone());
        tracing::debug!(connection = id, "agent connection accepted");

        let writer = tokio::spawn(write_loop(conn.clone(), write_half, outbound_rx));
        self.handler.on_connect(&conn).await;
        self.read_loop(&conn, read_half).await;

        conn.close();
        if let Err(e) = writer.await {
            tracing::warn!(connection = id, error = %e, "writer task failed");
        }
        self.connections.write().await.remove(&id);
        self.handler.on_disconnect(&conn).await;
        tracing::debug!(connection = id, "agent connection closed");
    }

    async fn read_loop(&self, conn: &ConnectionHandle, read_half: OwnedReadHalf) {
        let mut reader = BufReader::new(read_half);
        let mut close_rx = conn.close_signal();
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let mut buf = Vec::new();
        let mut parse_failures: u32 = 0;
        let max_frame = self.config.max_frame_bytes;

        loop {
            let frame = tokio::select! {
                frame = read_frame(&mut reader, max_frame, &mut buf) => frame,
                _ = close_rx.changed() => break,
                _ = shutdown_rx.recv() => break,
            };

            let message = match frame {
                Ok(Frame::Eof) => break,
                Err(e) => {
                    tracing::warn!(connection = conn.id(), error = %e, "agent connection read failed");
                    break;
                }
                Ok(Frame::TooLarge(len)) => Err(TransportError::FrameTooLarge {
                    len,
                    max: max_frame,
                }),
                Ok(Frame::Line(line)) => {
                    if line.iter().all(u8::is_ascii_whitespace) {
                        continue;
                    }
                    decode(&line)
                }
            };

            let message = match message {
                Ok(message) => {
                    parse_failures = 0;
                    message
                }
                Err(e) => {
                    parse_failures += 1;
                    tracing::warn!(
                        connection = conn.id(),
                        error = %e,
                        consecutive = parse_failures,
                        "dropping malformed frame"
                    );
                    if parse_failures >= self.config.max_parse_failures {
                        tracing::warn!(
                            connection = conn.id(),
                            "closing connection after repeated malformed frames"
                        );
                        break;
                    }
                    continue;
                }
            };

            if !conn.is_authenticated() {
                match message.kind {
                    MessageType::Auth => {}
                    MessageType::TaskResponse => {
                        tracing::warn!(
                            connection = conn.id(),
                            "task_response before authentication, closing connection"
                        );
                        break;
                    }
                    other => {
                        tracing::warn!(
                            connection = conn.id(),
                            kind = %other,
                            "dropping message from unauthenticated connection"
                        );
                        continue;
                    }
                }
            }

            self.handler.on_message(conn, message).await;
        }
    }
}

async fn write_loop(
    conn: ConnectionHandle,
    mut write_half: OwnedWriteHalf,
    mut outbound_rx: mpsc::Receiver<IpcMessage>,
) {
    let mut close_rx = conn.close_signal();
    loop {
        let message = tokio::select! {
            biased;
            message = outbound_rx.recv() => match message {
                Some(message) => message,
                None => break,
            },
            _ = close_rx.changed() => break,
        };

        let frame = match encode(&message) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::error!(connection = conn.id(), error = %e, "failed to encode message");
                continue;
            }
        };
        if let Err(e) = write_half.write_all(&frame).await {
            tracing::warn!(connection = conn.id(), error = %e, "agent connection write failed");
            conn.close();
            break;
        }
    }
    if let Err(e) = write_half.shutdown().await {
        tracing::debug!(connection = conn.id(), error = %e, "socket shutdown failed");
    }
}

/// Default socket path for a configuration directory.
pub fn socket_in(dir: &Path) -> PathBuf {
    dir.join("agents.sock")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[tokio::test]
    async fn test_read_frame_splits_lines() {
        let mut reader = BufReader::new(Cursor::new(b"{\"a\":1}\r\n{\"b\":2}\nlast".to_vec()));
        let mut buf = Vec::new();

        assert!(matches!(read_frame(&mut reader, 64, &mut buf).await.unwrap(), Frame::Line(l) if l == b"{\"a\":1}"));
        assert!(matches!(read_frame(&mut reader, 64, &mut buf).await.unwrap(), Frame::Line(l) if l == b"{\"b\":2}"));
        assert!(matches!(read_frame(&mut reader, 64, &mut buf).await.unwrap(), Frame::Line(l) if l == b"last"));
        assert!(matches!(read_frame(&mut reader, 64, &mut buf).await.unwrap(), Frame::Eof));
    }

    #[tokio::test]
    async fn test_read_frame_skips_oversized_line() {
        let mut input = vec![b'x'; 100];
        input.extend_from_slice(b"\nok\n");
        let mut reader = BufReader::new(Cursor::new(input));
        let mut buf = Vec::new();

        assert!(matches!(read_frame(&mut reader, 16, &mut buf).await.unwrap(), Frame::TooLarge(101)));
        assert!(matches!(read_frame(&mut reader, 16, &mut buf).await.unwrap(), Frame::Line(l) if l == b"ok"));
    }

    #[tokio::test]
    async fn test_listen_requires_handler() {
        let dir = tempfile::tempdir().unwrap();
        let mut server = SocketServer::new(TransportConfig {
            socket_path: socket_in(dir.path()),
            ..Default::default()
        });
        assert!(matches!(server.listen().await, Err(TransportError::NoHandler)));
    }
}
