//! Common test utilities for integration tests
//!
//! Provides a socket server wired to a real agent registry, and a small
//! scripted agent that speaks the wire protocol over a Unix socket.

#![allow(dead_code)]

use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::UnixStream;
use tokio::task::JoinHandle;

use vigil::application::AgentRegistry;
use vigil::domain::models::{
    AgentHealth, ChangeDescription, CircuitBreakerConfig, HealthSnapshot, RegistryConfig,
    TransportConfig,
};
use vigil::domain::ports::{Logger, NullLogger};
use vigil::infrastructure::ipc::message::encode;
use vigil::infrastructure::ipc::{IpcMessage, MessageType, SocketServer};
use vigil::services::CircuitBreakerService;

/// How long a scripted agent waits for a frame before giving up
pub const RECV_TIMEOUT: Duration = Duration::from_secs(5);

/// Malformed frames tolerated by test servers
pub const MAX_PARSE_FAILURES: u32 = 3;

/// Create a temporary directory for test isolation
pub fn temp_dir() -> TempDir {
    tempfile::tempdir().expect("Failed to create temp dir")
}

pub fn change(files: &[&str], lines_changed: u64) -> ChangeDescription {
    ChangeDescription::new(
        "/repo",
        files.iter().map(|f| (*f).to_string()).collect(),
        lines_changed,
    )
}

/// Every named agent healthy, in the given order
pub fn fleet(names: &[&str]) -> HealthSnapshot {
    HealthSnapshot::new(names.iter().map(|n| AgentHealth::new(*n)).collect())
}

/// A listening server and the registry behind it.
pub struct TestServer {
    pub registry: Arc<AgentRegistry>,
    pub server: SocketServer,
    pub handle: JoinHandle<()>,
    pub socket: PathBuf,
    _dir: TempDir,
}

impl TestServer {
    pub async fn start() -> Self {
        Self::start_with(CircuitBreakerConfig::default()).await
    }

    pub async fn start_with(breaker: CircuitBreakerConfig) -> Self {
        let dir = temp_dir();
        let socket = dir.path().join("agents.sock");
        let logger: Arc<dyn Logger> = Arc::new(NullLogger);

        let breakers = Arc::new(CircuitBreakerService::new(breaker, logger.clone()));
        let registry = Arc::new(AgentRegistry::new(
            RegistryConfig::default(),
            breakers,
            logger,
        ));

        let mut server = SocketServer::new(TransportConfig {
            socket_path: socket.clone(),
            max_parse_failures: MAX_PARSE_FAILURES,
            ..Default::default()
        });
        server.on_connection(registry.clone());
        let handle = server.listen().await.expect("server should bind");

        Self {
            registry,
            server,
            handle,
            socket,
            _dir: dir,
        }
    }

    pub async fn stop(self) {
        self.server.shutdown();
        tokio::time::timeout(RECV_TIMEOUT, self.handle)
            .await
            .expect("server should stop")
            .expect("server task should not panic");
    }
}

/// Scripted agent process.
pub struct TestAgent {
    lines: Lines<BufReader<OwnedReadHalf>>,
    writer: OwnedWriteHalf,
}

impl TestAgent {
    pub async fn connect(socket: &Path) -> Self {
        let stream = UnixStream::connect(socket)
            .await
            .expect("agent should connect");
        let (read_half, writer) = stream.into_split();
        Self {
            lines: BufReader::new(read_half).lines(),
            writer,
        }
    }

    /// Connect and complete the auth handshake as `name`.
    pub async fn authenticated(socket: &Path, name: &str) -> Self {
        let mut agent = Self::connect(socket).await;
        let auth = IpcMessage::new(MessageType::Auth)
            .with_agent(name)
            .with_payload(&json!({"version": "1.0.0", "capabilities": [name]}))
            .unwrap();
        agent.send(&auth).await;

        let ack = agent.recv().await.expect("auth_response expected");
        assert!(ack.is_successful_auth_response(), "auth rejected: {ack:?}");
        agent
    }

    pub async fn send(&mut self, message: &IpcMessage) {
        self.send_raw(&encode(message).unwrap()).await;
    }

    pub async fn send_raw(&mut self, bytes: &[u8]) {
        self.writer.write_all(bytes).await.expect("write should succeed");
    }

    /// Next frame from the server, or `None` once the server hung up.
    pub async fn recv(&mut self) -> Option<IpcMessage> {
        let line = tokio::time::timeout(RECV_TIMEOUT, self.lines.next_line())
            .await
            .expect("timed out waiting for a frame")
            .ok()??;
        Some(serde_json::from_str(&line).expect("server frames are valid JSON"))
    }

    /// Skip pings until a frame of `kind` arrives.
    pub async fn recv_kind(&mut self, kind: MessageType) -> Option<IpcMessage> {
        loop {
            let message = self.recv().await?;
            if message.kind == kind {
                return Some(message);
            }
        }
    }

    pub fn task_response(task_id: &str, status: &str) -> IpcMessage {
        IpcMessage::new(MessageType::TaskResponse)
            .with_task_id(task_id)
            .with_payload(&json!({"status": status, "result": {"findings": 0}}))
            .unwrap()
    }
}

/// Poll `check` until it holds or a second passes.
pub async fn eventually<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..100 {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}
