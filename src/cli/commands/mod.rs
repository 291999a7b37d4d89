//! CLI command implementations.

pub mod config;
pub mod dispatch;
pub mod route;
pub mod serve;

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::application::{AgentRegistry, LivenessMonitor};
use crate::domain::models::Config;
use crate::infrastructure::ipc::SocketServer;
use crate::infrastructure::logging::TracingLogger;
use crate::services::{CircuitBreakerService, CircuitTrippedEvent};

/// Read a JSON or YAML document.
pub(crate) fn read_document<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_yaml::from_str(&raw).with_context(|| format!("Failed to parse {}", path.display()))
}

/// Running socket server, registry, and liveness monitor.
pub(crate) struct Engine {
    pub registry: Arc<AgentRegistry>,
    server: SocketServer,
    tasks: Vec<JoinHandle<()>>,
    trip_log: JoinHandle<()>,
}

impl Engine {
    pub async fn start(config: &Config, ping_agents: bool) -> Result<Self> {
        let (trip_tx, trip_rx) = mpsc::channel(64);
        let breakers = Arc::new(
            CircuitBreakerService::new(
                config.circuit_breaker.clone(),
                Arc::new(TracingLogger::new("circuit_breaker")),
            )
            .with_event_sender(trip_tx),
        );
        let registry = Arc::new(AgentRegistry::new(
            config.registry.clone(),
            breakers,
            Arc::new(TracingLogger::new("registry")),
        ));

        let mut server = SocketServer::new(config.transport.clone());
        server.on_connection(registry.clone());
        let server_task = server
            .listen()
            .await
            .context("Failed to start agent socket server")?;

        let monitor = LivenessMonitor::new(registry.clone())
            .with_pings(ping_agents)
            .spawn(server.shutdown_signal());

        Ok(Self {
            registry,
            server,
            tasks: vec![server_task, monitor],
            trip_log: tokio::spawn(log_trips(trip_rx)),
        })
    }

    pub fn socket_path(&self) -> &Path {
        self.server.socket_path()
    }

    pub async fn shutdown(self) {
        self.server.shutdown();
        for task in self.tasks {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "background task ended abnormally");
            }
        }
        self.trip_log.abort();
    }
}

async fn log_trips(mut trips: mpsc::Receiver<CircuitTrippedEvent>) {
    while let Some(event) = trips.recv().await {
        tracing::warn!(
            scope = %event.scope,
            open_count = event.open_count,
            last_error = event.recent_failures.last().map(String::as_str).unwrap_or_default(),
            "Circuit breaker tripped"
        );
    }
}
