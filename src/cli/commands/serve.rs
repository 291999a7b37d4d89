//! Long-running agent server.

use anyhow::{Context, Result};
use clap::Args;
use std::path::PathBuf;

use super::Engine;
use crate::application::RegistrySummary;
use crate::cli::output::{output, table, CommandOutput};
use crate::domain::models::Config;

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Override the agent socket path
    #[arg(short, long)]
    pub socket: Option<PathBuf>,

    /// Only sweep heartbeats; never ping agents
    #[arg(long)]
    pub no_ping: bool,
}

#[derive(Debug, serde::Serialize)]
pub struct ServeOutput {
    pub socket: String,
    pub agents: RegistrySummary,
}

impl CommandOutput for ServeOutput {
    fn to_human(&self) -> String {
        let a = &self.agents;
        let mut t = table(&["Registered", "Connected", "Healthy", "Degraded", "Unhealthy"]);
        t.add_row(vec![a.total, a.connected, a.healthy, a.degraded, a.unhealthy]);
        format!("Stopped serving on {}\n{t}", self.socket)
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

pub async fn execute(args: ServeArgs, mut config: Config, json: bool) -> Result<()> {
    if let Some(socket) = args.socket {
        config.transport.socket_path = socket;
    }

    let engine = Engine::start(&config, !args.no_ping).await?;
    let socket = engine.socket_path().display().to_string();
    tracing::info!(socket = %socket, "vigil is serving agents, press ctrl-c to stop");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;

    let agents = engine.registry.summary().await;
    engine.shutdown().await;

    output(&ServeOutput { socket, agents }, json);
    Ok(())
}
