//! Route a change and run it against connected agents.

use anyhow::Result;
use clap::Args;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use super::route::DecisionOutput;
use super::{read_document, Engine};
use crate::application::{ReviewDispatcher, ReviewReport};
use crate::cli::output::{output, table, truncate, CommandOutput};
use crate::domain::models::{ChangeDescription, Config};
use crate::infrastructure::logging::TracingLogger;
use crate::services::Supervisor;

#[derive(Args, Debug)]
pub struct DispatchArgs {
    /// Change description file (JSON or YAML)
    #[arg(short = 'f', long)]
    pub change: PathBuf,

    /// Directory agents write their findings into
    #[arg(short, long, default_value = ".vigil/reviews")]
    pub output_dir: PathBuf,

    /// Longest time to wait for agents to connect before routing
    #[arg(long, default_value = "5000")]
    pub wait_ms: u64,

    /// Stop waiting once this many agents are connected
    #[arg(long, default_value = "1")]
    pub min_agents: usize,

    /// Per-task timeout in milliseconds (default: registry.default_task_timeout_ms)
    #[arg(long)]
    pub timeout_ms: Option<u64>,

    /// Override the agent socket path
    #[arg(short, long)]
    pub socket: Option<PathBuf>,
}

#[derive(Debug, serde::Serialize)]
pub struct DispatchOutput {
    #[serde(flatten)]
    pub report: ReviewReport,
}

impl CommandOutput for DispatchOutput {
    fn to_human(&self) -> String {
        let decision = DecisionOutput {
            decision: self.report.decision.clone(),
        };
        if self.report.results.is_empty() {
            return format!("{}\n\nNo tasks dispatched.", decision.to_human());
        }

        let mut t = table(&["Agent", "Status", "Duration", "Detail"]);
        for result in &self.report.results {
            t.add_row(vec![
                result.agent.clone(),
                result.status.to_string(),
                format!("{}ms", result.duration_ms),
                truncate(result.error.as_deref().unwrap_or("-"), 60),
            ]);
        }
        format!(
            "{}\n\n{t}\n{}/{} tasks completed",
            decision.to_human(),
            self.report.succeeded(),
            self.report.results.len()
        )
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

pub async fn execute(args: DispatchArgs, mut config: Config, json: bool) -> Result<()> {
    if let Some(socket) = args.socket {
        config.transport.socket_path = socket;
    }
    let change: ChangeDescription = read_document(&args.change)?;

    let engine = Engine::start(&config, true).await?;
    let deadline = Instant::now() + Duration::from_millis(args.wait_ms);
    loop {
        let connected = engine.registry.summary().await.connected;
        if connected >= args.min_agents || Instant::now() >= deadline {
            tracing::info!(connected, "starting review");
            break;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    let supervisor = Supervisor::new(
        &config,
        engine.registry.clone(),
        Arc::new(TracingLogger::new("supervisor")),
    )?;
    let mut dispatcher = ReviewDispatcher::new(
        supervisor,
        engine.registry.clone(),
        args.output_dir,
        Arc::new(TracingLogger::new("dispatcher")),
    );
    if let Some(timeout_ms) = args.timeout_ms {
        dispatcher = dispatcher.with_task_timeout_ms(timeout_ms);
    }

    let report = dispatcher.review(&change).await;
    engine.shutdown().await;

    output(&DispatchOutput { report }, json);
    Ok(())
}
