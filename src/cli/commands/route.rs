//! Offline routing: supervise a change against a given health picture.

use anyhow::Result;
use clap::Args;
use std::path::PathBuf;
use std::sync::Arc;

use super::read_document;
use crate::cli::output::{output, section, table, CommandOutput};
use crate::domain::models::{AgentHealth, ChangeDescription, Config, HealthSnapshot, SupervisorDecision};
use crate::domain::ports::StaticHealthSource;
use crate::infrastructure::logging::TracingLogger;
use crate::services::Supervisor;

#[derive(Args, Debug)]
pub struct RouteArgs {
    /// Change description file (JSON or YAML)
    #[arg(short = 'f', long)]
    pub change: PathBuf,

    /// Health snapshot file: a JSON or YAML list of agent health records
    #[arg(long, conflicts_with = "agents")]
    pub health: Option<PathBuf>,

    /// Agents to treat as healthy when no snapshot is given
    #[arg(
        short,
        long,
        value_delimiter = ',',
        default_value = "security,quality,architecture,documentation,performance"
    )]
    pub agents: Vec<String>,
}

#[derive(Debug, serde::Serialize)]
pub struct DecisionOutput {
    #[serde(flatten)]
    pub decision: SupervisorDecision,
}

impl DecisionOutput {
    fn summary_table(&self) -> String {
        let d = &self.decision;
        let mut t = table(&["Field", "Value"]);
        t.add_row(vec!["Agents".to_string(), d.agents().join(", ")]);
        t.add_row(vec!["Priority".to_string(), d.routing_plan.priority.to_string()]);
        t.add_row(vec!["Confidence".to_string(), format!("{}/100", d.confidence)]);
        t.add_row(vec![
            "Estimated duration".to_string(),
            format!("{}s", d.estimated_duration_secs),
        ]);
        t.add_row(vec!["Estimated cost".to_string(), format!("{:.4}", d.estimated_cost)]);
        t.add_row(vec!["Fallback".to_string(), d.fallback.to_string()]);
        t.to_string()
    }
}

impl CommandOutput for DecisionOutput {
    fn to_human(&self) -> String {
        let d = &self.decision;
        let mut blocks = vec![self.summary_table()];
        blocks.extend(
            [
                section("Reasoning", &d.routing_plan.reasoning),
                section("Errors", &d.errors),
                section("Warnings", &d.warnings),
                section("Recommendations", &d.recommendations),
            ]
            .into_iter()
            .flatten(),
        );
        blocks.join("\n\n")
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

pub async fn execute(args: RouteArgs, config: Config, json: bool) -> Result<()> {
    let change: ChangeDescription = read_document(&args.change)?;
    let snapshot = match &args.health {
        Some(path) => HealthSnapshot::new(read_document::<Vec<AgentHealth>>(path)?),
        None => HealthSnapshot::new(args.agents.iter().map(AgentHealth::new).collect()),
    };

    let supervisor = Supervisor::new(
        &config,
        Arc::new(StaticHealthSource::new(snapshot)),
        Arc::new(TracingLogger::new("supervisor")),
    )?;
    let decision = supervisor.supervise(&change).await;

    output(&DecisionOutput { decision }, json);
    Ok(())
}
