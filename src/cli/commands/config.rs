//! Configuration inspection.

use anyhow::Result;
use clap::{Args, Subcommand};

use crate::cli::output::{output, CommandOutput};
use crate::domain::models::Config;

#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommands,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Print the merged configuration
    Show,
    /// Check the configuration and report the result
    Validate,
}

#[derive(Debug, serde::Serialize)]
pub struct ConfigOutput {
    #[serde(flatten)]
    pub config: Config,
}

impl CommandOutput for ConfigOutput {
    fn to_human(&self) -> String {
        serde_yaml::to_string(&self.config).unwrap_or_default()
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

#[derive(Debug, serde::Serialize)]
pub struct ValidationOutput {
    pub valid: bool,
    pub skill_rules: usize,
    pub socket_path: String,
}

impl CommandOutput for ValidationOutput {
    fn to_human(&self) -> String {
        format!(
            "Configuration is valid ({} skill rules, socket {})",
            self.skill_rules, self.socket_path
        )
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

/// The loader has already validated `config` by the time this runs.
pub async fn execute(args: ConfigArgs, config: Config, json: bool) -> Result<()> {
    match args.command {
        ConfigCommands::Show => output(&ConfigOutput { config }, json),
        ConfigCommands::Validate => output(
            &ValidationOutput {
                valid: true,
                skill_rules: config.skill_rules.len(),
                socket_path: config.transport.socket_path.display().to_string(),
            },
            json,
        ),
    }
    Ok(())
}
