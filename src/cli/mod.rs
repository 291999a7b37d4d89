//! Command-line interface.

pub mod commands;
pub mod output;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use commands::config::ConfigArgs;
use commands::dispatch::DispatchArgs;
use commands::route::RouteArgs;
use commands::serve::ServeArgs;

#[derive(Parser, Debug)]
#[command(name = "vigil")]
#[command(about = "Vigil - agent supervision and routing engine", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output in JSON format
    #[arg(short, long, global = true)]
    pub json: bool,

    /// Configuration file (default: .vigil/config.yaml and .vigil/local.yaml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Accept agent connections and keep their health current
    Serve(ServeArgs),

    /// Compute a routing decision for a change without dispatching it
    Route(RouteArgs),

    /// Wait for agents, then route a change and dispatch its tasks
    Dispatch(DispatchArgs),

    /// Inspect the effective configuration
    Config(ConfigArgs),
}

/// Print a command failure and exit non-zero.
pub fn handle_error(err: anyhow::Error, json_mode: bool) -> ! {
    if json_mode {
        let body = serde_json::json!({
            "error": err.to_string(),
            "causes": err.chain().skip(1).map(ToString::to_string).collect::<Vec<_>>(),
        });
        println!("{}", serde_json::to_string_pretty(&body).unwrap_or_default());
    } else {
        eprintln!("Error: {err}");
        for cause in err.chain().skip(1) {
            eprintln!("  caused by: {cause}");
        }
    }
    std::process::exit(1);
}
