//! Vigil CLI entry point.

use clap::Parser;

use vigil::cli::{handle_error, Cli, Commands};
use vigil::infrastructure::config::ConfigLoader;
use vigil::infrastructure::logging::LoggerImpl;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match ConfigLoader::resolve(cli.config.as_deref()) {
        Ok(config) => config,
        Err(err) => handle_error(err, cli.json),
    };
    let _logger = match LoggerImpl::init(&config.logging) {
        Ok(logger) => logger,
        Err(err) => handle_error(err, cli.json),
    };

    let result = match cli.command {
        Commands::Serve(args) => {
            vigil::cli::commands::serve::execute(args, config, cli.json).await
        }
        Commands::Route(args) => {
            vigil::cli::commands::route::execute(args, config, cli.json).await
        }
        Commands::Dispatch(args) => {
            vigil::cli::commands::dispatch::execute(args, config, cli.json).await
        }
        Commands::Config(args) => {
            vigil::cli::commands::config::execute(args, config, cli.json).await
        }
    };

    if let Err(err) = result {
        handle_error(err, cli.json);
    }
}
