//! Syllog CLI entry point.
//!
//! Binary name: `syl`
//!
//! Parses CLI arguments, initializes the database and configuration, then
//! dispatches to the appropriate command handler.

mod cli;
mod state;

use clap::Parser;
use clap_complete::generate;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Commands};
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Set up tracing based on verbosity
    let filter = match cli.verbose {
        0 if cli.quiet => "error",
        0 => "warn",
        1 => "info,syllog=debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_target(false)
        .init();

    // Shell completions don't need app state
    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = <Cli as clap::CommandFactory>::command();
        generate(*shell, &mut cmd, "syl", &mut std::io::stdout());
        return Ok(());
    }

    // Validation is file-only, no database needed
    if let Commands::Validate {
        concepts,
        inferences,
    } = &cli.command
    {
        return cli::run::handle_validate(concepts, inferences, cli.json, cli.quiet);
    }

    // Initialize application state (config, DB)
    let state = AppState::init().await?;

    match cli.command {
        Commands::Run { action } => {
            cli::run::handle(action, &state, cli.json, cli.quiet).await?;
        }

        Commands::Runs { action } => {
            cli::runs::handle(action, &state, cli.json, cli.quiet).await?;
        }

        Commands::Validate { .. } | Commands::Completions { .. } => {
            unreachable!("handled above")
        }
    }

    Ok(())
}
