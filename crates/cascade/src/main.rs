//! cascade - Intent router CLI
//!
//! Runs the routing cascade against a local SQLite database.

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod cli;
mod commands;
mod config;

use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let directive = if cli.verbose { "cascade=debug" } else { "cascade=info" };
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env().add_directive(directive.parse()?))
        .init();

    // Load configuration
    let config = config::Config::load(cli.config.as_deref())?;

    // Execute command
    match cli.command {
        Commands::Classify(cmd) => commands::classify::execute(cmd, cli.user, &config).await,
        Commands::Feedback(cmd) => commands::feedback::execute(cmd, cli.user, &config).await,
        Commands::Stats(cmd) => commands::stats::execute(cmd, cli.user, &config).await,
        Commands::Weights(cmd) => commands::weights::execute(cmd, cli.user, &config),
        Commands::Version => {
            println!("cascade {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}
