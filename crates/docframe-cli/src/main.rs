//! docframe CLI - host for the document preview pipeline
//!
//! This is the main entry point for the docframe command-line interface.
//! Command implementations live in separate modules.

use anyhow::Result;
use clap::Parser;

mod cli;
mod commands;
mod output;
mod utils;

use cli::{Cli, Commands};
use utils::logging::initialize_logging;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    initialize_logging(&cli)?;

    execute_command(cli).await
}

async fn execute_command(cli: Cli) -> Result<()> {
    let config_path = cli.config.as_deref();

    match cli.command {
        Commands::Open(args) => commands::open(args, config_path).await,
        Commands::Rewrite(args) => commands::rewrite(&args, config_path),
        Commands::Config { command } => commands::config(command, config_path),
    }
}
