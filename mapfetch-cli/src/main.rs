//! Mapfetch CLI - Command-line interface
//!
//! Search the map catalog and install maps from the terminal.

mod commands;

use std::path::PathBuf;

use clap::Parser;
use mapfetch_core::tracing_setup::{CliLogLevel, init_tracing};

#[derive(Parser)]
#[command(name = "mapfetch")]
#[command(about = "Search and install workshop maps from a remote catalog")]
struct Cli {
    /// Console log level; the log file always records everything
    #[arg(long, value_enum, default_value_t = CliLogLevel::Warn, global = true)]
    log_level: CliLogLevel,

    /// Folder for the last-run log file
    #[arg(long, global = true)]
    logs_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: commands::Commands,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_level.as_tracing_level(), cli.logs_dir.as_deref())?;

    commands::handle_command(cli.command).await
}
