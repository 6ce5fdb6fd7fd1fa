//! Vidseek CLI - Command-line interface
//!
//! Runs the search server, streams searches against it and serves simulated
//! catalogs for local testing.

mod commands;

use std::path::PathBuf;

use clap::Parser;
use vidseek_core::tracing_setup::{CliLogLevel, init_tracing};

#[derive(Parser)]
#[command(name = "vidseek")]
#[command(about = "Streaming multi-source video search")]
#[command(version)]
struct Cli {
    /// Console log level (the log file always records debug)
    #[arg(long, value_enum, default_value_t = CliLogLevel::Info, global = true)]
    log_level: CliLogLevel,

    /// Directory for the debug log file
    #[arg(long, global = true)]
    logs_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: commands::Commands,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_level.as_tracing_level(), cli.logs_dir.as_deref())?;

    commands::run_command(cli.command).await
}
