//! volstream CLI
//!
//! Inspects level selection, atlas packing and pipeline configuration for
//! chunked multiscale volumes.

mod commands;
mod error;

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};
use volstream::logging::{init_logging, LogConfig};

use commands::config::ConfigCommands;
use commands::plan::PlanArgs;
use error::CliError;

#[derive(Debug, Parser)]
#[command(name = "volstream", version, about = "Chunked multiscale volume streaming tools")]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Also write logs to this file
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Show the level, region, atlas and chunks a load would use
    Plan(PlanArgs),

    /// Inspect or create the configuration file
    #[command(subcommand)]
    Config(ConfigCommands),
}

fn run(cli: Cli) -> Result<(), CliError> {
    let mut log_config = LogConfig::default().with_verbose(cli.verbose);
    if let Some(path) = cli.log_file {
        log_config = log_config.with_file(path);
    }
    let _guard = init_logging(&log_config)?;

    match cli.command {
        Commands::Plan(args) => commands::plan::run(args),
        Commands::Config(command) => commands::config::run(command),
    }
}

fn main() {
    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}
