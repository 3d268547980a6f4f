//! Configuration CLI commands.
//!
//! `config show`, `config path` and `config init` for inspecting and creating
//! the pipeline config file.

use std::path::{Path, PathBuf};

use clap::Subcommand;
use volstream::config::{format_size, ConfigFile, PipelineConfig};

use crate::error::CliError;

/// Config subcommands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommands {
    /// Show the effective configuration
    Show {
        /// Read this file instead of the default location
        #[arg(long)]
        file: Option<PathBuf>,
    },

    /// Show the default configuration file path
    Path,

    /// Write a configuration file with default settings
    Init {
        /// Write to this file instead of the default location
        #[arg(long)]
        file: Option<PathBuf>,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

/// Run a config subcommand.
pub fn run(command: ConfigCommands) -> Result<(), CliError> {
    match command {
        ConfigCommands::Show { file } => run_show(file.as_deref()),
        ConfigCommands::Path => run_path(),
        ConfigCommands::Init { file, force } => run_init(file, force),
    }
}

fn default_path() -> Result<PathBuf, CliError> {
    ConfigFile::default_path()
        .ok_or_else(|| CliError::Args("no configuration directory on this system".to_string()))
}

fn run_show(file: Option<&Path>) -> Result<(), CliError> {
    let config = match file {
        Some(path) => ConfigFile::load_from(path)?,
        None => ConfigFile::load()?,
    };
    print_config(&config);
    Ok(())
}

fn print_config(config: &PipelineConfig) {
    println!("Pipeline Configuration");
    println!("======================");
    println!();
    println!("[scheduler]");
    println!("  max_active = {}", config.scheduler.max_active);
    println!(
        "  max_low_priority_active = {}",
        config.scheduler.max_low_priority_active
    );
    println!();
    println!("[cache]");
    println!("  max_size = {}", format_size(config.cache.max_size_bytes));
    println!();
    println!("[atlas]");
    println!("  max_edge = {}", config.max_atlas_edge);
}

fn run_path() -> Result<(), CliError> {
    println!("{}", default_path()?.display());
    Ok(())
}

fn run_init(file: Option<PathBuf>, force: bool) -> Result<(), CliError> {
    let path = match file {
        Some(path) => path,
        None => default_path()?,
    };
    if path.exists() && !force {
        return Err(CliError::Args(format!(
            "{} already exists (use --force to overwrite)",
            path.display()
        )));
    }

    ConfigFile::save_to(&PipelineConfig::default(), &path)?;
    println!("Wrote {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_then_show() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.ini");

        run_init(Some(path.clone()), false).unwrap();
        assert!(path.exists());
        run_show(Some(&path)).unwrap();
    }

    #[test]
    fn test_init_refuses_to_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.ini");
        std::fs::write(&path, "[atlas]\nmax_edge = 512\n").unwrap();

        assert!(matches!(
            run_init(Some(path.clone()), false),
            Err(CliError::Args(_))
        ));
        run_init(Some(path.clone()), true).unwrap();
        assert_eq!(
            ConfigFile::load_from(&path).unwrap(),
            PipelineConfig::default()
        );
    }
}
