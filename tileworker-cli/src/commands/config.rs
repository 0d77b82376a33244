//! Configuration CLI commands.

use clap::Subcommand;
use std::path::Path;
use tileworker::config::{config_file_path, ConfigFile};

use crate::error::CliError;
use crate::runner::load_config;

/// Config subcommands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommands {
    /// Print the effective configuration
    Show,

    /// Show the configuration file path
    Path,

    /// Write a default configuration file if none exists
    Init,
}

/// Run a config subcommand.
pub fn run(command: ConfigCommands, config_path: Option<&Path>) -> Result<(), CliError> {
    match command {
        ConfigCommands::Show => run_show(config_path),
        ConfigCommands::Path => run_path(config_path),
        ConfigCommands::Init => run_init(config_path),
    }
}

fn run_show(config_path: Option<&Path>) -> Result<(), CliError> {
    let config = load_config(config_path)?;
    print!("{}", config.to_ini_string());
    Ok(())
}

fn run_path(config_path: Option<&Path>) -> Result<(), CliError> {
    let path = config_path.map_or_else(config_file_path, Path::to_path_buf);
    println!("{}", path.display());
    Ok(())
}

fn run_init(config_path: Option<&Path>) -> Result<(), CliError> {
    let path = config_path.map_or_else(config_file_path, Path::to_path_buf);
    if path.exists() {
        println!("Configuration already exists at {}", path.display());
        return Ok(());
    }
    ConfigFile::default().save_to(&path)?;
    println!("Wrote default configuration to {}", path.display());
    Ok(())
}
