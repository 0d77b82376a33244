//! Shared setup for commands: configuration and logging.

use std::path::Path;
use tileworker::config::ConfigFile;
use tileworker::logging::{init_logging, LoggingGuard};
use tracing::info;

use crate::error::CliError;

/// Keeps logging alive and holds the loaded configuration.
pub struct CliRunner {
    _logging_guard: LoggingGuard,
    config: ConfigFile,
}

impl CliRunner {
    /// Loads configuration from `config_path` (or the default location) and
    /// starts logging where it says.
    pub fn new(config_path: Option<&Path>) -> Result<Self, CliError> {
        let config = load_config(config_path)?;
        let logging_guard = init_logging(&config.logging.directory, &config.logging.file)?;
        info!(version = tileworker::VERSION, "tileworker starting");

        Ok(Self {
            _logging_guard: logging_guard,
            config,
        })
    }

    pub fn config(&self) -> &ConfigFile {
        &self.config
    }
}

/// Loads configuration without touching logging.
pub fn load_config(config_path: Option<&Path>) -> Result<ConfigFile, CliError> {
    let config = match config_path {
        Some(path) => ConfigFile::load_from(path)?,
        None => ConfigFile::load()?,
    };
    Ok(config)
}
