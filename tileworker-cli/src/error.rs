//! CLI error handling with user-friendly messages.

use std::path::PathBuf;
use std::process;
use thiserror::Error;
use tileworker::config::ConfigFileError;
use tileworker::logging::LoggingError;
use tileworker::worker::ChannelError;

/// CLI-specific errors.
#[derive(Debug, Error)]
pub enum CliError {
    /// Failed to initialize logging
    #[error("Failed to initialize logging: {0}")]
    LoggingInit(#[from] LoggingError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigFileError),

    /// Failed to read an input file
    #[error("Failed to read '{path}': {error}")]
    FileRead {
        path: PathBuf,
        error: std::io::Error,
    },

    /// Input is not valid tile JSON
    #[error("Invalid input '{path}': {reason}")]
    InvalidInput { path: PathBuf, reason: String },

    /// Worker pool error
    #[error("Worker error: {0}")]
    Worker(#[from] ChannelError),

    /// Failed to start the async runtime
    #[error("Failed to create Tokio runtime: {0}")]
    Runtime(std::io::Error),

    /// Some tiles could not be parsed
    #[error("{failed} of {total} tiles failed to parse")]
    TilesFailed { failed: usize, total: usize },
}

impl CliError {
    /// Exit the process with an error message and code.
    pub fn exit(&self) -> ! {
        eprintln!("Error: {}", self);

        if let CliError::Config(ConfigFileError::InvalidValue { .. }) = self {
            eprintln!();
            eprintln!("Check the configuration with: tileworker config show");
        }

        process::exit(1)
    }
}
