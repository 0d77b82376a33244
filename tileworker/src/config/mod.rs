//! User configuration stored in `~/.tileworker/config.ini`.
//!
//! # Example
//!
//! ```no_run
//! use tileworker::config::ConfigFile;
//! use tileworker::worker::ChannelConfig;
//!
//! let config = ConfigFile::load().unwrap_or_default();
//! let channel = ChannelConfig::from(&config);
//! ```

mod file;
mod parser;
mod settings;
mod writer;

pub use file::{config_directory, config_file_path, ConfigFileError};
pub use settings::{ConfigFile, GeometrySettings, LoggingSettings, WorkerSettings, DEFAULT_LOG_FILE};
