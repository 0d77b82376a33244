//! Logging infrastructure for tileworker.
//!
//! Structured logging to a file and to stderr:
//! - Writes to `<log_dir>/<log_file>` (cleared on session start)
//! - Mirrors to stderr so stdout stays free for command output
//! - Configurable via the RUST_LOG environment variable

use std::fs;
use std::io;
use std::path::Path;
use thiserror::Error;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Logging setup errors.
#[derive(Debug, Error)]
pub enum LoggingError {
    /// The log directory or file could not be prepared.
    #[error("Failed to prepare log file: {0}")]
    Io(#[from] io::Error),

    /// A global subscriber is already installed.
    #[error("Failed to install log subscriber: {0}")]
    Subscriber(String),
}

/// Guard that must be kept alive for the duration of logging.
///
/// Dropping this guard will flush and close the log file writer.
pub struct LoggingGuard {
    _file_guard: WorkerGuard,
}

/// Initialize logging.
///
/// Creates `log_dir` if needed, clears the previous log file and installs
/// a subscriber writing to both the file and stderr. The filter comes from
/// `RUST_LOG`, defaulting to `info`.
///
/// # Errors
///
/// Returns an error if the log file cannot be prepared or a subscriber is
/// already installed.
pub fn init_logging(log_dir: &Path, log_file: &str) -> Result<LoggingGuard, LoggingError> {
    fs::create_dir_all(log_dir)?;
    fs::write(log_dir.join(log_file), "")?;

    let file_appender = tracing_appender::rolling::never(log_dir, log_file);
    let (non_blocking_file, file_guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(non_blocking_file)
        .with_ansi(false)
        .with_thread_names(true);

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_writer(io::stderr)
        .with_target(false)
        .compact();

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(stderr_layer)
        .try_init()
        .map_err(|e| LoggingError::Subscriber(e.to_string()))?;

    Ok(LoggingGuard {
        _file_guard: file_guard,
    })
}
