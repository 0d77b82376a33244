//! Settings structs for each `[section]` of config.ini.

use std::path::PathBuf;
use url::Url;

use crate::geometry::{QuantizerConfig, BITS, EXTENT};
use crate::worker::{BootstrapSettings, ChannelConfig, DEFAULT_WORKER_ENTRY};

/// Default log file name.
pub const DEFAULT_LOG_FILE: &str = "tileworker.log";

/// Complete configuration loaded from config.ini.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigFile {
    /// Worker pool settings
    pub worker: WorkerSettings,
    /// Geometry quantization settings
    pub geometry: GeometrySettings,
    /// Logging settings
    pub logging: LoggingSettings,
}

/// Worker pool configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerSettings {
    /// Number of worker threads; `None` picks one from available parallelism
    pub pool_size: Option<usize>,
    /// Worker entry, relative or absolute
    pub entry: String,
    /// Explicit bootstrap location, tried first
    pub override_location: Option<String>,
    /// Library module location the entry is resolved against
    pub module_base: Option<Url>,
    /// Origin the entry is resolved against
    pub origin: Option<Url>,
}

/// Geometry quantization configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GeometrySettings {
    /// Internal tile extent
    pub extent: u32,
    /// Signed bit width of quantized coordinates
    pub bits: u32,
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingSettings {
    /// Directory log files are written to
    pub directory: PathBuf,
    /// Log file name
    pub file: String,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            pool_size: None,
            entry: DEFAULT_WORKER_ENTRY.to_string(),
            override_location: None,
            module_base: None,
            origin: None,
        }
    }
}

impl Default for GeometrySettings {
    fn default() -> Self {
        Self {
            extent: EXTENT,
            bits: BITS,
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            directory: super::config_directory().join("logs"),
            file: DEFAULT_LOG_FILE.to_string(),
        }
    }
}

impl WorkerSettings {
    /// Inputs to bootstrap-location resolution.
    pub fn bootstrap(&self) -> BootstrapSettings {
        BootstrapSettings {
            entry: self.entry.clone(),
            override_location: self.override_location.clone(),
            module_base: self.module_base.clone(),
            origin: self.origin.clone(),
        }
    }
}

impl From<GeometrySettings> for QuantizerConfig {
    fn from(settings: GeometrySettings) -> Self {
        QuantizerConfig {
            extent: settings.extent,
            bits: settings.bits,
        }
    }
}

impl From<&ConfigFile> for ChannelConfig {
    fn from(config: &ConfigFile) -> Self {
        let defaults = ChannelConfig::default();
        ChannelConfig {
            pool_size: config.worker.pool_size.unwrap_or(defaults.pool_size),
            bootstrap: config.worker.bootstrap(),
            quantizer: config.geometry.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ConfigFile::default();
        assert!(config.worker.pool_size.is_none());
        assert_eq!(config.worker.entry, "tile-worker.js");
        assert_eq!(config.geometry.extent, 8192);
        assert_eq!(config.geometry.bits, 15);
        assert_eq!(config.logging.file, "tileworker.log");
    }

    #[test]
    fn test_channel_config_from_file() {
        let mut config = ConfigFile::default();
        config.worker.pool_size = Some(3);
        config.worker.override_location = Some("https://cdn.example.com/w.js".to_string());
        config.geometry.extent = 4096;

        let channel = ChannelConfig::from(&config);
        assert_eq!(channel.pool_size, 3);
        assert_eq!(channel.quantizer.extent, 4096);
        assert_eq!(
            channel.resolve_bootstrap().location.as_str(),
            "https://cdn.example.com/w.js"
        );
    }
}
