//! INI parsing logic for converting `Ini` → `ConfigFile`.
//!
//! This is the single place where INI key names are mapped to struct fields.

use ini::Ini;
use std::path::PathBuf;
use url::Url;

use super::file::ConfigFileError;
use super::settings::ConfigFile;
use crate::geometry::{QuantizerConfig, QuantizerConfigError};

/// Parse an `Ini` object into a `ConfigFile`.
///
/// Starts from `ConfigFile::default()` and overlays any values found in the INI.
pub(super) fn parse_ini(ini: &Ini) -> Result<ConfigFile, ConfigFileError> {
    let mut config = ConfigFile::default();

    // [worker] section
    if let Some(section) = ini.section(Some("worker")) {
        if let Some(v) = non_empty(section.get("pool_size")) {
            let size: usize = v.parse().ok().filter(|n| *n > 0).ok_or_else(|| {
                invalid("worker", "pool_size", v, "must be a positive integer")
            })?;
            config.worker.pool_size = Some(size);
        }
        if let Some(v) = non_empty(section.get("entry")) {
            config.worker.entry = v.to_string();
        }
        if let Some(v) = non_empty(section.get("override")) {
            config.worker.override_location = Some(v.to_string());
        }
        if let Some(v) = non_empty(section.get("module_base")) {
            config.worker.module_base = Some(parse_url("module_base", v)?);
        }
        if let Some(v) = non_empty(section.get("origin")) {
            config.worker.origin = Some(parse_url("origin", v)?);
        }
    }

    // [geometry] section
    if let Some(section) = ini.section(Some("geometry")) {
        if let Some(v) = non_empty(section.get("extent")) {
            config.geometry.extent = v
                .parse()
                .map_err(|_| invalid("geometry", "extent", v, "must be a positive integer"))?;
        }
        if let Some(v) = non_empty(section.get("bits")) {
            config.geometry.bits = v
                .parse()
                .map_err(|_| invalid("geometry", "bits", v, "must be an integer between 2 and 31"))?;
        }
        if let Err(e) = QuantizerConfig::from(config.geometry).validate() {
            let (key, value) = match e {
                QuantizerConfigError::ZeroExtent => ("extent", config.geometry.extent),
                QuantizerConfigError::InvalidBits(bits) => ("bits", bits),
            };
            return Err(invalid("geometry", key, &value.to_string(), &e.to_string()));
        }
    }

    // [logging] section
    if let Some(section) = ini.section(Some("logging")) {
        if let Some(v) = non_empty(section.get("directory")) {
            config.logging.directory = expand_tilde(v);
        }
        if let Some(v) = non_empty(section.get("file")) {
            config.logging.file = v.to_string();
        }
    }

    Ok(config)
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn parse_url(key: &str, value: &str) -> Result<Url, ConfigFileError> {
    Url::parse(value).map_err(|e| invalid("worker", key, value, &format!("not an absolute URL ({})", e)))
}

fn invalid(section: &str, key: &str, value: &str, reason: &str) -> ConfigFileError {
    ConfigFileError::InvalidValue {
        section: section.to_string(),
        key: key.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

/// Expand a leading `~/` to the home directory.
pub(super) fn expand_tilde(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    }
    PathBuf::from(path)
}
