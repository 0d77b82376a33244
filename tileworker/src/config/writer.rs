//! INI serialization logic for converting `ConfigFile` → INI string.

use std::path::Path;
use url::Url;

use super::settings::ConfigFile;

/// Convert a `ConfigFile` to a commented INI string for saving.
pub(super) fn to_config_string(config: &ConfigFile) -> String {
    let pool_size = config
        .worker
        .pool_size
        .map(|n| n.to_string())
        .unwrap_or_default();
    let override_location = config.worker.override_location.as_deref().unwrap_or("");
    let module_base = config.worker.module_base.as_ref().map_or("", Url::as_str);
    let origin = config.worker.origin.as_ref().map_or("", Url::as_str);

    format!(
        r#"[worker]
; Number of worker threads (default: half the CPU cores, at most 6)
pool_size = {}
; Worker entry point, relative or absolute
entry = {}
; Explicit worker location; takes precedence when set
override = {}
; Library location the entry is resolved against
module_base = {}
; Origin the entry is resolved against when module_base is unusable
origin = {}

[geometry]
; Internal tile extent (default: 8192)
extent = {}
; Signed bit width of quantized coordinates (default: 15)
bits = {}

[logging]
; Log directory (default: ~/.tileworker/logs)
directory = {}
; Log file name
file = {}
"#,
        pool_size,
        config.worker.entry,
        override_location,
        module_base,
        origin,
        config.geometry.extent,
        config.geometry.bits,
        path_to_string(&config.logging.directory),
        config.logging.file,
    )
}

fn path_to_string(path: &Path) -> String {
    if let Some(home) = dirs::home_dir() {
        if let Ok(stripped) = path.strip_prefix(&home) {
            return format!("~/{}", stripped.display());
        }
    }
    path.display().to_string()
}
