//! Worker bootstrap-location resolution.
//!
//! Deployments disagree about where the worker entry point lives, so the
//! location is found by trying an ordered list of [`LocationResolver`]s. A
//! resolver that cannot produce a usable location returns
//! [`Resolution::Skip`] and the next one is asked; it never fails startup.
//!
//! The default chain is:
//!
//! 1. [`ExplicitOverride`] - an override supplied by the caller
//! 2. [`ModuleRelative`] - the entry joined onto the library's own location
//! 3. [`SameOrigin`] - the entry joined onto the page origin
//! 4. [`Verbatim`] - the configured entry string, unchanged
//!
//! # Example
//!
//! ```
//! use tileworker::worker::{BootstrapChain, BootstrapSettings};
//!
//! let settings = BootstrapSettings {
//!     origin: Some("https://maps.example.com/app/index.html".parse().unwrap()),
//!     ..BootstrapSettings::default()
//! };
//! let resolved = BootstrapChain::from_settings(&settings).resolve().unwrap();
//! assert_eq!(resolved.resolver, "same-origin");
//! assert_eq!(resolved.location.to_string(), "https://maps.example.com/tile-worker.js");
//! ```

use std::fmt;
use std::path::Path;
use tracing::debug;
use url::Url;

/// Default worker entry name.
pub const DEFAULT_WORKER_ENTRY: &str = "tile-worker.js";

/// Where a worker was bootstrapped from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BootstrapLocation {
    /// A resolved absolute URL.
    Url(Url),

    /// The configured entry, used as given.
    Verbatim(String),
}

impl BootstrapLocation {
    /// The location as a string.
    pub fn as_str(&self) -> &str {
        match self {
            BootstrapLocation::Url(url) => url.as_str(),
            BootstrapLocation::Verbatim(entry) => entry,
        }
    }
}

impl fmt::Display for BootstrapLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one resolver.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Resolution {
    /// The resolver produced a usable location.
    Resolved(BootstrapLocation),

    /// The resolver does not apply; try the next one.
    Skip(String),
}

/// One strategy for locating the worker entry point.
pub trait LocationResolver: Send + Sync {
    /// Short name reported with the result.
    fn name(&self) -> &'static str;

    /// Attempts to produce a location.
    fn resolve(&self) -> Resolution;
}

/// Inputs to the default resolver chain.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BootstrapSettings {
    /// Worker entry, relative or absolute.
    pub entry: String,

    /// Location that takes precedence over everything else.
    pub override_location: Option<String>,

    /// Location of the library module; the entry is resolved next to it.
    pub module_base: Option<Url>,

    /// Page or application origin.
    pub origin: Option<Url>,
}

impl Default for BootstrapSettings {
    fn default() -> Self {
        Self {
            entry: DEFAULT_WORKER_ENTRY.to_string(),
            override_location: None,
            module_base: None,
            origin: None,
        }
    }
}

/// Uses an explicitly supplied location.
///
/// Accepts an absolute URL or an absolute filesystem path.
#[derive(Clone, Debug)]
pub struct ExplicitOverride(pub Option<String>);

impl LocationResolver for ExplicitOverride {
    fn name(&self) -> &'static str {
        "override"
    }

    fn resolve(&self) -> Resolution {
        let Some(raw) = self.0.as_deref().map(str::trim).filter(|s| !s.is_empty()) else {
            return Resolution::Skip("no override supplied".to_string());
        };
        if let Ok(url) = Url::parse(raw) {
            return Resolution::Resolved(BootstrapLocation::Url(url));
        }
        let path = Path::new(raw);
        if path.is_absolute() {
            if let Ok(url) = Url::from_file_path(path) {
                return Resolution::Resolved(BootstrapLocation::Url(url));
            }
        }
        Resolution::Skip(format!("override '{}' is not a URL or absolute path", raw))
    }
}

/// Resolves the entry next to the library module.
#[derive(Clone, Debug)]
pub struct ModuleRelative {
    pub base: Option<Url>,
    pub entry: String,
}

impl LocationResolver for ModuleRelative {
    fn name(&self) -> &'static str {
        "module-relative"
    }

    fn resolve(&self) -> Resolution {
        let Some(base) = &self.base else {
            return Resolution::Skip("no module base".to_string());
        };
        if base.cannot_be_a_base() {
            return Resolution::Skip(format!("module base '{}' cannot be a base", base));
        }
        match base.join(&self.entry) {
            Ok(url) => Resolution::Resolved(BootstrapLocation::Url(url)),
            Err(e) => Resolution::Skip(format!("cannot join '{}' onto '{}': {}", self.entry, base, e)),
        }
    }
}

/// Resolves the entry against the root of an origin.
#[derive(Clone, Debug)]
pub struct SameOrigin {
    pub origin: Option<Url>,
    pub entry: String,
}

impl LocationResolver for SameOrigin {
    fn name(&self) -> &'static str {
        "same-origin"
    }

    fn resolve(&self) -> Resolution {
        let Some(origin) = &self.origin else {
            return Resolution::Skip("no origin".to_string());
        };
        let origin = origin.origin();
        if !origin.is_tuple() {
            return Resolution::Skip("origin is opaque".to_string());
        }
        let root = match Url::parse(&origin.ascii_serialization()) {
            Ok(root) => root,
            Err(e) => return Resolution::Skip(format!("invalid origin: {}", e)),
        };
        let entry = self.entry.trim_start_matches('/');
        match root.join(entry) {
            Ok(url) => Resolution::Resolved(BootstrapLocation::Url(url)),
            Err(e) => Resolution::Skip(format!("cannot join '{}' onto origin: {}", entry, e)),
        }
    }
}

/// Uses the configured entry as given. Always resolves.
#[derive(Clone, Debug)]
pub struct Verbatim(pub String);

impl LocationResolver for Verbatim {
    fn name(&self) -> &'static str {
        "verbatim"
    }

    fn resolve(&self) -> Resolution {
        Resolution::Resolved(BootstrapLocation::Verbatim(self.0.clone()))
    }
}

/// A resolved location and the resolver that produced it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedBootstrap {
    pub location: BootstrapLocation,
    pub resolver: &'static str,
}

/// Ordered list of resolvers.
pub struct BootstrapChain {
    resolvers: Vec<Box<dyn LocationResolver>>,
}

impl BootstrapChain {
    /// Creates a chain from explicit resolvers, tried in order.
    pub fn new(resolvers: Vec<Box<dyn LocationResolver>>) -> Self {
        Self { resolvers }
    }

    /// The default four-step chain for `settings`.
    pub fn from_settings(settings: &BootstrapSettings) -> Self {
        Self::new(vec![
            Box::new(ExplicitOverride(settings.override_location.clone())),
            Box::new(ModuleRelative {
                base: settings.module_base.clone(),
                entry: settings.entry.clone(),
            }),
            Box::new(SameOrigin {
                origin: settings.origin.clone(),
                entry: settings.entry.clone(),
            }),
            Box::new(Verbatim(settings.entry.clone())),
        ])
    }

    /// Returns the first resolved location.
    ///
    /// `None` only when every resolver skipped, which cannot happen for a
    /// chain ending in [`Verbatim`].
    pub fn resolve(&self) -> Option<ResolvedBootstrap> {
        self.resolvers.iter().find_map(|resolver| match resolver.resolve() {
            Resolution::Resolved(location) => Some(ResolvedBootstrap {
                location,
                resolver: resolver.name(),
            }),
            Resolution::Skip(reason) => {
                debug!(resolver = resolver.name(), reason = %reason, "Bootstrap resolver skipped");
                None
            }
        })
    }
}

impl fmt::Debug for BootstrapChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.resolvers.iter().map(|r| r.name()))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    fn resolve(settings: &BootstrapSettings) -> ResolvedBootstrap {
        BootstrapChain::from_settings(settings).resolve().unwrap()
    }

    #[test]
    fn test_override_wins() {
        let settings = BootstrapSettings {
            override_location: Some("https://cdn.example.com/w.js".to_string()),
            module_base: Some(url("https://example.com/lib/tiles.js")),
            ..BootstrapSettings::default()
        };
        let resolved = resolve(&settings);
        assert_eq!(resolved.resolver, "override");
        assert_eq!(resolved.location.as_str(), "https://cdn.example.com/w.js");
    }

    #[test]
    fn test_override_accepts_absolute_path() {
        let resolution = ExplicitOverride(Some("/opt/tileworker/worker.js".to_string())).resolve();
        assert_eq!(
            resolution,
            Resolution::Resolved(BootstrapLocation::Url(url("file:///opt/tileworker/worker.js")))
        );
    }

    #[test]
    fn test_unusable_override_falls_through() {
        let settings = BootstrapSettings {
            override_location: Some("relative/worker.js".to_string()),
            module_base: Some(url("https://example.com/lib/tiles.js")),
            ..BootstrapSettings::default()
        };
        let resolved = resolve(&settings);
        assert_eq!(resolved.resolver, "module-relative");
        assert_eq!(
            resolved.location.as_str(),
            "https://example.com/lib/tile-worker.js"
        );
    }

    #[test]
    fn test_opaque_module_base_falls_through_to_origin() {
        let settings = BootstrapSettings {
            module_base: Some(url("data:text/javascript,0")),
            origin: Some(url("https://maps.example.com:8443/app/")),
            entry: "/workers/tile.js".to_string(),
            ..BootstrapSettings::default()
        };
        let resolved = resolve(&settings);
        assert_eq!(resolved.resolver, "same-origin");
        assert_eq!(
            resolved.location.as_str(),
            "https://maps.example.com:8443/workers/tile.js"
        );
    }

    #[test]
    fn test_opaque_origin_falls_through_to_verbatim() {
        let settings = BootstrapSettings {
            origin: Some(url("data:text/plain,hello")),
            entry: "worker.js".to_string(),
            ..BootstrapSettings::default()
        };
        let resolved = resolve(&settings);
        assert_eq!(resolved.resolver, "verbatim");
        assert_eq!(
            resolved.location,
            BootstrapLocation::Verbatim("worker.js".to_string())
        );
    }

    #[test]
    fn test_default_settings_resolve_verbatim() {
        let resolved = resolve(&BootstrapSettings::default());
        assert_eq!(resolved.location.to_string(), DEFAULT_WORKER_ENTRY);
    }

    #[test]
    fn test_empty_chain_resolves_nothing() {
        let chain = BootstrapChain::new(vec![Box::new(ExplicitOverride(None))]);
        assert!(chain.resolve().is_none());
        assert_eq!(format!("{:?}", chain), r#"["override"]"#);
    }
}
