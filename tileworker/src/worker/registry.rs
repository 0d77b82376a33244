//! Source-type registry consulted by the dispatcher.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

use super::error::RegistryError;
use super::source::{WorkerContext, WorkerSource};
use super::vector::{VectorTileSource, VECTOR_SOURCE_TYPE};

/// Builds the source instance for one worker thread.
pub type SourceConstructor = Arc<dyn Fn(&WorkerContext) -> Arc<dyn WorkerSource> + Send + Sync>;

/// Populates a worker's registry at thread startup.
///
/// The hook runs once on every worker thread before that thread processes
/// any request.
pub type RegistryBootstrap = Arc<dyn Fn(&mut WorkerSourceRegistry) + Send + Sync>;

/// Maps source-type names to constructors.
///
/// Owned by a single worker thread and handed to its dispatcher; it is not
/// shared or mutated once dispatch has started.
#[derive(Default)]
pub struct WorkerSourceRegistry {
    constructors: HashMap<String, SourceConstructor>,
}

impl WorkerSourceRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry holding the built-in `vector` source.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register_defaults();
        registry
    }

    /// Registers the built-in sources.
    pub fn register_defaults(&mut self) {
        self.register(VECTOR_SOURCE_TYPE, |ctx: &WorkerContext| {
            Arc::new(VectorTileSource::new(ctx.quantizer.clone())) as Arc<dyn WorkerSource>
        });
    }

    /// Binds `name` to `constructor`, replacing any previous binding.
    ///
    /// Returns true if an earlier constructor was replaced.
    pub fn register<F>(&mut self, name: impl Into<String>, constructor: F) -> bool
    where
        F: Fn(&WorkerContext) -> Arc<dyn WorkerSource> + Send + Sync + 'static,
    {
        let name = name.into();
        let replaced = self
            .constructors
            .insert(name.clone(), Arc::new(constructor))
            .is_some();
        if replaced {
            warn!(source_type = %name, "Worker source type re-registered; previous constructor replaced");
        } else {
            debug!(source_type = %name, "Registered worker source type");
        }
        replaced
    }

    /// Binds `name` to `constructor` unless it is already bound.
    ///
    /// # Errors
    ///
    /// [`RegistryError::DuplicateSourceType`] if `name` is taken.
    pub fn try_register<F>(
        &mut self,
        name: impl Into<String>,
        constructor: F,
    ) -> Result<(), RegistryError>
    where
        F: Fn(&WorkerContext) -> Arc<dyn WorkerSource> + Send + Sync + 'static,
    {
        let name = name.into();
        if self.constructors.contains_key(&name) {
            return Err(RegistryError::DuplicateSourceType(name));
        }
        self.register(name, constructor);
        Ok(())
    }

    /// Constructor bound to `name`.
    pub fn get(&self, name: &str) -> Option<&SourceConstructor> {
        self.constructors.get(name)
    }

    /// Returns true if `name` is bound.
    pub fn contains(&self, name: &str) -> bool {
        self.constructors.contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.constructors.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Number of registered source types.
    pub fn len(&self) -> usize {
        self.constructors.len()
    }

    /// Returns true if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.constructors.is_empty()
    }
}

impl fmt::Debug for WorkerSourceRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerSourceRegistry")
            .field("source_types", &self.names())
            .finish()
    }
}
