//! Feature discovery and resolution.

use super::{Feature, FeatureRef, FeatureType};
use crate::errors::{DocflowError, PluginNotFoundError};
use dashmap::DashMap;
use indexmap::IndexMap;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use tracing::{debug, warn};

/// Package name of the features shipped with docflow.
pub const BUILTIN_FEATURE_PACKAGE: &str = "docflow.features";

/// The feature types one package registers, in registration order.
#[derive(Debug)]
pub struct FeatureTable {
    package: String,
    entries: IndexMap<String, Arc<FeatureType>>,
}

impl FeatureTable {
    fn new(package: &str) -> Self {
        Self {
            package: package.to_string(),
            entries: IndexMap::new(),
        }
    }

    /// Registers feature type `F` under its own name.
    pub fn add<F: Feature>(&mut self) -> &mut Self {
        self.add_type(FeatureType::of::<F>())
    }

    /// Registers an already-described type under its own name.
    pub fn add_type(&mut self, ty: Arc<FeatureType>) -> &mut Self {
        self.entries.insert(ty.name().to_string(), ty);
        self
    }

    /// The package being registered.
    #[must_use]
    pub fn package(&self) -> &str {
        &self.package
    }

    /// Returns the number of registered types.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing was registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

type RegisterFeatures = Arc<dyn Fn(&mut FeatureTable) + Send + Sync>;

/// A package of features: a name plus the function that registers them.
#[derive(Clone)]
pub struct PluginSource {
    package: String,
    register: RegisterFeatures,
}

impl PluginSource {
    /// Creates a source.
    pub fn new<R>(package: impl Into<String>, register: R) -> Self
    where
        R: Fn(&mut FeatureTable) + Send + Sync + 'static,
    {
        Self {
            package: package.into(),
            register: Arc::new(register),
        }
    }

    /// The package name.
    #[must_use]
    pub fn package(&self) -> &str {
        &self.package
    }

    fn table(&self) -> FeatureTable {
        let mut table = FeatureTable::new(&self.package);
        (self.register)(&mut table);
        table
    }
}

/// Resolves feature names to types.
///
/// The name cache is built on first use from every registered source, in
/// registration order. A later source that reuses a name is stored under
/// `<package>.<Name>` instead. Once built, lookups take no locks.
#[derive(Default)]
pub struct PluginRegistry {
    sources: Vec<PluginSource>,
    cache: OnceLock<HashMap<String, Arc<FeatureType>>>,
    resolved: DashMap<String, Arc<FeatureType>>,
}

impl PluginRegistry {
    /// Creates a registry with no sources.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry holding the built-in features.
    #[must_use]
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.register_package(BUILTIN_FEATURE_PACKAGE, crate::features::register_builtin);
        registry
    }

    /// Adds a package of features and resets the name cache.
    pub fn register_package<R>(&mut self, package: impl Into<String>, register: R) -> &mut Self
    where
        R: Fn(&mut FeatureTable) + Send + Sync + 'static,
    {
        self.add_source(PluginSource::new(package, register))
    }

    /// Adds a prepared source and resets the name cache.
    pub fn add_source(&mut self, source: PluginSource) -> &mut Self {
        self.sources.push(source);
        self.cache = OnceLock::new();
        self.resolved.clear();
        self
    }

    /// Builds the name cache if it has not been built yet.
    pub fn initialize(&self) -> &HashMap<String, Arc<FeatureType>> {
        self.cache.get_or_init(|| self.scan())
    }

    fn scan(&self) -> HashMap<String, Arc<FeatureType>> {
        let mut cache = HashMap::new();

        for source in &self.sources {
            for (name, ty) in source.table().entries {
                if cache.contains_key(&name) {
                    let qualified = format!("{}.{name}", source.package);
                    warn!(
                        feature = %name,
                        package = %source.package,
                        qualified = %qualified,
                        "Feature name already registered, storing qualified name"
                    );
                    cache.insert(qualified, ty);
                } else {
                    cache.insert(name, ty);
                }
            }
        }

        debug!(count = cache.len(), "Feature registry initialized");
        cache
    }

    /// Looks up a name in the cache without dynamic resolution.
    #[must_use]
    pub fn lookup(&self, name: &str) -> Option<Arc<FeatureType>> {
        self.initialize()
            .get(name)
            .cloned()
            .or_else(|| self.resolved.get(name).map(|entry| Arc::clone(entry.value())))
    }

    /// Resolves a feature reference to its type.
    ///
    /// Types pass through unchanged. Names are looked up in the cache, then
    /// resolved against the sources as a package name (its first type) or
    /// as `<package>.<Type>`.
    pub fn resolve(&self, feature: impl Into<FeatureRef>) -> Result<Arc<FeatureType>, DocflowError> {
        let name = match feature.into() {
            FeatureRef::Type(ty) => return Ok(ty),
            FeatureRef::Name(name) => name,
        };

        if let Some(ty) = self.lookup(&name) {
            return Ok(ty);
        }

        let ty = self
            .resolve_dynamic(&name)
            .ok_or_else(|| PluginNotFoundError::new(&name))?;
        debug!(feature = %name, resolved = %ty.name(), "Resolved feature dynamically");
        self.resolved.insert(name, Arc::clone(&ty));
        Ok(ty)
    }

    fn resolve_dynamic(&self, name: &str) -> Option<Arc<FeatureType>> {
        if let Some(source) = self.sources.iter().find(|s| s.package == name) {
            return source.table().entries.into_values().next();
        }

        let (package, type_name) = name.rsplit_once('.')?;
        self.sources
            .iter()
            .find(|s| s.package == package)
            .and_then(|s| s.table().entries.shift_remove(type_name))
    }

    /// Every cached name, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.initialize().keys().cloned().collect();
        names.sort();
        names
    }
}

impl std::fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginRegistry")
            .field(
                "sources",
                &self.sources.iter().map(PluginSource::package).collect::<Vec<_>>(),
            )
            .field("initialized", &self.cache.get().is_some())
            .finish()
    }
}
