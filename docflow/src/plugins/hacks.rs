//! Stateless, always-registered handler functions.

use super::HandlerDecl;
use crate::context::Context;
use crate::core::{HookPoint, HookResult};
use crate::errors::DocflowError;
use std::collections::HashSet;
use std::sync::{Arc, OnceLock};
use tracing::{debug, warn};

/// The hacks one package registers.
#[derive(Debug)]
pub struct HackTable {
    package: String,
    hacks: Vec<HandlerDecl>,
}

impl HackTable {
    fn new(package: &str) -> Self {
        Self {
            package: package.to_string(),
            hacks: Vec::new(),
        }
    }

    /// Registers a hack and returns its declaration for ordering and
    /// predicates.
    pub fn add<H>(&mut self, name: &str, hook: impl Into<HookPoint>, body: H) -> &mut HandlerDecl
    where
        H: Fn(&mut Context) -> HookResult + Send + Sync + 'static,
    {
        self.hacks.push(HandlerDecl::function(name, hook, body));
        let index = self.hacks.len() - 1;
        &mut self.hacks[index]
    }

    /// The package being registered.
    #[must_use]
    pub fn package(&self) -> &str {
        &self.package
    }
}

type RegisterHacks = Arc<dyn Fn(&mut HackTable) + Send + Sync>;

/// A package of hacks: a name plus the function that registers them.
#[derive(Clone)]
pub struct HackSource {
    package: String,
    register: RegisterHacks,
}

impl HackSource {
    /// Creates a source.
    pub fn new<R>(package: impl Into<String>, register: R) -> Self
    where
        R: Fn(&mut HackTable) + Send + Sync + 'static,
    {
        Self {
            package: package.into(),
            register: Arc::new(register),
        }
    }
}

/// Discovers hacks once and hands out the cached list.
///
/// Hack identifiers are their function names. When two packages register
/// the same name, the later one is scheduled as `<package>.<name>`; both
/// still answer to the same `hacks.disable_<name>` flag.
#[derive(Default)]
pub struct HackRegistry {
    sources: Vec<HackSource>,
    cache: OnceLock<Vec<Arc<HandlerDecl>>>,
}

impl HackRegistry {
    /// Creates a registry with no sources.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a package of hacks and resets the cache.
    pub fn register_package<R>(&mut self, package: impl Into<String>, register: R) -> &mut Self
    where
        R: Fn(&mut HackTable) + Send + Sync + 'static,
    {
        self.sources.push(HackSource::new(package, register));
        self.cache = OnceLock::new();
        self
    }

    /// Builds the hack list if it has not been built yet.
    pub fn initialize(&self) -> &[Arc<HandlerDecl>] {
        self.cache.get_or_init(|| self.scan())
    }

    fn scan(&self) -> Vec<Arc<HandlerDecl>> {
        let mut seen = HashSet::new();
        let mut hacks = Vec::new();

        for source in &self.sources {
            let mut table = HackTable::new(&source.package);
            (source.register)(&mut table);

            for mut hack in table.hacks {
                if !seen.insert(hack.id().to_string()) {
                    hack.qualify(&source.package);
                    warn!(
                        hack = %hack.name(),
                        package = %source.package,
                        qualified = %hack.id(),
                        "Hack name already registered, scheduling under qualified name"
                    );
                }
                hacks.push(Arc::new(hack));
            }
        }

        debug!(count = hacks.len(), "Hack registry initialized");
        hacks
    }

    /// Lists hacks, optionally only those bound to `hook`.
    #[must_use]
    pub fn list(&self, hook: Option<&HookPoint>) -> Vec<Arc<HandlerDecl>> {
        self.initialize()
            .iter()
            .filter(|hack| hook.map_or(true, |hook| hack.hook() == hook))
            .cloned()
            .collect()
    }

    /// The option that disables `hack` for a run.
    #[must_use]
    pub fn disable_flag(hack: &HandlerDecl) -> String {
        format!("hacks.disable_{}", hack.name())
    }

    /// Returns true if the run's options disable `hack`.
    pub fn is_disabled(ctx: &Context, hack: &HandlerDecl) -> Result<bool, DocflowError> {
        ctx.get_boolean(&Self::disable_flag(hack), Some(false))
    }
}

impl std::fmt::Debug for HackRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HackRegistry")
            .field("sources", &self.sources.len())
            .field("initialized", &self.cache.get().is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> HackRegistry {
        let mut registry = HackRegistry::new();
        registry.register_package("acme.hacks", |table| {
            table.add("fix_margins", "pre_save_docx", |_ctx| Ok(()));
            table
                .add("strip_comments", "post_convert_to_docx", |_ctx| Ok(()))
                .after("TableOfContents");
        });
        registry.register_package("other.hacks", |table| {
            table.add("fix_margins", "pre_save_docx", |_ctx| Ok(()));
        });
        registry
    }

    #[test]
    fn test_list_filters_by_hook() {
        let registry = registry();

        assert_eq!(registry.list(None).len(), 3);

        let hook = HookPoint::pre("save_docx");
        let ids: Vec<_> = registry
            .list(Some(&hook))
            .iter()
            .map(|h| h.id().to_string())
            .collect();
        assert_eq!(ids, vec!["fix_margins", "other.hacks.fix_margins"]);
    }

    #[test]
    fn test_disable_flag_uses_bare_name() {
        let registry = registry();
        let hacks = registry.list(Some(&HookPoint::pre("save_docx")));

        let mut ctx = Context::new(None, None);
        ctx.set("hacks.disable_fix_margins", "yes");

        for hack in &hacks {
            assert_eq!(HackRegistry::disable_flag(hack), "hacks.disable_fix_margins");
            assert!(HackRegistry::is_disabled(&ctx, hack).unwrap());
        }
    }

    #[test]
    fn test_enabled_by_default() {
        let registry = registry();
        let ctx = Context::new(None, None);
        for hack in registry.list(None) {
            assert!(!HackRegistry::is_disabled(&ctx, &hack).unwrap());
        }
    }

    #[test]
    fn test_empty_registry() {
        assert!(HackRegistry::new().list(None).is_empty());
    }
}
