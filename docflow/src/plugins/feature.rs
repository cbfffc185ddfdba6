//! Stateful plugin types.

use super::HandlerDecl;
use crate::context::Context;
use crate::core::{HookPoint, HookResult};
use parking_lot::Mutex;
use std::any::{Any, TypeId};
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

/// A per-run feature instance, shared between the context and the handlers
/// invoked on it.
pub type FeatureInstance = Arc<Mutex<Box<dyn Any + Send>>>;

/// A stateful plugin, instantiated once per run.
///
/// ```rust,ignore
/// #[derive(Default)]
/// struct Watermark { applied: bool }
///
/// impl Feature for Watermark {
///     const NAME: &'static str = "Watermark";
///
///     fn register_hooks(hooks: &mut FeatureHooks<Self>) {
///         hooks
///             .on("post_save_docx", "stamp", |feature, ctx| {
///                 feature.applied = true;
///                 Ok(())
///             })
///             .after("Coverpage");
///     }
/// }
/// ```
pub trait Feature: Default + Send + 'static {
    /// The group name; handler identifiers are `<NAME>.<method>`.
    const NAME: &'static str;

    /// Declares this feature's handlers.
    fn register_hooks(hooks: &mut FeatureHooks<Self>);
}

/// Collects the handlers of feature type `F`.
pub struct FeatureHooks<F> {
    handlers: Vec<HandlerDecl>,
    _feature: PhantomData<fn() -> F>,
}

impl<F: Feature> FeatureHooks<F> {
    fn new() -> Self {
        Self {
            handlers: Vec::new(),
            _feature: PhantomData,
        }
    }

    /// Binds a method to a hook point and returns its declaration for
    /// ordering and predicates.
    pub fn on<M>(&mut self, hook: impl Into<HookPoint>, name: &str, method: M) -> &mut HandlerDecl
    where
        M: Fn(&mut F, &mut Context) -> HookResult + Send + Sync + 'static,
    {
        self.handlers
            .push(HandlerDecl::method::<F, M>(F::NAME, name, hook.into(), method));
        let index = self.handlers.len() - 1;
        &mut self.handlers[index]
    }
}

fn instantiate<F: Feature>() -> Box<dyn Any + Send> {
    Box::new(F::default())
}

/// A resolved feature type: its name, handlers and a factory.
pub struct FeatureType {
    name: &'static str,
    type_id: TypeId,
    factory: fn() -> Box<dyn Any + Send>,
    handlers: Vec<Arc<HandlerDecl>>,
}

impl FeatureType {
    /// Describes feature type `F`.
    #[must_use]
    pub fn of<F: Feature>() -> Arc<Self> {
        let mut hooks = FeatureHooks::<F>::new();
        F::register_hooks(&mut hooks);

        Arc::new(Self {
            name: F::NAME,
            type_id: TypeId::of::<F>(),
            factory: instantiate::<F>,
            handlers: hooks.handlers.into_iter().map(Arc::new).collect(),
        })
    }

    /// The group name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.name
    }

    /// Returns true if this describes `F`.
    #[must_use]
    pub fn is<F: Feature>(&self) -> bool {
        self.type_id == TypeId::of::<F>()
    }

    /// Every handler the type declares.
    #[must_use]
    pub fn handlers(&self) -> &[Arc<HandlerDecl>] {
        &self.handlers
    }

    /// The handlers bound to `hook`.
    pub fn handlers_for<'a>(
        &'a self,
        hook: &'a HookPoint,
    ) -> impl Iterator<Item = &'a Arc<HandlerDecl>> + 'a {
        self.handlers.iter().filter(move |h| h.hook() == hook)
    }

    /// Creates a fresh instance for a run.
    #[must_use]
    pub fn instantiate(&self) -> FeatureInstance {
        Arc::new(Mutex::new((self.factory)()))
    }
}

impl fmt::Debug for FeatureType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FeatureType")
            .field("name", &self.name)
            .field("handlers", &self.handlers)
            .finish()
    }
}

/// A feature given either by name or as an already-resolved type.
#[derive(Debug, Clone)]
pub enum FeatureRef {
    /// A registered name, `<package>.<Type>` or bare package name.
    Name(String),
    /// A resolved type; resolution returns it unchanged.
    Type(Arc<FeatureType>),
}

impl From<&str> for FeatureRef {
    fn from(name: &str) -> Self {
        Self::Name(name.to_string())
    }
}

impl From<String> for FeatureRef {
    fn from(name: String) -> Self {
        Self::Name(name)
    }
}

impl From<&String> for FeatureRef {
    fn from(name: &String) -> Self {
        Self::Name(name.clone())
    }
}

impl From<Arc<FeatureType>> for FeatureRef {
    fn from(ty: Arc<FeatureType>) -> Self {
        Self::Type(ty)
    }
}

impl From<&Arc<FeatureType>> for FeatureRef {
    fn from(ty: &Arc<FeatureType>) -> Self {
        Self::Type(Arc::clone(ty))
    }
}
