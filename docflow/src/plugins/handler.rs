//! Handler declarations.

use super::FeatureInstance;
use crate::context::Context;
use crate::core::{Halt, HookPoint, HookResult};
use crate::errors::DocflowError;
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// Gate evaluated against a read-only view of the run context.
pub type Predicate = Arc<dyn Fn(&Context) -> HookResult<bool> + Send + Sync>;

/// Body of a hack: a stateless function of the context.
pub type HackFn = Arc<dyn Fn(&mut Context) -> HookResult + Send + Sync>;

/// Body of a feature method, erased over the feature's concrete type.
pub(crate) type MethodFn =
    Arc<dyn Fn(&mut (dyn Any + Send), &mut Context) -> HookResult + Send + Sync>;

/// A before/after ordering reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum OrderRef {
    /// A single handler identifier, e.g. `TableOfContents.insert`.
    Handler(String),
    /// Every handler a feature contributes at the hook being scheduled.
    Group(String),
    /// A plain name: a feature group if one is known when scheduling,
    /// otherwise a hack identifier.
    Named(String),
}

impl OrderRef {
    /// References a single handler.
    #[must_use]
    pub fn handler(id: impl Into<String>) -> Self {
        Self::Handler(id.into())
    }

    /// References a feature group.
    #[must_use]
    pub fn group(name: impl Into<String>) -> Self {
        Self::Group(name.into())
    }

    /// Parses a loose reference: dotted names are handlers, anything else
    /// is resolved when scheduling.
    #[must_use]
    pub fn parse(reference: &str) -> Self {
        if reference.contains('.') {
            Self::Handler(reference.to_string())
        } else {
            Self::Named(reference.to_string())
        }
    }
}

impl From<&str> for OrderRef {
    fn from(reference: &str) -> Self {
        Self::parse(reference)
    }
}

impl From<String> for OrderRef {
    fn from(reference: String) -> Self {
        Self::parse(&reference)
    }
}

#[derive(Clone)]
enum HandlerBody {
    Method(MethodFn),
    Function(HackFn),
}

/// A unit of behavior bound to one hook point.
#[derive(Clone)]
pub struct HandlerDecl {
    id: String,
    name: String,
    hook: HookPoint,
    group: Option<String>,
    before: Vec<OrderRef>,
    after: Vec<OrderRef>,
    predicates: Vec<Predicate>,
    body: HandlerBody,
}

impl HandlerDecl {
    /// Declares a stateless handler function (a hack).
    pub fn function<H>(name: impl Into<String>, hook: impl Into<HookPoint>, body: H) -> Self
    where
        H: Fn(&mut Context) -> HookResult + Send + Sync + 'static,
    {
        let name = name.into();
        Self {
            id: name.clone(),
            name,
            hook: hook.into(),
            group: None,
            before: Vec::new(),
            after: Vec::new(),
            predicates: Vec::new(),
            body: HandlerBody::Function(Arc::new(body)),
        }
    }

    /// Declares a method of feature type `F`, identified as `<group>.<name>`.
    pub(crate) fn method<F, M>(group: &str, name: &str, hook: HookPoint, method: M) -> Self
    where
        F: Any + Send,
        M: Fn(&mut F, &mut Context) -> HookResult + Send + Sync + 'static,
    {
        let id = format!("{group}.{name}");
        let owner = id.clone();
        let body: MethodFn = Arc::new(
            move |state: &mut (dyn Any + Send), ctx: &mut Context| match state.downcast_mut::<F>() {
                Some(feature) => method(feature, ctx),
                None => Err(Halt::Fail(DocflowError::Internal(format!(
                    "feature instance does not match handler '{owner}'"
                )))),
            },
        );

        Self {
            id,
            name: name.to_string(),
            hook,
            group: Some(group.to_string()),
            before: Vec::new(),
            after: Vec::new(),
            predicates: Vec::new(),
            body: HandlerBody::Method(body),
        }
    }

    /// Orders this handler before `reference`.
    pub fn before(&mut self, reference: impl Into<OrderRef>) -> &mut Self {
        self.before.push(reference.into());
        self
    }

    /// Orders this handler after `reference`.
    pub fn after(&mut self, reference: impl Into<OrderRef>) -> &mut Self {
        self.after.push(reference.into());
        self
    }

    /// Orders this handler before a single handler.
    pub fn before_handler(&mut self, id: impl Into<String>) -> &mut Self {
        self.before(OrderRef::handler(id))
    }

    /// Orders this handler before every handler of a feature group.
    pub fn before_group(&mut self, group: impl Into<String>) -> &mut Self {
        self.before(OrderRef::group(group))
    }

    /// Orders this handler after a single handler.
    pub fn after_handler(&mut self, id: impl Into<String>) -> &mut Self {
        self.after(OrderRef::handler(id))
    }

    /// Orders this handler after every handler of a feature group.
    pub fn after_group(&mut self, group: impl Into<String>) -> &mut Self {
        self.after(OrderRef::group(group))
    }

    /// Adds a predicate; all predicates must pass for the handler to run.
    pub fn when<P>(&mut self, predicate: P) -> &mut Self
    where
        P: Fn(&Context) -> HookResult<bool> + Send + Sync + 'static,
    {
        self.predicates.push(Arc::new(predicate));
        self
    }

    /// The scheduling identifier.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The bare handler name (method or function name).
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The hook point this handler is bound to.
    #[must_use]
    pub fn hook(&self) -> &HookPoint {
        &self.hook
    }

    /// The owning feature group, for feature methods.
    #[must_use]
    pub fn group(&self) -> Option<&str> {
        self.group.as_deref()
    }

    /// References this handler must run before.
    #[must_use]
    pub fn before_refs(&self) -> &[OrderRef] {
        &self.before
    }

    /// References this handler must run after.
    #[must_use]
    pub fn after_refs(&self) -> &[OrderRef] {
        &self.after
    }

    /// Returns true for feature methods.
    #[must_use]
    pub fn is_method(&self) -> bool {
        matches!(self.body, HandlerBody::Method(_))
    }

    /// Evaluates the predicates in order, stopping at the first false one.
    pub fn check_predicates(&self, ctx: &Context) -> HookResult<bool> {
        for predicate in &self.predicates {
            if !predicate(ctx)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Runs the handler body.
    ///
    /// Feature methods need the instance created for this run; the lock is
    /// held only for the duration of the call.
    pub fn invoke(&self, instance: Option<&FeatureInstance>, ctx: &mut Context) -> HookResult {
        match (&self.body, instance) {
            (HandlerBody::Function(body), _) => body(ctx),
            (HandlerBody::Method(body), Some(instance)) => {
                let mut state = instance.lock();
                body(&mut **state, ctx)
            }
            (HandlerBody::Method(_), None) => Err(Halt::Fail(DocflowError::Internal(format!(
                "handler '{}' has no feature instance in this run",
                self.id
            )))),
        }
    }

    pub(crate) fn qualify(&mut self, package: &str) {
        self.id = format!("{package}.{}", self.name);
    }
}

impl fmt::Debug for HandlerDecl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerDecl")
            .field("id", &self.id)
            .field("hook", &self.hook)
            .field("group", &self.group)
            .field("before", &self.before)
            .field("after", &self.after)
            .field("predicates", &self.predicates.len())
            .finish()
    }
}
