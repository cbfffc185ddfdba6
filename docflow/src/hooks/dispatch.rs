//! The five-step stage wrapper.

use super::Scheduler;
use crate::context::Context;
use crate::core::{HookPoint, HookResult};
use crate::events::names;
use crate::plugins::Predicate;
use chrono::Utc;
use serde_json::{json, Value};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info_span};

/// Computes a default attribute value from the context.
pub type AttrFactory = Arc<dyn Fn(&mut Context) -> HookResult<Value> + Send + Sync>;

/// A default attribute assigned before a stage's pre hooks run.
#[derive(Clone)]
pub enum AttrDefault {
    /// A literal value.
    Value(Value),
    /// A value computed from the context.
    Factory(AttrFactory),
}

impl AttrDefault {
    fn evaluate(&self, ctx: &mut Context) -> HookResult<Value> {
        match self {
            Self::Value(value) => Ok(value.clone()),
            Self::Factory(factory) => factory(ctx),
        }
    }
}

impl fmt::Debug for AttrDefault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(value) => f.debug_tuple("Value").field(value).finish(),
            Self::Factory(_) => f.write_str("Factory"),
        }
    }
}

/// A pipeline stage: its name, default attributes and predicates.
#[derive(Clone)]
pub struct Stage {
    name: String,
    defaults: Vec<(String, AttrDefault)>,
    predicates: Vec<Predicate>,
}

impl Stage {
    /// Creates a stage with no defaults or predicates.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            defaults: Vec::new(),
            predicates: Vec::new(),
        }
    }

    /// Assigns a literal attribute before the stage runs.
    #[must_use]
    pub fn with_default(mut self, attr: impl Into<String>, value: impl Into<Value>) -> Self {
        self.defaults
            .push((attr.into(), AttrDefault::Value(value.into())));
        self
    }

    /// Assigns a computed attribute before the stage runs.
    #[must_use]
    pub fn with_default_factory<F>(mut self, attr: impl Into<String>, factory: F) -> Self
    where
        F: Fn(&mut Context) -> HookResult<Value> + Send + Sync + 'static,
    {
        self.defaults
            .push((attr.into(), AttrDefault::Factory(Arc::new(factory))));
        self
    }

    /// Adds a predicate; the body and post hooks run only if all pass.
    #[must_use]
    pub fn when<P>(mut self, predicate: P) -> Self
    where
        P: Fn(&Context) -> HookResult<bool> + Send + Sync + 'static,
    {
        self.predicates.push(Arc::new(predicate));
        self
    }

    /// The stage name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The default attributes, in declaration order.
    #[must_use]
    pub fn defaults(&self) -> &[(String, AttrDefault)] {
        &self.defaults
    }

    /// The `pre_<name>` hook point.
    #[must_use]
    pub fn pre_hook(&self) -> HookPoint {
        HookPoint::pre(&self.name)
    }

    /// The `post_<name>` hook point.
    #[must_use]
    pub fn post_hook(&self) -> HookPoint {
        HookPoint::post(&self.name)
    }
}

impl fmt::Debug for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stage")
            .field("name", &self.name)
            .field("defaults", &self.defaults)
            .field("predicates", &self.predicates.len())
            .finish()
    }
}

/// Runs stage bodies wrapped in their hooks.
///
/// 1. assign default attributes
/// 2. run `pre_<stage>` handlers
/// 3. check stage predicates; stop quietly if one is false
/// 4. run and time the body
/// 5. run `post_<stage>` handlers
#[derive(Debug, Clone)]
pub struct HookDispatcher {
    scheduler: Scheduler,
}

impl HookDispatcher {
    /// Creates a dispatcher.
    #[must_use]
    pub fn new(scheduler: Scheduler) -> Self {
        Self { scheduler }
    }

    /// The scheduler used to order handlers.
    #[must_use]
    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// Runs `body` as `stage`.
    pub fn run_stage<B>(&self, ctx: &mut Context, stage: &Stage, body: B) -> HookResult
    where
        B: FnOnce(&mut Context) -> HookResult,
    {
        let span = info_span!("stage", stage = %stage.name(), run_id = %ctx.run_id());
        let _guard = span.enter();
        ctx.emit(names::STAGE_STARTED, Some(json!({ "stage": stage.name() })));

        for (attr, default) in stage.defaults() {
            let value = default.evaluate(ctx)?;
            ctx.attrs.set(attr.clone(), value);
        }

        self.run_hook(ctx, &stage.pre_hook())?;

        for predicate in &stage.predicates {
            if !predicate(ctx)? {
                debug!(stage = %stage.name(), "Stage predicate false, skipping body");
                ctx.emit(names::STAGE_SKIPPED, Some(json!({ "stage": stage.name() })));
                return Ok(());
            }
        }

        let started_at = Utc::now();
        let start = Instant::now();
        body(ctx)?;
        let duration = start.elapsed();
        ctx.record_timing(stage.name(), duration, started_at);
        debug!(
            stage = %stage.name(),
            duration_ms = duration.as_secs_f64() * 1000.0,
            "Stage body completed"
        );

        self.run_hook(ctx, &stage.post_hook())?;

        ctx.emit(
            names::STAGE_COMPLETED,
            Some(json!({ "stage": stage.name(), "duration_secs": duration.as_secs_f64() })),
        );
        Ok(())
    }

    /// Runs the handlers scheduled at `hook`, skipping those whose
    /// predicates are false.
    pub fn run_hook(&self, ctx: &mut Context, hook: &HookPoint) -> HookResult {
        let handlers = self.scheduler.schedule(ctx, hook)?;

        for handler in &handlers {
            if !handler.decl.check_predicates(ctx)? {
                debug!(hook = %hook, handler = %handler.id(), "Handler predicate false, skipping");
                ctx.emit(
                    names::HANDLER_SKIPPED,
                    Some(json!({ "hook": hook.as_str(), "handler": handler.id() })),
                );
                continue;
            }

            debug!(hook = %hook, handler = %handler.id(), "Running handler");
            handler.run(ctx)?;
            ctx.emit(
                names::HANDLER_COMPLETED,
                Some(json!({ "hook": hook.as_str(), "handler": handler.id() })),
            );
        }

        Ok(())
    }
}
