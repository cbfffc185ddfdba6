//! Handler ordering at a hook point.

use crate::context::Context;
use crate::core::{HookPoint, HookResult};
use crate::errors::{DocflowError, PluginNotFoundError, SchedulingConflictError};
use crate::plugins::{FeatureInstance, HackRegistry, HandlerDecl, OrderRef, PluginRegistry};
use indexmap::IndexMap;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Arc;
use tracing::{debug, trace};

/// Predecessor sets keyed by handler id: `deps[b]` holds every `a` that
/// must run before `b`.
type Dependencies = BTreeMap<String, BTreeSet<String>>;

/// A handler selected to run, with the feature instance it runs against.
#[derive(Debug, Clone)]
pub struct ScheduledHandler {
    /// The handler declaration.
    pub decl: Arc<HandlerDecl>,
    /// The run's instance of the owning feature; `None` for hacks.
    pub instance: Option<FeatureInstance>,
}

impl ScheduledHandler {
    /// The handler identifier.
    #[must_use]
    pub fn id(&self) -> &str {
        self.decl.id()
    }

    /// Invokes the handler.
    pub fn run(&self, ctx: &mut Context) -> HookResult {
        self.decl.invoke(self.instance.as_ref(), ctx)
    }
}

/// Computes the execution order of the handlers bound to a hook point.
///
/// Candidates are the handlers of the run's declared features followed by
/// the enabled hacks. Ordering references are expanded to concrete ids
/// (a group becomes every handler its feature contributes at this hook),
/// the resulting graph is sorted level by level with ties broken by id,
/// and the order is filtered down to the candidates.
#[derive(Debug, Clone)]
pub struct Scheduler {
    plugins: Arc<PluginRegistry>,
    hacks: Arc<HackRegistry>,
}

impl Scheduler {
    /// Creates a scheduler over the given registries.
    #[must_use]
    pub fn new(plugins: Arc<PluginRegistry>, hacks: Arc<HackRegistry>) -> Self {
        Self { plugins, hacks }
    }

    /// The feature registry used to expand group references.
    #[must_use]
    pub fn plugins(&self) -> &Arc<PluginRegistry> {
        &self.plugins
    }

    /// The hack registry candidates are drawn from.
    #[must_use]
    pub fn hacks(&self) -> &Arc<HackRegistry> {
        &self.hacks
    }

    /// Returns the handlers to run at `hook`, in order.
    pub fn schedule(
        &self,
        ctx: &Context,
        hook: &HookPoint,
    ) -> Result<Vec<ScheduledHandler>, DocflowError> {
        let mut candidates = self.collect_candidates(ctx, hook)?;
        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        let deps = self.dependencies(ctx, hook, &candidates)?;
        let order = toposort(deps)
            .map_err(|cycle| SchedulingConflictError::new(hook.as_str(), cycle))?;

        let scheduled: Vec<_> = order
            .iter()
            .filter_map(|id| candidates.shift_remove(id))
            .collect();

        trace!(
            hook = %hook,
            order = ?scheduled.iter().map(ScheduledHandler::id).collect::<Vec<_>>(),
            "Hook scheduled"
        );
        Ok(scheduled)
    }

    fn collect_candidates(
        &self,
        ctx: &Context,
        hook: &HookPoint,
    ) -> Result<IndexMap<String, ScheduledHandler>, DocflowError> {
        let mut candidates = IndexMap::new();

        for (ty, instance) in ctx.features() {
            for decl in ty.handlers_for(hook) {
                candidates.insert(
                    decl.id().to_string(),
                    ScheduledHandler {
                        decl: Arc::clone(decl),
                        instance: Some(Arc::clone(instance)),
                    },
                );
            }
        }

        for hack in self.hacks.list(Some(hook)) {
            if HackRegistry::is_disabled(ctx, &hack)? {
                debug!(hook = %hook, hack = %hack.id(), "Hack disabled for this run");
                continue;
            }
            candidates.insert(
                hack.id().to_string(),
                ScheduledHandler {
                    decl: hack,
                    instance: None,
                },
            );
        }

        Ok(candidates)
    }

    fn dependencies(
        &self,
        ctx: &Context,
        hook: &HookPoint,
        candidates: &IndexMap<String, ScheduledHandler>,
    ) -> Result<Dependencies, DocflowError> {
        let mut deps: Dependencies = candidates
            .keys()
            .map(|id| (id.clone(), BTreeSet::new()))
            .collect();

        for (id, handler) in candidates {
            for reference in handler.decl.after_refs() {
                for target in self.expand(ctx, hook, reference)? {
                    if target != *id {
                        deps.entry(id.clone()).or_default().insert(target.clone());
                        deps.entry(target).or_default();
                    }
                }
            }
            for reference in handler.decl.before_refs() {
                for target in self.expand(ctx, hook, reference)? {
                    if target != *id {
                        deps.entry(target).or_default().insert(id.clone());
                    }
                }
            }
        }

        Ok(deps)
    }

    fn expand(
        &self,
        ctx: &Context,
        hook: &HookPoint,
        reference: &OrderRef,
    ) -> Result<Vec<String>, DocflowError> {
        match reference {
            OrderRef::Handler(id) => Ok(vec![id.clone()]),
            OrderRef::Group(name) => self
                .group_handlers(ctx, hook, name)
                .ok_or_else(|| PluginNotFoundError::new(name).into()),
            OrderRef::Named(name) => Ok(self
                .group_handlers(ctx, hook, name)
                .unwrap_or_else(|| vec![name.clone()])),
        }
    }

    fn group_handlers(&self, ctx: &Context, hook: &HookPoint, group: &str) -> Option<Vec<String>> {
        let ty = ctx
            .feature_types()
            .iter()
            .find(|ty| ty.name() == group)
            .cloned()
            .or_else(|| self.plugins.lookup(group))?;

        Some(
            ty.handlers_for(hook)
                .map(|decl| decl.id().to_string())
                .collect(),
        )
    }
}

/// Sorts level by level; each level is in id order.
///
/// On a cycle, returns one cycle path in run order, first id repeated at
/// the end.
fn toposort(mut remaining: Dependencies) -> Result<Vec<String>, Vec<String>> {
    let mut order = Vec::with_capacity(remaining.len());

    loop {
        let ready: Vec<String> = remaining
            .iter()
            .filter(|(_, preds)| preds.is_empty())
            .map(|(id, _)| id.clone())
            .collect();
        if ready.is_empty() {
            break;
        }

        for id in &ready {
            remaining.remove(id);
        }
        for preds in remaining.values_mut() {
            for id in &ready {
                preds.remove(id);
            }
        }
        order.extend(ready);
    }

    if remaining.is_empty() {
        Ok(order)
    } else {
        Err(find_cycle(&remaining).unwrap_or_else(|| remaining.keys().cloned().collect()))
    }
}

fn find_cycle(deps: &Dependencies) -> Option<Vec<String>> {
    let mut visited = HashSet::new();
    let mut rec_stack = HashSet::new();
    let mut path = Vec::new();

    for id in deps.keys() {
        if !visited.contains(id) {
            if let Some(mut cycle) = dfs_cycle(deps, id, &mut visited, &mut rec_stack, &mut path) {
                cycle.reverse();
                return Some(cycle);
            }
        }
    }
    None
}

fn dfs_cycle(
    deps: &Dependencies,
    node: &str,
    visited: &mut HashSet<String>,
    rec_stack: &mut HashSet<String>,
    path: &mut Vec<String>,
) -> Option<Vec<String>> {
    visited.insert(node.to_string());
    rec_stack.insert(node.to_string());
    path.push(node.to_string());

    if let Some(preds) = deps.get(node) {
        for pred in preds {
            if !visited.contains(pred) {
                if let Some(cycle) = dfs_cycle(deps, pred, visited, rec_stack, path) {
                    return Some(cycle);
                }
            } else if rec_stack.contains(pred) {
                let start = path.iter().position(|n| n == pred)?;
                let mut cycle = path[start..].to_vec();
                cycle.push(pred.clone());
                return Some(cycle);
            }
        }
    }

    path.pop();
    rec_stack.remove(node);
    None
}
