//! Plugin model: handlers, features, hacks and their registries.
//!
//! Features are stateful plugin types instantiated once per run; hacks are
//! stateless handler functions that are always registered and can be
//! disabled per run with `hacks.disable_<name>`. Both contribute
//! [`HandlerDecl`]s bound to a single hook point.

mod feature;
mod hacks;
mod handler;
mod registry;

pub use feature::{Feature, FeatureHooks, FeatureInstance, FeatureRef, FeatureType};
pub use hacks::{HackRegistry, HackSource, HackTable};
pub use handler::{HackFn, HandlerDecl, OrderRef, Predicate};
pub use registry::{FeatureTable, PluginRegistry, PluginSource, BUILTIN_FEATURE_PACKAGE};
