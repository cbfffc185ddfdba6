//! # Docflow
//!
//! A hook orchestration engine for plugin-driven document builds.
//!
//! A build runs a fixed sequence of named stages. Around every stage the
//! engine fires a `pre_<stage>` and a `post_<stage>` hook point, and any
//! number of handlers may attach to a hook point:
//!
//! - **Features**: named plugin types declared per run, each contributing
//!   handler methods bound to a per-run instance
//! - **Hacks**: free-standing handlers discovered from registered packages,
//!   individually disabled through `hacks.disable_<name>`
//! - **Ordering**: handlers declare `before`/`after` constraints against
//!   other handlers or whole feature groups; the scheduler resolves them
//!   with a deterministic topological sort and reports cycles
//! - **Gating**: handlers and stages carry predicates over the run context
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use docflow::prelude::*;
//!
//! let docmaker = Docmaker::with_builtin().with_features(["DraftMode"])?;
//! let output = docmaker.run("report.md", None)?;
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod context;
pub mod core;
pub mod driver;
pub mod errors;
pub mod events;
pub mod features;
pub mod hooks;
pub mod observability;
pub mod options;
pub mod plugins;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::context::{AttributeBag, Context};
    pub use crate::core::{Halt, HookPoint, HookResult, StageTiming};
    pub use crate::driver::{BuildOutcome, BuildRequest, Converter, ConverterArgs, Docmaker};
    pub use crate::errors::{DocflowError, PluginNotFoundError, SchedulingConflictError};
    pub use crate::events::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};
    pub use crate::hooks::{HookDispatcher, Scheduler, Stage};
    pub use crate::options::{load_options_from_file, ConfigLayers, LoadedOptions, Options};
    pub use crate::plugins::{
        Feature, FeatureHooks, FeatureTable, HackRegistry, HackTable, HandlerDecl, OrderRef,
        PluginRegistry,
    };
}
