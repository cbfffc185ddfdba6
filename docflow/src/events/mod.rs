//! Lifecycle events emitted while a run executes.
//!
//! Event types:
//!
//! | Event | Payload |
//! |-------|---------|
//! | `run.started` | `run_id`, `srcfile`, `features` |
//! | `stage.started` | `stage` |
//! | `stage.skipped` | `stage` |
//! | `stage.completed` | `stage`, `duration_secs` |
//! | `handler.completed` | `hook`, `handler` |
//! | `handler.skipped` | `hook`, `handler` |
//! | `run.aborted` | `reason` |
//! | `run.completed` | `output`, `timing` |
//! | `run.failed` | `error` |

mod sink;

pub use sink::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};

/// Event type names.
pub mod names {
    /// A run has begun.
    pub const RUN_STARTED: &str = "run.started";
    /// A stage is about to apply defaults and run its pre hooks.
    pub const STAGE_STARTED: &str = "stage.started";
    /// A stage predicate was false; body and post hooks did not run.
    pub const STAGE_SKIPPED: &str = "stage.skipped";
    /// A stage body and its post hooks finished.
    pub const STAGE_COMPLETED: &str = "stage.completed";
    /// A handler returned normally.
    pub const HANDLER_COMPLETED: &str = "handler.completed";
    /// A handler predicate was false.
    pub const HANDLER_SKIPPED: &str = "handler.skipped";
    /// The run was aborted by a handler.
    pub const RUN_ABORTED: &str = "run.aborted";
    /// The run finished all stages.
    pub const RUN_COMPLETED: &str = "run.completed";
    /// The run failed with an error.
    pub const RUN_FAILED: &str = "run.failed";
}
