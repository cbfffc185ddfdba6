//! Hook scheduling and stage dispatch.
//!
//! Every stage `s` exposes two hook points, `pre_s` and `post_s`. The
//! [`Scheduler`] orders the handlers bound to one hook point; the
//! [`HookDispatcher`] wraps a stage body with its defaults, hooks,
//! predicates and timing.

mod dispatch;
mod scheduler;

pub use dispatch::{AttrDefault, AttrFactory, HookDispatcher, Stage};
pub use scheduler::{ScheduledHandler, Scheduler};
