//! Core domain model types for docflow.
//!
//! This module contains the fundamental types used throughout the engine:
//! - The `Halt` control-flow tag and `HookResult`
//! - Hook point names
//! - Stage timing entries

mod flow;
mod hook_point;
mod timing;

pub use flow::{Halt, HookResult};
pub use hook_point::{HookPhase, HookPoint};
pub use timing::StageTiming;
