//! Per-run state.
//!
//! This module provides:
//! - [`Context`], the mutable state threaded through one build
//! - [`AttributeBag`], the dynamic attributes stages and handlers exchange
//! - [`TempArea`], the run's temporary directory and the files inside it

mod bags;
mod execution;
mod temp;

pub use bags::AttributeBag;
pub use execution::Context;
pub use temp::TempArea;
