//! Flat, dot-namespaced configuration.
//!
//! This module provides:
//! - The `Options` store used by every run
//! - Flattening of nested mappings into dotted keys
//! - Boolean token parsing
//! - Layered loading from option files and the environment

mod flatten;
mod loader;
mod store;

pub use flatten::{flatten, option_is_false, option_is_true, render_value};
pub use loader::{
    features_options_from_env, load_options_from_file, load_options_from_str, ConfigLayers,
    LoadedOptions, DEFAULT_ENV_PREFIX, DOTFILES,
};
pub use store::Options;
