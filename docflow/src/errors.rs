//! Error types for the docflow engine.
//!
//! Every fallible engine operation returns [`DocflowError`]. Early
//! termination of a run is not an error; it travels as
//! [`Halt::Abort`](crate::core::Halt) instead.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// The main error type for docflow operations.
#[derive(Debug, Error)]
pub enum DocflowError {
    /// A plugin name could not be resolved to a feature type.
    #[error("{0}")]
    PluginNotFound(#[from] PluginNotFoundError),

    /// The before/after constraints at a hook point form a cycle.
    #[error("{0}")]
    SchedulingConflict(#[from] SchedulingConflictError),

    /// A required configuration key is absent.
    #[error("Missing option: {key}")]
    MissingOption {
        /// The requested key.
        key: String,
    },

    /// A configuration value is neither a truthy nor a falsy token.
    #[error("{key}: {value} is neither true nor false")]
    InvalidBoolean {
        /// The requested key.
        key: String,
        /// The stored value, rendered as a string.
        value: String,
    },

    /// A dynamic attribute expected by a stage or handler was never written.
    #[error("Missing attribute: {name}")]
    MissingAttribute {
        /// The attribute name.
        name: String,
    },

    /// The run's temporary area was used before it was set up.
    #[error("Temporary area has not been initialized for this run")]
    TempAreaUnavailable,

    /// An options file or layer could not be loaded.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A handler or stage body failed.
    #[error(transparent)]
    Runtime(#[from] anyhow::Error),

    /// A generic internal error.
    #[error("Internal error: {0}")]
    Internal(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl DocflowError {
    /// Creates a missing option error.
    #[must_use]
    pub fn missing_option(key: impl Into<String>) -> Self {
        Self::MissingOption { key: key.into() }
    }

    /// Creates an invalid boolean error.
    #[must_use]
    pub fn invalid_boolean(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self::InvalidBoolean {
            key: key.into(),
            value: value.into(),
        }
    }

    /// Creates a missing attribute error.
    #[must_use]
    pub fn missing_attribute(name: impl Into<String>) -> Self {
        Self::MissingAttribute { name: name.into() }
    }

    /// Returns the diagnostic info attached to this error, if any.
    #[must_use]
    pub fn error_info(&self) -> Option<&ErrorInfo> {
        match self {
            Self::PluginNotFound(err) => Some(&err.error_info),
            Self::SchedulingConflict(err) => Some(&err.error_info),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for DocflowError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for DocflowError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::Config(err.to_string())
    }
}

/// Diagnostic metadata attached to engine errors.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ErrorInfo {
    /// Error code (e.g., "HOOK-001-CYCLE").
    pub code: String,
    /// Short summary of the error.
    pub summary: String,
    /// Hint for fixing the error.
    pub fix_hint: Option<String>,
    /// Additional context key-value pairs.
    #[serde(default)]
    pub context: HashMap<String, String>,
}

impl ErrorInfo {
    /// Creates a new error info.
    #[must_use]
    pub fn new(code: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            summary: summary.into(),
            fix_hint: None,
            context: HashMap::new(),
        }
    }

    /// Sets the fix hint.
    #[must_use]
    pub fn with_fix_hint(mut self, hint: impl Into<String>) -> Self {
        self.fix_hint = Some(hint.into());
        self
    }

    /// Adds a single context entry.
    #[must_use]
    pub fn with_context_entry(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }
}

/// Error raised when a feature name cannot be resolved.
#[derive(Debug, Clone, Error)]
#[error("Feature not found: {name}")]
pub struct PluginNotFoundError {
    /// The requested name.
    pub name: String,
    /// Diagnostic info.
    pub error_info: ErrorInfo,
}

impl PluginNotFoundError {
    /// Creates a new plugin not found error.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let info = ErrorInfo::new(
            "PLUGIN-001-NOT_FOUND",
            format!("No registered or resolvable feature named '{name}'"),
        )
        .with_fix_hint(
            "Register the package that provides the feature, or use a '<package>.<Type>' name.",
        );

        Self {
            name,
            error_info: info,
        }
    }
}

/// Error raised when handler ordering at a hook point is cyclic.
#[derive(Debug, Clone, Error)]
#[error("Scheduling conflict at '{hook}': {}", cycle_path.join(" -> "))]
pub struct SchedulingConflictError {
    /// The hook point being scheduled.
    pub hook: String,
    /// The handlers forming the cycle, first entry repeated at the end.
    pub cycle_path: Vec<String>,
    /// Diagnostic info.
    pub error_info: ErrorInfo,
}

impl SchedulingConflictError {
    /// Creates a new scheduling conflict error.
    #[must_use]
    pub fn new(hook: impl Into<String>, cycle_path: Vec<String>) -> Self {
        let hook = hook.into();
        let info = ErrorInfo::new(
            "HOOK-001-CYCLE",
            format!("Handler ordering contains a cycle: {}", cycle_path.join(" -> ")),
        )
        .with_fix_hint("Remove one of the before/after constraints in the cycle.")
        .with_context_entry("hook", hook.clone());

        Self {
            hook,
            cycle_path,
            error_info: info,
        }
    }
}
