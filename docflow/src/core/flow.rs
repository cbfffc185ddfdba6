//! Explicit control-flow tags returned by stages, handlers and predicates.

use crate::errors::DocflowError;
use std::fmt;

/// Why a stage, handler, predicate or default factory stopped the run.
///
/// `Ok(_)` is the "continue" tag; the two variants here are the others.
/// Only the pipeline driver matches on [`Halt::Abort`]; everything else
/// propagates it with `?`.
#[derive(Debug)]
pub enum Halt {
    /// A clean early stop. Remaining stages are skipped and the run is
    /// reported as successful.
    Abort {
        /// Human-readable reason for stopping.
        reason: String,
    },
    /// A genuine failure, surfaced to the caller after cleanup.
    Fail(DocflowError),
}

/// Result type used across hook execution.
pub type HookResult<T = ()> = Result<T, Halt>;

impl Halt {
    /// Creates an abort signal.
    #[must_use]
    pub fn abort(reason: impl Into<String>) -> Self {
        Self::Abort {
            reason: reason.into(),
        }
    }

    /// Returns true if this is an abort signal.
    #[must_use]
    pub fn is_abort(&self) -> bool {
        matches!(self, Self::Abort { .. })
    }

    /// Returns the underlying error for failures.
    #[must_use]
    pub fn into_error(self) -> Option<DocflowError> {
        match self {
            Self::Abort { .. } => None,
            Self::Fail(err) => Some(err),
        }
    }
}

impl fmt::Display for Halt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Abort { reason } => write!(f, "aborted: {reason}"),
            Self::Fail(err) => write!(f, "failed: {err}"),
        }
    }
}

impl From<DocflowError> for Halt {
    fn from(err: DocflowError) -> Self {
        Self::Fail(err)
    }
}

impl From<anyhow::Error> for Halt {
    fn from(err: anyhow::Error) -> Self {
        Self::Fail(DocflowError::Runtime(err))
    }
}

impl From<std::io::Error> for Halt {
    fn from(err: std::io::Error) -> Self {
        Self::Fail(DocflowError::Io(err))
    }
}

impl From<serde_json::Error> for Halt {
    fn from(err: serde_json::Error) -> Self {
        Self::Fail(err.into())
    }
}
