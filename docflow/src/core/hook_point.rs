//! Hook point names.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Which side of a stage body a hook point sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HookPhase {
    /// Runs before the stage predicates and body.
    Pre,
    /// Runs after the stage body.
    Post,
}

impl fmt::Display for HookPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pre => write!(f, "pre"),
            Self::Post => write!(f, "post"),
        }
    }
}

/// A named location where handlers are scheduled, e.g. `pre_finalize`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HookPoint(String);

impl HookPoint {
    /// Creates a hook point from its full name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The hook point that runs before `stage`.
    #[must_use]
    pub fn pre(stage: &str) -> Self {
        Self::of(HookPhase::Pre, stage)
    }

    /// The hook point that runs after `stage`.
    #[must_use]
    pub fn post(stage: &str) -> Self {
        Self::of(HookPhase::Post, stage)
    }

    /// The hook point for `stage` in the given phase.
    #[must_use]
    pub fn of(phase: HookPhase, stage: &str) -> Self {
        Self(format!("{phase}_{stage}"))
    }

    /// Returns the full hook point name.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Splits the name into its phase and stage, if it follows the
    /// `pre_<stage>` / `post_<stage>` convention.
    #[must_use]
    pub fn parts(&self) -> Option<(HookPhase, &str)> {
        if let Some(stage) = self.0.strip_prefix("pre_") {
            Some((HookPhase::Pre, stage))
        } else {
            self.0.strip_prefix("post_").map(|stage| (HookPhase::Post, stage))
        }
    }
}

impl fmt::Display for HookPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for HookPoint {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for HookPoint {
    fn from(name: String) -> Self {
        Self(name)
    }
}

impl PartialEq<str> for HookPoint {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}
