//! Stage timing log entries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// One entry of a run's timing log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageTiming {
    /// The stage that ran.
    pub stage: String,
    /// Wall-clock duration of the stage body.
    pub duration: Duration,
    /// When the stage body started.
    pub started_at: DateTime<Utc>,
}

impl StageTiming {
    /// Creates a new timing entry.
    #[must_use]
    pub fn new(stage: impl Into<String>, duration: Duration, started_at: DateTime<Utc>) -> Self {
        Self {
            stage: stage.into(),
            duration,
            started_at,
        }
    }

    /// Duration in seconds, rounded to four decimal places.
    #[must_use]
    pub fn seconds(&self) -> f64 {
        (self.duration.as_secs_f64() * 10_000.0).round() / 10_000.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seconds_rounding() {
        let timing = StageTiming::new("finalize", Duration::from_micros(123_456), Utc::now());
        assert!((timing.seconds() - 0.1235).abs() < f64::EPSILON);
    }
}
