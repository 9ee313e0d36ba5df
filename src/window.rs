//! Trailing time windows for the trend chart and report

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::GlucoError;
use crate::model::GlucoseLog;

/// Trailing window size
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChartRange {
    #[default]
    Day,
    Week,
    /// Fixed 30 days, not calendar aware
    Month,
}

impl ChartRange {
    pub fn duration(self) -> Duration {
        match self {
            ChartRange::Day => Duration::hours(24),
            ChartRange::Week => Duration::hours(7 * 24),
            ChartRange::Month => Duration::hours(30 * 24),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ChartRange::Day => "day",
            ChartRange::Week => "week",
            ChartRange::Month => "month",
        }
    }
}

impl fmt::Display for ChartRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChartRange {
    type Err = GlucoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "day" => Ok(ChartRange::Day),
            "week" => Ok(ChartRange::Week),
            "month" => Ok(ChartRange::Month),
            other => Err(GlucoError::InvalidInput(format!(
                "unknown range '{}', expected day, week or month",
                other
            ))),
        }
    }
}

/// Whether a timestamp falls inside the trailing window ending at `now`.
/// Timestamps after `now` are kept.
pub fn in_window(timestamp: DateTime<Utc>, range: ChartRange, now: DateTime<Utc>) -> bool {
    now - timestamp <= range.duration()
}

/// Logs inside the trailing window, in their original order
pub fn filter_window(logs: &[GlucoseLog], range: ChartRange, now: DateTime<Utc>) -> Vec<GlucoseLog> {
    logs.iter()
        .filter(|log| in_window(log.timestamp, range, now))
        .cloned()
        .collect()
}
