use std::fmt;

use chrono::NaiveTime;

use crate::error::DispatchError;

/// Daily time-of-day window spanning `[start, end)`.
///
/// A window whose start is later than its end wraps past midnight.
/// Equal bounds describe an empty window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    /// Start time (inclusive).
    pub start: NaiveTime,
    /// End time (exclusive).
    pub end: NaiveTime,
}

impl TimeWindow {
    pub fn new(start: NaiveTime, end: NaiveTime) -> Self {
        Self { start, end }
    }

    /// Parses a window from two `HH:MM` bounds.
    pub fn parse(start: &str, end: &str) -> Result<Self, DispatchError> {
        Ok(Self::new(parse_hhmm(start)?, parse_hhmm(end)?))
    }

    /// Returns `true` when `time` falls within the window.
    pub fn contains(&self, time: NaiveTime) -> bool {
        if self.start <= self.end {
            time >= self.start && time < self.end
        } else {
            time >= self.start || time < self.end
        }
    }
}

impl fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start.format("%H:%M"), self.end.format("%H:%M"))
    }
}

fn parse_hhmm(s: &str) -> Result<NaiveTime, DispatchError> {
    NaiveTime::parse_from_str(s.trim(), "%H:%M")
        .map_err(|e| DispatchError::InvalidTimeConfig(format!("\"{s}\" is not HH:MM: {e}")))
}
