//! Daily quiet hours.

use chrono::Timelike;
use serde::Serialize;

use opsdeck_core::parse_hhmm;

/// Quiet hours as minutes since local midnight. A window with a missing
/// or malformed bound, or with `start == end`, never silences.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SilenceWindow {
    pub start: Option<u32>,
    pub end: Option<u32>,
}

impl SilenceWindow {
    pub fn parse(start: &str, end: &str) -> Self {
        Self {
            start: parse_hhmm(start),
            end: parse_hhmm(end),
        }
    }

    /// Same-day windows are half-open `[start, end)`; windows crossing
    /// midnight cover `now >= start || now < end`.
    pub fn contains_minute(&self, minute: u32) -> bool {
        let (Some(start), Some(end)) = (self.start, self.end) else {
            return false;
        };
        if start == end {
            return false;
        }
        if start < end {
            start <= minute && minute < end
        } else {
            minute >= start || minute < end
        }
    }

    pub fn contains<T: Timelike>(&self, t: &T) -> bool {
        self.contains_minute(t.hour() * 60 + t.minute())
    }

    pub fn active_now(&self) -> bool {
        self.contains(&chrono::Local::now())
    }
}
