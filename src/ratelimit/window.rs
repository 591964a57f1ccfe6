//! Rate window specifications.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{OrbitTrackError, Result};

/// Time unit of a rate window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimeUnit {
    Second,
    Minute,
    Hour,
    Day,
}

impl TimeUnit {
    /// Get the duration of one unit.
    pub fn duration(&self) -> Duration {
        match self {
            TimeUnit::Second => Duration::from_secs(1),
            TimeUnit::Minute => Duration::from_secs(60),
            TimeUnit::Hour => Duration::from_secs(3600),
            TimeUnit::Day => Duration::from_secs(86400),
        }
    }

    fn name(&self) -> &'static str {
        match self {
            TimeUnit::Second => "second",
            TimeUnit::Minute => "minute",
            TimeUnit::Hour => "hour",
            TimeUnit::Day => "day",
        }
    }

    fn parse(unit: &str) -> Option<Self> {
        match unit.to_ascii_lowercase().as_str() {
            "s" | "sec" | "second" | "seconds" => Some(TimeUnit::Second),
            "m" | "min" | "minute" | "minutes" => Some(TimeUnit::Minute),
            "h" | "hour" | "hours" => Some(TimeUnit::Hour),
            "d" | "day" | "days" => Some(TimeUnit::Day),
            _ => None,
        }
    }
}

/// A cap of `limit` requests per `multiple` units of time, e.g. `30/minute`
/// or `5/10 seconds`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RateWindowSpec {
    limit: u64,
    multiple: u64,
    unit: TimeUnit,
}

impl RateWindowSpec {
    pub fn new(limit: u64, unit: TimeUnit) -> Self {
        Self::with_multiple(limit, 1, unit)
    }

    pub fn with_multiple(limit: u64, multiple: u64, unit: TimeUnit) -> Self {
        Self {
            limit: limit.max(1),
            multiple: multiple.max(1),
            unit,
        }
    }

    pub fn per_second(limit: u64) -> Self {
        Self::new(limit, TimeUnit::Second)
    }

    pub fn per_minute(limit: u64) -> Self {
        Self::new(limit, TimeUnit::Minute)
    }

    pub fn per_hour(limit: u64) -> Self {
        Self::new(limit, TimeUnit::Hour)
    }

    /// Maximum number of requests within one window (inclusive).
    pub fn limit(&self) -> u64 {
        self.limit
    }

    pub fn unit(&self) -> TimeUnit {
        self.unit
    }

    /// Length of the window.
    pub fn window(&self) -> Duration {
        self.unit.duration() * self.multiple as u32
    }

    /// Average permitted requests per second, used to compare specs with
    /// different window lengths.
    pub fn rate_per_second(&self) -> f64 {
        self.limit as f64 / self.window().as_secs_f64()
    }
}

impl fmt::Display for RateWindowSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.multiple == 1 {
            write!(f, "{}/{}", self.limit, self.unit.name())
        } else {
            write!(f, "{}/{} {}s", self.limit, self.multiple, self.unit.name())
        }
    }
}

impl FromStr for RateWindowSpec {
    type Err = OrbitTrackError;

    /// Parse `"<N>/<unit>"` or `"<N>/<M> <unit>"`.
    fn from_str(s: &str) -> Result<Self> {
        let invalid = || OrbitTrackError::InvalidRateWindow(s.to_string());

        let (limit, period) = s.trim().split_once('/').ok_or_else(invalid)?;
        let limit: u64 = limit.trim().parse().map_err(|_| invalid())?;

        let mut parts = period.split_whitespace();
        let (multiple, unit) = match (parts.next(), parts.next(), parts.next()) {
            (Some(unit), None, None) => (1, unit),
            (Some(multiple), Some(unit), None) => {
                (multiple.parse::<u64>().map_err(|_| invalid())?, unit)
            }
            _ => return Err(invalid()),
        };
        let unit = TimeUnit::parse(unit).ok_or_else(invalid)?;

        if limit == 0 || multiple == 0 {
            return Err(invalid());
        }

        Ok(Self::with_multiple(limit, multiple, unit))
    }
}

impl Serialize for RateWindowSpec {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for RateWindowSpec {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
