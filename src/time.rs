//! Timestamps as stored in a bag and as rendered to callers.
//!
//! Segments store a single signed 64-bit nanosecond count per message. The
//! structured `(sec, nsec)` form is what the rest of the crate passes
//! around; conversion happens only at the storage and output boundaries.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::BagError;

pub const NANOS_PER_SEC: i64 = 1_000_000_000;

/// An instant with nanosecond precision. Invariant: `nsec < 1_000_000_000`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "TimestampParts")]
pub struct Timestamp {
    pub sec: i64,
    pub nsec: u32,
}

impl Timestamp {
    pub const ZERO: Self = Self { sec: 0, nsec: 0 };

    /// Builds a timestamp, carrying any whole seconds out of `nsec`.
    #[must_use]
    pub fn new(sec: i64, nsec: u32) -> Self {
        let carry = i64::from(nsec) / NANOS_PER_SEC;
        Self {
            sec: sec.saturating_add(carry),
            nsec: (i64::from(nsec) % NANOS_PER_SEC) as u32,
        }
    }

    #[must_use]
    pub fn from_nanos(nanos: i64) -> Self {
        Self {
            sec: nanos.div_euclid(NANOS_PER_SEC),
            nsec: nanos.rem_euclid(NANOS_PER_SEC) as u32,
        }
    }

    /// Combined nanosecond count, saturating at the `i64` bounds.
    #[must_use]
    pub fn to_nanos(&self) -> i64 {
        let wide = i128::from(self.sec) * i128::from(NANOS_PER_SEC) + i128::from(self.nsec);
        wide.clamp(i128::from(i64::MIN), i128::from(i64::MAX)) as i64
    }

    #[must_use]
    pub fn to_datetime(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.sec, self.nsec)
    }
}

/// Deserialized form of [`Timestamp`], normalized on conversion.
#[derive(Deserialize)]
struct TimestampParts {
    sec: i64,
    nsec: u32,
}

impl From<TimestampParts> for Timestamp {
    fn from(parts: TimestampParts) -> Self {
        Self::new(parts.sec, parts.nsec)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:09}", self.sec, self.nsec)
    }
}

impl FromStr for Timestamp {
    type Err = BagError;

    /// Parses decimal seconds: `1585866235`, `1585866235.112411371`, `0.5`.
    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let invalid = |reason| BagError::InvalidTimestamp {
            input: input.to_string(),
            reason,
        };
        let trimmed = input.trim();
        let (whole, frac) = match trimmed.split_once('.') {
            Some((whole, frac)) => (whole, Some(frac)),
            None => (trimmed, None),
        };
        let sec: i64 = whole.parse().map_err(|_| invalid("seconds are not an integer"))?;
        let Some(frac) = frac else {
            return Ok(Self { sec, nsec: 0 });
        };
        if sec < 0 || whole.starts_with('-') {
            return Err(invalid("negative fractional timestamps are not supported"));
        }
        if frac.is_empty() || frac.len() > 9 || !frac.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid("fraction must be 1 to 9 digits"));
        }
        let scale = 10u32.pow(9 - frac.len() as u32);
        let nsec: u32 = frac.parse().map_err(|_| invalid("fraction is not numeric"))?;
        Ok(Self {
            sec,
            nsec: nsec * scale,
        })
    }
}

/// How timestamps are presented to callers. Never affects ordering.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeFormat {
    /// `{ "sec": .., "nanosec": .. }`, the ROS 2 field naming.
    #[default]
    #[serde(alias = "sec,nanosec")]
    SecNanosec,
    /// `{ "sec": .., "nsec": .. }`.
    #[serde(alias = "sec,nsec")]
    SecNsec,
    /// A single combined nanosecond count.
    #[serde(alias = "nanos", alias = "ns")]
    Nanoseconds,
}

impl TimeFormat {
    #[must_use]
    pub fn render(self, stamp: Timestamp) -> serde_json::Value {
        self.render_parts(stamp.sec, stamp.nsec)
    }

    /// Renders a `(sec, nsec)` pair as given. Only the combined form folds
    /// an out-of-range `nsec` into the count.
    #[must_use]
    pub fn render_parts(self, sec: i64, nsec: u32) -> serde_json::Value {
        match self {
            Self::SecNanosec => serde_json::json!({ "sec": sec, "nanosec": nsec }),
            Self::SecNsec => serde_json::json!({ "sec": sec, "nsec": nsec }),
            Self::Nanoseconds => serde_json::Value::from(Timestamp::new(sec, nsec).to_nanos()),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::SecNanosec => "sec_nanosec",
            Self::SecNsec => "sec_nsec",
            Self::Nanoseconds => "nanoseconds",
        }
    }
}

impl fmt::Display for TimeFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TimeFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sec_nanosec" | "sec,nanosec" => Ok(Self::SecNanosec),
            "sec_nsec" | "sec,nsec" => Ok(Self::SecNsec),
            "nanoseconds" | "nanos" | "ns" => Ok(Self::Nanoseconds),
            other => Err(format!(
                "unknown time format {other:?} (expected sec_nanosec, sec_nsec or nanoseconds)"
            )),
        }
    }
}
