//! Change cursors.
//!
//! A [`Cursor`] is the highest change timestamp processed so far for a
//! stream. Cursors are persisted as strings; parsing accepts RFC 3339 as well
//! as the space-separated form older state files were written in.

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Error returned when a string is not a recognised cursor value.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid cursor value '{0}': expected an RFC 3339 timestamp or YYYY-MM-DD")]
pub struct CursorParseError(pub String);

/// Monotonic change-timestamp watermark.
///
/// Ordering follows the wrapped timestamp, so `max` and comparisons behave
/// like the underlying `updated_at` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Cursor(DateTime<Utc>);

impl Cursor {
    pub fn new(timestamp: DateTime<Utc>) -> Self {
        Self(timestamp)
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.0
    }

    /// Parse a cursor from its persisted string form.
    ///
    /// Accepted formats:
    /// - RFC 3339: `2021-06-16T20:14:09.221855+00:00`, `2010-01-01T00:00:00Z`
    /// - Space separated with offset: `2021-06-16 20:14:09.221855+00:00`
    /// - Space separated without offset (read as UTC): `2010-01-01 00:00:00`
    /// - Date only (midnight UTC): `2010-01-01`
    pub fn parse(s: &str) -> Result<Self, CursorParseError> {
        let s = s.trim();

        if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
            return Ok(Self(dt.with_timezone(&Utc)));
        }
        if let Ok(dt) = DateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f%:z") {
            return Ok(Self(dt.with_timezone(&Utc)));
        }
        for format in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
            if let Ok(naive) = NaiveDateTime::parse_from_str(s, format) {
                return Ok(Self(naive.and_utc()));
            }
        }
        if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
            if let Some(naive) = date.and_hms_opt(0, 0, 0) {
                return Ok(Self(naive.and_utc()));
            }
        }

        Err(CursorParseError(s.to_string()))
    }
}

impl From<DateTime<Utc>> for Cursor {
    fn from(timestamp: DateTime<Utc>) -> Self {
        Self(timestamp)
    }
}

impl FromStr for Cursor {
    type Err = CursorParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.to_rfc3339_opts(SecondsFormat::AutoSi, true))
    }
}

impl Serialize for Cursor {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Cursor {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}
