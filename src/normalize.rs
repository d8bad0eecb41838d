//! Conversion of Trello's UTC timestamps into wall clock date and time of the target timezone.

use crate::{Error, Result};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime, TimeDelta, Timelike};
use chrono_tz::Tz;

/// Timestamp with fractional seconds, e.g. `2025-06-01T10:00:00.500Z`.
const FORMAT_FRACTIONAL: &str = "%Y-%m-%dT%H:%M:%S%.fZ";
/// Timestamp without fractional seconds, e.g. `2025-06-01T10:00:00Z`.
const FORMAT_SECONDS: &str = "%Y-%m-%dT%H:%M:%SZ";

/// Local date and time of a normalized timestamp. Both parts are absent if the input was empty
/// or could not be parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Normalized {
    pub date: Option<NaiveDate>,
    pub time: Option<NaiveTime>,
}

impl Normalized {
    /// The (absent, absent) result.
    pub const ABSENT: Normalized = Normalized {
        date: None,
        time: None,
    };
}

/// Why a non-empty timestamp could not be normalized.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TimestampError {
    #[error("failed to parse timestamp {input:?}: {source}")]
    Parse {
        input: String,
        source: chrono::ParseError,
    },
    #[error("timestamp {0:?} is out of range")]
    OutOfRange(String),
}

/// Converts `input` to the wall clock of a zone that is `offset` ahead of UTC.
///
/// An absent or empty input is not an error and silently yields [`Normalized::ABSENT`]. Input
/// that matches neither accepted format yields [`Normalized::ABSENT`] too, but is logged.
pub fn normalize(input: Option<&str>, offset: TimeDelta) -> Normalized {
    let input = match input {
        Some(input) if !input.is_empty() => input,
        _ => return Normalized::ABSENT,
    };

    try_normalize(input, offset).unwrap_or_else(|err| {
        log::warn!("{err}");
        Normalized::ABSENT
    })
}

/// Like [`normalize`], but returns the reason instead of logging it.
pub fn try_normalize(input: &str, offset: TimeDelta) -> Result<Normalized, TimestampError> {
    let format = if input.contains('.') {
        FORMAT_FRACTIONAL
    } else {
        FORMAT_SECONDS
    };

    let utc = NaiveDateTime::parse_from_str(input, format).map_err(|source| {
        TimestampError::Parse {
            input: input.to_owned(),
            source,
        }
    })?;

    let local = utc
        .checked_add_signed(offset)
        .ok_or_else(|| TimestampError::OutOfRange(input.to_owned()))?;

    Ok(Normalized {
        date: Some(local.date()),
        // Sub-second precision is dropped.
        time: local.time().with_nanosecond(0),
    })
}

/// The timezone events are written in: an IANA label for the calendar and the fixed offset used
/// to compute wall clock times. No DST rules are applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetZone {
    label: Tz,
    offset_hours: i32,
}

impl TargetZone {
    /// Creates a `TargetZone` from an IANA timezone name and an offset in whole hours.
    pub fn new(label: &str, offset_hours: i32) -> Result<TargetZone> {
        let label = label
            .parse::<Tz>()
            .map_err(|err| Error::InvalidConfig(format!("unknown timezone {label:?}: {err}")))?;

        if !(-12..=14).contains(&offset_hours) {
            return Err(Error::InvalidConfig(format!(
                "UTC offset of {offset_hours} hours is out of range"
            )));
        }

        Ok(TargetZone {
            label,
            offset_hours,
        })
    }

    /// The IANA name attached to event times, e.g. `Asia/Tokyo`.
    pub fn label(&self) -> &'static str {
        self.label.name()
    }

    pub fn offset(&self) -> TimeDelta {
        TimeDelta::hours(i64::from(self.offset_hours))
    }

    /// Normalizes a timestamp into this zone.
    pub fn normalize(&self, input: Option<&str>) -> Normalized {
        normalize(input, self.offset())
    }
}

impl Default for TargetZone {
    /// Japan Standard Time.
    fn default() -> Self {
        TargetZone {
            label: chrono_tz::Asia::Tokyo,
            offset_hours: 9,
        }
    }
}
