//! Fixed-width timestamp handling and UTC/local conversion.
//!
//! Evohome mixes UTC (`...Z`) and local wall-clock times in its replies, and the schedule resolver
//! produces times it only *assumes* to be local (`...A`). All of them share the 19-character
//! `YYYY-MM-DDTHH:MM:SS` body.
//!
//! The UTC offset is captured once into a [`TimeContext`] when the process starts and reused for
//! every conversion; daylight-saving transitions during a run are not tracked.

use chrono::{DateTime, Local, NaiveDateTime, TimeDelta, TimeZone};
use core::fmt;
use std::error::Error;
use std::str::FromStr;

pub const TIMESTAMP_LEN: usize = 19;
const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimestampError {
    /// Fewer than 19 characters.
    TooShort(String),
    /// Wrong separators, non-numeric fields or an unknown zone marker.
    Malformed(String),
    /// Well-formed but not a real calendar date/time, or shifted out of range.
    OutOfRange(String),
}

impl fmt::Display for TimestampError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimestampError::TooShort(s) => write!(f, "timestamp '{}' is shorter than {} characters", s, TIMESTAMP_LEN),
            TimestampError::Malformed(s) => write!(f, "timestamp '{}' is not in YYYY-MM-DDTHH:MM:SS form", s),
            TimestampError::OutOfRange(s) => write!(f, "timestamp '{}' is not a valid date/time", s),
        }
    }
}

impl Error for TimestampError {}

/// Zone marker trailing the 19-character body.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum TimeMarker {
    /// `Z`: authoritative UTC, as returned by the portal.
    Utc,
    /// `A`: believed local, derived from the cached schedule.
    AssumedLocal,
}

impl TimeMarker {
    fn suffix(self) -> char {
        match self {
            TimeMarker::Utc => 'Z',
            TimeMarker::AssumedLocal => 'A',
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct Timestamp {
    pub at: NaiveDateTime,
    pub marker: Option<TimeMarker>,
}

impl Timestamp {
    pub fn new(at: NaiveDateTime, marker: Option<TimeMarker>) -> Self {
        Timestamp { at, marker }
    }

    /// The bare 19-character form, marker dropped.
    pub fn unmarked(&self) -> String {
        self.at.format(TIMESTAMP_FORMAT).to_string()
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.at.format(TIMESTAMP_FORMAT))?;
        if let Some(marker) = self.marker {
            write!(f, "{}", marker.suffix())?;
        }
        Ok(())
    }
}

impl FromStr for Timestamp {
    type Err = TimestampError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() < TIMESTAMP_LEN {
            return Err(TimestampError::TooShort(s.to_string()));
        }
        let (body, rest) = match (s.get(..TIMESTAMP_LEN), s.get(TIMESTAMP_LEN..)) {
            (Some(body), Some(rest)) => (body, rest),
            _ => return Err(TimestampError::Malformed(s.to_string())),
        };
        if !has_timestamp_shape(body) {
            return Err(TimestampError::Malformed(s.to_string()));
        }
        let marker = match rest {
            "" => None,
            "Z" => Some(TimeMarker::Utc),
            "A" => Some(TimeMarker::AssumedLocal),
            _ => return Err(TimestampError::Malformed(s.to_string())),
        };
        let at = NaiveDateTime::parse_from_str(body, TIMESTAMP_FORMAT)
            .map_err(|_| TimestampError::OutOfRange(s.to_string()))?;
        Ok(Timestamp { at, marker })
    }
}

// chrono accepts variable-width fields; the wire format does not.
fn has_timestamp_shape(body: &str) -> bool {
    body.bytes().enumerate().all(|(i, b)| match i {
        4 | 7 => b == b'-',
        10 => b == b'T',
        13 | 16 => b == b':',
        _ => b.is_ascii_digit(),
    })
}

/// Process-lifetime UTC offset, computed once from the startup instant.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct TimeContext {
    /// Local wall clock minus UTC wall clock.
    offset: TimeDelta,
}

impl TimeContext {
    pub fn capture<Tz: TimeZone>(now: &DateTime<Tz>) -> Self {
        let utc_wall = now.naive_utc();
        let local_wall = now.with_timezone(&Local).naive_local();
        TimeContext {
            offset: local_wall - utc_wall,
        }
    }

    pub fn from_offset_seconds(seconds: i32) -> Self {
        TimeContext {
            offset: TimeDelta::seconds(i64::from(seconds)),
        }
    }

    pub fn offset_seconds(&self) -> i64 {
        self.offset.num_seconds()
    }

    /// Convert a portal UTC timestamp to the bare local form.
    ///
    /// Input carrying the assumed-local marker is already local and is only stripped.
    pub fn utc_to_local(&self, utc: &str) -> Result<String, TimestampError> {
        let ts: Timestamp = utc.parse()?;
        if ts.marker == Some(TimeMarker::AssumedLocal) {
            return Ok(ts.unmarked());
        }
        let local = ts
            .at
            .checked_add_signed(self.offset)
            .ok_or_else(|| TimestampError::OutOfRange(utc.to_string()))?;
        Ok(Timestamp::new(local, None).to_string())
    }

    /// Convert a local timestamp to the `Z`-marked UTC form. UTC input passes through.
    pub fn local_to_utc(&self, local: &str) -> Result<String, TimestampError> {
        let ts: Timestamp = local.parse()?;
        if ts.marker == Some(TimeMarker::Utc) {
            return Ok(ts.to_string());
        }
        let utc = ts
            .at
            .checked_sub_signed(self.offset)
            .ok_or_else(|| TimestampError::OutOfRange(local.to_string()))?;
        Ok(Timestamp::new(utc, Some(TimeMarker::Utc)).to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{FixedOffset, NaiveDate};

    #[test]
    fn parses_markers() {
        let ts: Timestamp = "2024-03-10T22:15:00Z".parse().unwrap();
        assert_eq!(ts.marker, Some(TimeMarker::Utc));
        let ts: Timestamp = "2024-03-10T22:15:00A".parse().unwrap();
        assert_eq!(ts.marker, Some(TimeMarker::AssumedLocal));
        assert_eq!(ts.unmarked(), "2024-03-10T22:15:00");
        let ts: Timestamp = "2024-03-10T22:15:00".parse().unwrap();
        assert_eq!(ts.marker, None);
    }

    #[test]
    fn rejects_malformed_input() {
        assert!(matches!("2024-13-99".parse::<Timestamp>(), Err(TimestampError::TooShort(_))));
        assert!(matches!(
            "2024-13-99T00:00:00Z".parse::<Timestamp>(),
            Err(TimestampError::OutOfRange(_))
        ));
        assert!(matches!(
            "2024/03/10 22:15:00".parse::<Timestamp>(),
            Err(TimestampError::Malformed(_))
        ));
        assert!(matches!(
            "2024-03-1xT22:15:00".parse::<Timestamp>(),
            Err(TimestampError::Malformed(_))
        ));
        assert!(matches!(
            "2024-03-10T22:15:00+01:00".parse::<Timestamp>(),
            Err(TimestampError::Malformed(_))
        ));

        let ctx = TimeContext::from_offset_seconds(3600);
        assert!(ctx.utc_to_local("2024-13-99").is_err());
        assert!(ctx.local_to_utc("garbage").is_err());
    }

    #[test]
    fn utc_to_local_carries_across_midnight_and_year() {
        let ctx = TimeContext::from_offset_seconds(3600);
        assert_eq!(ctx.utc_to_local("2023-12-31T23:30:00Z").unwrap(), "2024-01-01T00:30:00");

        let west = TimeContext::from_offset_seconds(-5 * 3600);
        assert_eq!(west.utc_to_local("2024-03-01T02:00:00Z").unwrap(), "2024-02-29T21:00:00");
        assert_eq!(west.utc_to_local("2023-03-01T02:00:00Z").unwrap(), "2023-02-28T21:00:00");
    }

    #[test]
    fn assumed_local_is_only_stripped() {
        let ctx = TimeContext::from_offset_seconds(7200);
        assert_eq!(ctx.utc_to_local("2024-06-01T06:30:00A").unwrap(), "2024-06-01T06:30:00");
    }

    #[test]
    fn local_to_utc_marks_result() {
        let ctx = TimeContext::from_offset_seconds(3600);
        assert_eq!(ctx.local_to_utc("2024-01-01T00:30:00").unwrap(), "2023-12-31T23:30:00Z");
        assert_eq!(ctx.local_to_utc("2024-01-01T00:30:00Z").unwrap(), "2024-01-01T00:30:00Z");
    }

    #[test]
    fn round_trip_with_fixed_offset() {
        for offset in [-9 * 3600 - 1800, -3600, 0, 3600, 5 * 3600 + 2700, 14 * 3600] {
            let ctx = TimeContext::from_offset_seconds(offset);
            for t in [
                "2024-02-29T23:59:59Z",
                "2024-01-01T00:00:00Z",
                "2023-12-31T12:00:00Z",
                "2025-10-26T01:30:00Z",
            ] {
                let local = ctx.utc_to_local(t).unwrap();
                assert_eq!(ctx.local_to_utc(&local).unwrap(), t, "offset {offset}");
            }
        }
    }

    #[test]
    fn capture_uses_zone_offset() {
        let tz = FixedOffset::east_opt(2 * 3600).unwrap();
        let now = NaiveDate::from_ymd_opt(2024, 7, 1)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
            .and_local_timezone(tz)
            .unwrap();
        let expected = now.with_timezone(&Local).offset().local_minus_utc();
        assert_eq!(TimeContext::capture(&now).offset_seconds(), i64::from(expected));
    }
}
