//! Calendar primitives: day-keys, wall-clock times, and zone-aware instants.
//!
//! Every "local" computation in the kernel goes through this module so that
//! day boundaries are always evaluated in the configured IANA zone, never in
//! the host's zone. Instants are always `DateTime<Utc>`; a [`DayKey`] is the
//! zone-local calendar date an instant falls on.

use std::fmt;
use std::str::FromStr;

use chrono::{
    DateTime, Datelike, Duration, LocalResult, NaiveDate, NaiveTime, TimeZone, Timelike, Utc,
    Weekday,
};
use chrono_tz::Tz;
use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Zone used when a configuration does not name one.
pub const DEFAULT_ZONE: Tz = chrono_tz::America::Chicago;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors from parsing or constructing calendar values.
#[derive(Debug, Error, Diagnostic)]
pub enum TimeError {
    #[error("invalid day-key: \"{input}\"")]
    #[diagnostic(
        code(jericho::time::invalid_day_key),
        help("Day-keys are calendar dates written as YYYY-MM-DD, e.g. 2026-03-14.")
    )]
    InvalidDayKey { input: String },

    #[error("invalid instant: \"{input}\"")]
    #[diagnostic(
        code(jericho::time::invalid_instant),
        help(
            "Instants must be full RFC 3339 timestamps with an offset, \
             e.g. 2026-03-14T09:30:00Z. Bare dates and clock times are rejected."
        )
    )]
    InvalidInstant { input: String },

    #[error("invalid clock time: \"{input}\" ({reason})")]
    #[diagnostic(
        code(jericho::time::invalid_clock),
        help("Clock times look like 9:30, 09:30:00 or 9:30pm.")
    )]
    InvalidClock { input: String, reason: &'static str },

    #[error("local time {day} {clock} does not exist in {zone}")]
    #[diagnostic(
        code(jericho::time::nonexistent_local),
        help("The wall-clock time falls in a daylight-saving gap. Pick a time outside the transition.")
    )]
    NonexistentLocal {
        day: DayKey,
        clock: String,
        zone: String,
    },

    #[error("local time {day} {clock} resolved to {resolved_day} {resolved_clock} in {zone}")]
    #[diagnostic(
        code(jericho::time::round_trip_mismatch),
        help("The constructed instant did not map back to the requested day and clock.")
    )]
    RoundTripMismatch {
        day: DayKey,
        clock: String,
        resolved_day: DayKey,
        resolved_clock: String,
        zone: String,
    },

    #[error("unknown time zone: \"{name}\"")]
    #[diagnostic(
        code(jericho::time::unknown_zone),
        help("Use an IANA zone name such as America/Chicago or Europe/Berlin.")
    )]
    UnknownZone { name: String },
}

/// Convenience alias.
pub type TimeResult<T> = std::result::Result<T, TimeError>;

// ---------------------------------------------------------------------------
// DayKey
// ---------------------------------------------------------------------------

/// A zone-local calendar date, rendered `YYYY-MM-DD`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DayKey(NaiveDate);

impl DayKey {
    pub fn new(date: NaiveDate) -> Self {
        Self(date)
    }

    /// Parse a `YYYY-MM-DD` string.
    pub fn parse(input: &str) -> TimeResult<Self> {
        NaiveDate::parse_from_str(input.trim(), "%Y-%m-%d")
            .map(Self)
            .map_err(|_| TimeError::InvalidDayKey {
                input: input.to_string(),
            })
    }

    /// The calendar date `instant` falls on in `zone`.
    pub fn from_instant(instant: DateTime<Utc>, zone: Tz) -> Self {
        Self(instant.with_timezone(&zone).date_naive())
    }

    pub fn date(self) -> NaiveDate {
        self.0
    }

    pub fn add_days(self, days: i64) -> Self {
        Self(self.0 + Duration::days(days))
    }

    /// Signed number of days from `self` to `other`.
    pub fn days_until(self, other: DayKey) -> i64 {
        (other.0 - self.0).num_days()
    }

    pub fn weekday(self) -> Weekday {
        self.0.weekday()
    }

    pub fn is_weekend(self) -> bool {
        matches!(self.weekday(), Weekday::Sat | Weekday::Sun)
    }

    /// ISO week bucket, e.g. `2026-W11`.
    pub fn iso_week_key(self) -> String {
        let week = self.0.iso_week();
        format!("{}-W{:02}", week.year(), week.week())
    }

    /// Inclusive iteration from `self` through `end`. Empty when `end < self`.
    pub fn through(self, end: DayKey) -> impl Iterator<Item = DayKey> {
        let span = self.days_until(end);
        (0..=span.max(-1)).map(move |offset| self.add_days(offset))
    }
}

impl fmt::Display for DayKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%d"))
    }
}

impl FromStr for DayKey {
    type Err = TimeError;

    fn from_str(s: &str) -> TimeResult<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for DayKey {
    type Error = TimeError;

    fn try_from(value: String) -> TimeResult<Self> {
        Self::parse(&value)
    }
}

impl From<DayKey> for String {
    fn from(value: DayKey) -> Self {
        value.to_string()
    }
}

// ---------------------------------------------------------------------------
// Clock times
// ---------------------------------------------------------------------------

/// A wall-clock time of day, second precision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ClockTime {
    pub hours: u32,
    pub minutes: u32,
    pub seconds: u32,
}

impl ClockTime {
    pub fn new(hours: u32, minutes: u32) -> Self {
        Self {
            hours: hours % 24,
            minutes: minutes.min(59),
            seconds: 0,
        }
    }

    /// Parse `H:MM`, `HH:MM:SS`, optionally followed by `am`/`pm`.
    pub fn parse(input: &str) -> TimeResult<Self> {
        let raw = input.trim();
        let fail = |reason| TimeError::InvalidClock {
            input: input.to_string(),
            reason,
        };
        if raw.is_empty() {
            return Err(fail("empty"));
        }

        let lower = raw.to_ascii_lowercase();
        let (body, meridiem) = if let Some(rest) = lower.strip_suffix("am") {
            (rest.trim_end(), Some(false))
        } else if let Some(rest) = lower.strip_suffix("pm") {
            (rest.trim_end(), Some(true))
        } else {
            (lower.as_str(), None)
        };

        let parts: Vec<&str> = body.split(':').collect();
        if !(2..=3).contains(&parts.len()) {
            return Err(fail("format"));
        }
        let digits = |s: &str, max_len: usize| -> Option<u32> {
            if s.is_empty() || s.len() > max_len || !s.bytes().all(|b| b.is_ascii_digit()) {
                return None;
            }
            s.parse().ok()
        };
        let hour_raw = digits(parts[0], 2).ok_or_else(|| fail("format"))?;
        if parts[1].len() != 2 {
            return Err(fail("format"));
        }
        let minutes = digits(parts[1], 2).ok_or_else(|| fail("format"))?;
        let seconds = match parts.get(2) {
            Some(s) if s.len() == 2 => digits(s, 2).ok_or_else(|| fail("format"))?,
            Some(_) => return Err(fail("format")),
            None => 0,
        };
        if minutes > 59 {
            return Err(fail("minutes_range"));
        }
        if seconds > 59 {
            return Err(fail("seconds_range"));
        }
        if meridiem.is_none() && hour_raw > 23 {
            return Err(fail("hours_range"));
        }

        let mut hours = hour_raw % 24;
        match meridiem {
            Some(true) if hours < 12 => hours += 12,
            Some(false) if hours == 12 => hours = 0,
            _ => {}
        }
        Ok(Self {
            hours,
            minutes,
            seconds,
        })
    }

    /// `HH:MM:SS`.
    pub fn canonical(&self) -> String {
        format!("{:02}:{:02}:{:02}", self.hours, self.minutes, self.seconds)
    }

    pub fn minutes_of_day(&self) -> u32 {
        self.hours * 60 + self.minutes
    }

    pub fn from_minutes_of_day(minutes: u32) -> Self {
        Self::new((minutes / 60) % 24, minutes % 60)
    }

    fn naive(&self) -> NaiveTime {
        NaiveTime::from_hms_opt(self.hours, self.minutes, self.seconds).unwrap_or(NaiveTime::MIN)
    }
}

impl fmt::Display for ClockTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical())
    }
}

// ---------------------------------------------------------------------------
// Instants
// ---------------------------------------------------------------------------

/// Parse an RFC 3339 instant. Anything less than a full timestamp is an error.
pub fn parse_instant(input: &str) -> TimeResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(input.trim())
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| TimeError::InvalidInstant {
            input: input.to_string(),
        })
}

/// Resolve an IANA zone name.
pub fn parse_zone(name: &str) -> TimeResult<Tz> {
    name.parse::<Tz>().map_err(|_| TimeError::UnknownZone {
        name: name.to_string(),
    })
}

/// The wall-clock time of `instant` in `zone`.
pub fn local_clock(instant: DateTime<Utc>, zone: Tz) -> ClockTime {
    let local = instant.with_timezone(&zone);
    ClockTime {
        hours: local.hour(),
        minutes: local.minute(),
        seconds: local.second(),
    }
}

/// Minutes since local midnight.
pub fn minutes_of_day(instant: DateTime<Utc>, zone: Tz) -> u32 {
    local_clock(instant, zone).minutes_of_day()
}

/// Build the instant for wall time `clock` on `day` in `zone`.
///
/// Ambiguous local times (DST fall-back) resolve to the earlier instant.
/// The result must map back to the same day-key and clock time.
pub fn build_local_start(day: DayKey, clock: ClockTime, zone: Tz) -> TimeResult<DateTime<Utc>> {
    let naive = day.date().and_time(clock.naive());
    let local = match zone.from_local_datetime(&naive) {
        LocalResult::Single(dt) => dt,
        LocalResult::Ambiguous(earliest, _) => earliest,
        LocalResult::None => {
            return Err(TimeError::NonexistentLocal {
                day,
                clock: clock.canonical(),
                zone: zone.name().to_string(),
            });
        }
    };
    let instant = local.with_timezone(&Utc);

    let resolved_day = DayKey::from_instant(instant, zone);
    let resolved_clock = local_clock(instant, zone);
    if resolved_day != day || resolved_clock != clock {
        return Err(TimeError::RoundTripMismatch {
            day,
            clock: clock.canonical(),
            resolved_day,
            resolved_clock: resolved_clock.canonical(),
            zone: zone.name().to_string(),
        });
    }
    Ok(instant)
}

/// Wall time `clock` on `day` read as UTC. Used when zone construction fails.
pub fn utc_start(day: DayKey, clock: ClockTime) -> DateTime<Utc> {
    Utc.from_utc_datetime(&day.date().and_time(clock.naive()))
}

/// Start of `day` in `zone`, falling back to UTC midnight for zones whose
/// midnight is skipped.
pub fn day_start(day: DayKey, zone: Tz) -> DateTime<Utc> {
    build_local_start(day, ClockTime::new(0, 0), zone)
        .unwrap_or_else(|_| utc_start(day, ClockTime::new(0, 0)))
}
