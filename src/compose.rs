use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

static CLOCK_TIME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\d{1,2}):(\d{2})(?::(\d{2}))?$").expect("regex compiles")
});

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TimeError {
    #[error("{0} is not a valid calendar date")]
    InvalidDate(String),
    #[error("'{0}' is not a valid clock time (expected HH:MM or HH:MM:SS)")]
    InvalidClock(String),
    #[error("{0} time is required unless the event is full-day")]
    MissingTime(&'static str),
    #[error("end time {end} is before start time {start}")]
    EndBeforeStart { start: String, end: String },
    #[error("{0} does not exist in {1}")]
    NonexistentLocalTime(NaiveDateTime, Tz),
}

pub fn full_day_start() -> NaiveTime {
    NaiveTime::from_hms_opt(0, 0, 0).expect("midnight is a valid time")
}

pub fn full_day_end() -> NaiveTime {
    NaiveTime::from_hms_opt(23, 59, 59).expect("23:59:59 is a valid time")
}

/// A calendar day as the user picked it, before any validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct LocalDate {
    pub year: i32,
    pub month: u32,
    pub day: u32,
}

impl LocalDate {
    pub fn new(year: i32, month: u32, day: u32) -> Self {
        Self { year, month, day }
    }

    pub fn to_naive(self) -> Result<NaiveDate, TimeError> {
        NaiveDate::from_ymd_opt(self.year, self.month, self.day)
            .ok_or_else(|| TimeError::InvalidDate(self.to_string()))
    }
}

impl From<NaiveDate> for LocalDate {
    fn from(date: NaiveDate) -> Self {
        use chrono::Datelike;
        Self::new(date.year(), date.month(), date.day())
    }
}

impl fmt::Display for LocalDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}-{:02}", self.year, self.month, self.day)
    }
}

impl FromStr for LocalDate {
    type Err = TimeError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let invalid = || TimeError::InvalidDate(value.to_string());
        let mut parts = value.trim().splitn(3, '-');
        let year = parts.next().and_then(|p| p.parse().ok()).ok_or_else(invalid)?;
        let month = parts.next().and_then(|p| p.parse().ok()).ok_or_else(invalid)?;
        let day = parts.next().and_then(|p| p.parse().ok()).ok_or_else(invalid)?;
        Ok(Self::new(year, month, day))
    }
}

impl TryFrom<String> for LocalDate {
    type Error = TimeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<LocalDate> for String {
    fn from(value: LocalDate) -> Self {
        value.to_string()
    }
}

/// Parses `H:MM`, `HH:MM` or `HH:MM:SS`; a missing seconds part means `:00`.
pub fn parse_clock_time(value: &str) -> Result<NaiveTime, TimeError> {
    let trimmed = value.trim();
    let invalid = || TimeError::InvalidClock(trimmed.to_string());
    let caps = CLOCK_TIME.captures(trimmed).ok_or_else(invalid)?;
    let hour = caps[1].parse::<u32>().map_err(|_| invalid())?;
    let minute = caps[2].parse::<u32>().map_err(|_| invalid())?;
    let second = match caps.get(3) {
        Some(s) => s.as_str().parse::<u32>().map_err(|_| invalid())?,
        None => 0,
    };
    NaiveTime::from_hms_opt(hour, minute, second).ok_or_else(invalid)
}

pub fn format_clock_time(time: NaiveTime) -> String {
    time.format("%H:%M:%S").to_string()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComposedTime {
    /// The start of the event as a UTC instant. Read back in the event's
    /// timezone it always lands on the day the user picked.
    pub event_date: DateTime<Utc>,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub is_full_day: bool,
}

impl ComposedTime {
    pub fn start_time_string(&self) -> String {
        format_clock_time(self.start_time)
    }

    pub fn end_time_string(&self) -> String {
        format_clock_time(self.end_time)
    }
}

/// Builds the stored instant and wall-clock pair for events in one fixed
/// timezone. Nothing here consults the machine's local timezone.
#[derive(Debug, Clone, Copy)]
pub struct TimeCompositor {
    tz: Tz,
}

impl TimeCompositor {
    pub fn new(tz: Tz) -> Self {
        Self { tz }
    }

    pub fn timezone(&self) -> Tz {
        self.tz
    }

    pub fn compose(
        &self,
        date: LocalDate,
        start_time: Option<&str>,
        end_time: Option<&str>,
        is_full_day: bool,
    ) -> Result<ComposedTime, TimeError> {
        if is_full_day {
            return self.compose_times(date, None, None, true);
        }
        let start = start_time
            .filter(|s| !s.trim().is_empty())
            .map(parse_clock_time)
            .transpose()?;
        let end = end_time
            .filter(|s| !s.trim().is_empty())
            .map(parse_clock_time)
            .transpose()?;
        self.compose_times(date, start, end, false)
    }

    pub fn compose_times(
        &self,
        date: LocalDate,
        start_time: Option<NaiveTime>,
        end_time: Option<NaiveTime>,
        is_full_day: bool,
    ) -> Result<ComposedTime, TimeError> {
        let day = date.to_naive()?;
        let (start, end) = if is_full_day {
            (full_day_start(), full_day_end())
        } else {
            let start = start_time.ok_or(TimeError::MissingTime("start"))?;
            let end = end_time.ok_or(TimeError::MissingTime("end"))?;
            if end < start {
                return Err(TimeError::EndBeforeStart {
                    start: format_clock_time(start),
                    end: format_clock_time(end),
                });
            }
            (start, end)
        };

        Ok(ComposedTime {
            event_date: self.to_utc(day.and_time(start))?,
            start_time: start,
            end_time: end,
            is_full_day,
        })
    }

    /// Interprets a wall-clock reading in this compositor's timezone.
    pub fn to_utc(&self, local: NaiveDateTime) -> Result<DateTime<Utc>, TimeError> {
        self.tz
            .from_local_datetime(&local)
            .earliest()
            .map(|dt| dt.with_timezone(&Utc))
            .ok_or(TimeError::NonexistentLocalTime(local, self.tz))
    }

    /// The calendar day an instant falls on in this compositor's timezone.
    pub fn local_date(&self, instant: DateTime<Utc>) -> NaiveDate {
        instant.with_timezone(&self.tz).date_naive()
    }
}
