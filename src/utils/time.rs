//! Bucket keys. All keys are built from local wall-clock time, zero-padded, so that ordering the
//! strings orders the buckets.

use std::fmt::Display;

use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Timelike, Weekday};
use now::DateTimeNow;
use serde::{Deserialize, Serialize};

const DATE_FORMAT: &str = "%Y-%m-%d";
const MINUTE_FORMAT: &str = "%Y-%m-%dT%H:%M";

/// Minute buckets older than this are dropped on the next write.
pub const MINUTE_RETENTION: Duration = Duration::hours(2);

/// Calendar day, `YYYY-MM-DD`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DateKey(String);

/// Hour of the day, `HH`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HourKey(String);

/// Minute of a specific day, `YYYY-MM-DDTHH:MM`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MinuteKey(String);

pub fn date_key_of<Tz: TimeZone>(ts: &DateTime<Tz>) -> DateKey {
    DateKey::from(ts.date_naive())
}

pub fn hour_key_of<Tz: TimeZone>(ts: &DateTime<Tz>) -> HourKey {
    HourKey::from_hour(ts.hour())
}

pub fn minute_key_of<Tz: TimeZone>(ts: &DateTime<Tz>) -> MinuteKey {
    MinuteKey(ts.naive_local().format(MINUTE_FORMAT).to_string())
}

/// Returns the smallest minute key that is still inside the retention window. Every key ordered
/// before it belongs to a minute that started more than [MINUTE_RETENTION] before `now`.
pub fn minute_retention_start<Tz: TimeZone>(now: &DateTime<Tz>) -> MinuteKey {
    let cutoff = now.clone() - MINUTE_RETENTION;
    let floor = cutoff.beginning_of_minute();
    if floor == cutoff {
        minute_key_of(&floor)
    } else {
        minute_key_of(&(floor + Duration::minutes(1)))
    }
}

impl DateKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn date(&self) -> Option<NaiveDate> {
        NaiveDate::parse_from_str(&self.0, DATE_FORMAT).ok()
    }

    pub fn is_weekend(&self) -> bool {
        self.date()
            .is_some_and(|v| matches!(v.weekday(), Weekday::Sat | Weekday::Sun))
    }
}

impl From<NaiveDate> for DateKey {
    fn from(value: NaiveDate) -> Self {
        Self(value.format(DATE_FORMAT).to_string())
    }
}

impl HourKey {
    pub fn from_hour(hour: u32) -> Self {
        Self(format!("{hour:02}"))
    }

    pub fn hour(&self) -> Option<u32> {
        self.0.parse().ok().filter(|v| *v < 24)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl MinuteKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for DateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl Display for HourKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl Display for MinuteKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
