use std::{collections::BTreeMap, fmt::Display, num::NonZeroU32};

use chrono::{DateTime, Utc};
use clap::ValueEnum;
use serde::{Deserialize, Deserializer, Serialize};

use crate::utils::time::{DateKey, HourKey, MinuteKey};

/// Posts per hour of a single day.
pub type HourlyBuckets = BTreeMap<HourKey, u64>;

/// A finished day. Records are created at rollover and never touched again.
#[derive(PartialEq, Eq, Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct DailyRecord {
    pub date: DateKey,
    // Older stores used `tweets` and `pixels`.
    #[serde(default, alias = "tweets")]
    pub posts_viewed: u64,
    #[serde(default, alias = "pixels", deserialize_with = "whole_pixels")]
    pub pixels_scrolled: u64,
    #[serde(default)]
    pub hourly: HourlyBuckets,
}

/// Scroll positions can be fractional on scaled displays and older stores summed them as is.
/// Partial pixels are dropped.
pub(crate) fn whole_pixels<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = f64::deserialize(deserializer)?;
    Ok(value as u64)
}

/// Chronological list of finished days, never longer than [HistoryLog::CAPACITY].
#[derive(PartialEq, Eq, Debug, Serialize, Deserialize, Clone, Default)]
#[serde(transparent)]
pub struct HistoryLog(Vec<DailyRecord>);

impl HistoryLog {
    pub const CAPACITY: usize = 90;

    pub fn new(records: Vec<DailyRecord>) -> Self {
        let mut log = Self(records);
        log.truncate();
        log
    }

    /// Appends a record and drops the oldest ones past capacity.
    pub fn push(&mut self, record: DailyRecord) {
        self.0.push(record);
        self.truncate();
    }

    fn truncate(&mut self) {
        if self.0.len() > Self::CAPACITY {
            let excess = self.0.len() - Self::CAPACITY;
            self.0.drain(..excess);
        }
    }

    pub fn contains_date(&self, date: &DateKey) -> bool {
        self.0.iter().any(|v| &v.date == date)
    }

    pub fn records(&self) -> &[DailyRecord] {
        &self.0
    }

    /// The last `count` records, oldest first.
    pub fn recent(&self, count: usize) -> &[DailyRecord] {
        &self.0[self.0.len().saturating_sub(count)..]
    }

    pub fn last(&self) -> Option<&DailyRecord> {
        self.0.last()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Hourly buckets per day. Only today and days still present in the history are kept.
#[derive(PartialEq, Eq, Debug, Serialize, Deserialize, Clone, Default)]
#[serde(transparent)]
pub struct HourlyIndex(BTreeMap<DateKey, HourlyBuckets>);

impl HourlyIndex {
    pub fn increment(&mut self, date: &DateKey, hour: HourKey) {
        *self
            .0
            .entry(date.clone())
            .or_default()
            .entry(hour)
            .or_default() += 1;
    }

    pub fn day(&self, date: &DateKey) -> Option<&HourlyBuckets> {
        self.0.get(date)
    }

    pub fn total_for(&self, date: &DateKey) -> u64 {
        self.day(date).map(|v| v.values().sum()).unwrap_or(0)
    }

    pub fn clear_day(&mut self, date: &DateKey) {
        self.0.remove(date);
    }

    /// Drops every day that isn't part of `history`.
    pub fn retain_history(&mut self, history: &HistoryLog) {
        self.0.retain(|date, _| history.contains_date(date));
    }

    pub fn dates(&self) -> impl Iterator<Item = &DateKey> {
        self.0.keys()
    }
}

/// Posts per minute for the recent past.
#[derive(PartialEq, Eq, Debug, Serialize, Deserialize, Clone, Default)]
#[serde(transparent)]
pub struct MinuteIndex(BTreeMap<MinuteKey, u64>);

impl MinuteIndex {
    pub fn increment(&mut self, minute: MinuteKey) {
        *self.0.entry(minute).or_default() += 1;
    }

    pub fn get(&self, minute: &MinuteKey) -> u64 {
        self.0.get(minute).copied().unwrap_or(0)
    }

    /// Removes every bucket ordered before `oldest_kept`. Returns amount of removed buckets.
    pub fn evict_before(&mut self, oldest_kept: &MinuteKey) -> usize {
        let kept = self.0.split_off(oldest_kept);
        let evicted = self.0.len();
        self.0 = kept;
        evicted
    }

    pub fn contains(&self, minute: &MinuteKey) -> bool {
        self.0.contains_key(minute)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Working set of the current day.
#[derive(PartialEq, Eq, Debug, Clone, Default)]
pub struct LiveCounters {
    pub viewed_posts_today: u64,
    pub pixels_scrolled_today: u64,
    pub today_date: Option<DateKey>,
    pub last_reset_time: Option<DateTime<Utc>>,
}

impl LiveCounters {
    pub fn had_activity(&self) -> bool {
        self.viewed_posts_today > 0 || self.pixels_scrolled_today > 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Counters shift from green to red while approaching the threshold.
    #[default]
    Nudge,
    /// Counters only show the post number.
    Count,
}

impl Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Mode::Nudge => write!(f, "nudge"),
            Mode::Count => write!(f, "count"),
        }
    }
}

pub const DEFAULT_THRESHOLD: NonZeroU32 = match NonZeroU32::new(100) {
    Some(v) => v,
    None => unreachable!(),
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Settings {
    pub threshold: NonZeroU32,
    pub mode: Mode,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            mode: Mode::default(),
        }
    }
}

/// Everything that is persisted about a user's usage. The storage boundary converts it from and
/// to store entries, see [super::snapshot].
#[derive(PartialEq, Eq, Debug, Clone, Default)]
pub struct UsageState {
    pub counters: LiveCounters,
    pub settings: Settings,
    pub history: HistoryLog,
    pub hourly: HourlyIndex,
    pub minutes: MinuteIndex,
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, NaiveDate};

    use super::*;

    fn record(date: NaiveDate, posts: u64) -> DailyRecord {
        DailyRecord {
            date: date.into(),
            posts_viewed: posts,
            pixels_scrolled: 0,
            hourly: HourlyBuckets::new(),
        }
    }

    #[test]
    fn test_history_push_keeps_most_recent() {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let mut history = HistoryLog::default();
        for i in 0..HistoryLog::CAPACITY as i64 {
            history.push(record(start + Duration::days(i), i as u64));
        }
        assert_eq!(history.len(), 90);

        history.push(record(start + Duration::days(90), 90));

        assert_eq!(history.len(), 90);
        assert_eq!(
            history.records()[0].date,
            DateKey::from(start + Duration::days(1))
        );
        assert_eq!(history.last().unwrap().posts_viewed, 90);
    }

    #[test]
    fn test_history_recent() {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let history = HistoryLog::new((0..5).map(|i| record(start + Duration::days(i), 1)).collect());
        assert_eq!(history.recent(3).len(), 3);
        assert_eq!(history.recent(3)[0].date, DateKey::from(start + Duration::days(2)));
        assert_eq!(history.recent(30).len(), 5);
    }

    #[test]
    fn test_minute_eviction() {
        let mut minutes = MinuteIndex::default();
        for minute in ["2024-01-01T10:00", "2024-01-01T10:01", "2024-01-01T12:00"] {
            minutes.increment(serde_json::from_value(minute.into()).unwrap());
        }
        let cutoff: MinuteKey = serde_json::from_value("2024-01-01T10:01".into()).unwrap();

        assert_eq!(minutes.evict_before(&cutoff), 1);
        assert_eq!(minutes.len(), 2);
        assert!(minutes.contains(&cutoff));
    }

    #[test]
    fn test_daily_record_reads_legacy_names() {
        let record: DailyRecord = serde_json::from_value(serde_json::json!({
            "date": "2024-01-01",
            "tweets": 42,
            "pixels": 5000,
            "hourly": { "09": 40, "10": 2 }
        }))
        .unwrap();
        assert_eq!(record.posts_viewed, 42);
        assert_eq!(record.pixels_scrolled, 5000);
        assert_eq!(record.hourly.values().sum::<u64>(), 42);
    }
}
