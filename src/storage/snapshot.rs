//! Conversion between [UsageState] and the flat key space of a [PersistentStore]. Every field is
//! decoded on its own so a single malformed value only resets that value.

use std::num::NonZeroU32;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::{json, Value};
use tracing::warn;

use super::{
    entities::{
        whole_pixels, DailyRecord, HistoryLog, HourlyIndex, LiveCounters, MinuteIndex, Mode,
        Settings, UsageState,
    },
    store::{PersistentStore, StoreEntries},
};
use crate::utils::time::DateKey;

/// Version of the layout written by this build. Stores written before versioning was introduced
/// have no version and are read the same way.
pub const SCHEMA_VERSION: u64 = 1;

pub mod keys {
    pub const VIEWED_POSTS: &str = "viewedPosts";
    pub const PIXELS_SCROLLED: &str = "pixelsScrolled";
    pub const THRESHOLD: &str = "threshold";
    pub const MODE: &str = "mode";
    pub const LAST_RESET_TIME: &str = "lastResetTime";
    pub const TODAY_DATE: &str = "todayDate";
    pub const HISTORY: &str = "history";
    pub const HOURLY_DATA: &str = "hourlyData";
    pub const MINUTE_DATA: &str = "minuteData";
    pub const SCHEMA_VERSION: &str = "schemaVersion";

    pub const ALL: [&str; 10] = [
        VIEWED_POSTS,
        PIXELS_SCROLLED,
        THRESHOLD,
        MODE,
        LAST_RESET_TIME,
        TODAY_DATE,
        HISTORY,
        HOURLY_DATA,
        MINUTE_DATA,
        SCHEMA_VERSION,
    ];

    pub const SETTINGS: [&str; 2] = [THRESHOLD, MODE];

    /// Everything the tracker owns. Settings belong to whoever configures the tracker.
    pub const USAGE: [&str; 8] = [
        VIEWED_POSTS,
        PIXELS_SCROLLED,
        LAST_RESET_TIME,
        TODAY_DATE,
        HISTORY,
        HOURLY_DATA,
        MINUTE_DATA,
        SCHEMA_VERSION,
    ];
}

impl UsageState {
    /// Reads the whole state. Errors are only returned if the store itself failed.
    pub async fn load(store: &impl PersistentStore) -> Result<Self> {
        let entries = store.get(&keys::ALL).await?;
        Ok(Self::from_entries(&entries))
    }

    pub fn from_entries(entries: &StoreEntries) -> Self {
        let version = field::<Option<u64>>(entries, keys::SCHEMA_VERSION);
        if version.is_some_and(|v| v > SCHEMA_VERSION) {
            warn!("Store was written by a newer version ({version:?}), reading what is known");
        }

        let threshold = field::<Option<NonZeroU32>>(entries, keys::THRESHOLD);
        let settings = Settings {
            threshold: threshold.unwrap_or(Settings::default().threshold),
            mode: field::<Mode>(entries, keys::MODE),
        };

        Self {
            counters: LiveCounters {
                viewed_posts_today: field(entries, keys::VIEWED_POSTS),
                pixels_scrolled_today: field::<Option<Pixels>>(entries, keys::PIXELS_SCROLLED)
                    .map_or(0, |v| v.0),
                today_date: field::<Option<DateKey>>(entries, keys::TODAY_DATE),
                last_reset_time: field::<Option<Millis>>(entries, keys::LAST_RESET_TIME)
                    .and_then(|v| DateTime::from_timestamp_millis(v.0)),
            },
            settings,
            history: history_field(entries),
            hourly: field::<HourlyIndex>(entries, keys::HOURLY_DATA),
            minutes: field::<MinuteIndex>(entries, keys::MINUTE_DATA),
        }
    }

    /// Serializes only the requested keys. The schema version is always included.
    pub fn entries_for(&self, requested: &[&str]) -> StoreEntries {
        let mut entries = StoreEntries::new();
        for key in requested {
            if let Some(value) = self.value_of(key) {
                entries.insert(key.to_string(), value);
            }
        }
        entries.insert(keys::SCHEMA_VERSION.into(), json!(SCHEMA_VERSION));
        entries
    }

    pub fn to_entries(&self) -> StoreEntries {
        self.entries_for(&keys::ALL)
    }

    fn value_of(&self, key: &str) -> Option<Value> {
        let value = match key {
            keys::VIEWED_POSTS => json!(self.counters.viewed_posts_today),
            keys::PIXELS_SCROLLED => json!(self.counters.pixels_scrolled_today),
            keys::THRESHOLD => json!(self.settings.threshold),
            keys::MODE => json!(self.settings.mode),
            keys::LAST_RESET_TIME => json!(self
                .counters
                .last_reset_time
                .map(|v: DateTime<Utc>| v.timestamp_millis())),
            keys::TODAY_DATE => json!(self.counters.today_date),
            keys::HISTORY => json!(self.history),
            keys::HOURLY_DATA => json!(self.hourly),
            keys::MINUTE_DATA => json!(self.minutes),
            _ => return None,
        };
        Some(value)
    }
}

/// Writes settings without touching anything else.
pub async fn save_settings(store: &impl PersistentStore, settings: Settings) -> Result<()> {
    let state = UsageState {
        settings,
        ..Default::default()
    };
    store.set(state.entries_for(&keys::SETTINGS)).await
}

/// Epoch milliseconds. Older stores wrote them as floating point numbers.
struct Millis(i64);

impl<'de> Deserialize<'de> for Millis {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let value = f64::deserialize(deserializer)?;
        Ok(Millis(value as i64))
    }
}

/// Scroll distance, see [whole_pixels].
struct Pixels(u64);

impl<'de> Deserialize<'de> for Pixels {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        whole_pixels(deserializer).map(Pixels)
    }
}

fn field<T: DeserializeOwned + Default>(entries: &StoreEntries, key: &str) -> T {
    match entries.get(key) {
        None | Some(Value::Null) => T::default(),
        Some(value) => T::deserialize(value).unwrap_or_else(|e| {
            warn!("Ignoring malformed value for {key}: {e}");
            T::default()
        }),
    }
}

fn history_field(entries: &StoreEntries) -> HistoryLog {
    let records = field::<Vec<Value>>(entries, keys::HISTORY);
    let mut history = Vec::with_capacity(records.len());
    for record in records {
        match DailyRecord::deserialize(&record) {
            Ok(v) if history.last().is_some_and(|last: &DailyRecord| last.date >= v.date) => {
                warn!("Dropping out of order history record for {}", v.date)
            }
            Ok(v) => history.push(v),
            Err(e) => warn!("Dropping malformed history record {record}: {e}"),
        }
    }
    HistoryLog::new(history)
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, TimeZone, Utc};
    use serde_json::json;

    use super::*;
    use crate::storage::memory_store::MemoryStore;

    fn entries(value: Value) -> StoreEntries {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected an object"),
        }
    }

    #[test]
    fn test_missing_store_is_cold_start() {
        let state = UsageState::from_entries(&StoreEntries::new());
        assert_eq!(state, UsageState::default());
        assert_eq!(state.settings.threshold.get(), 100);
        assert_eq!(state.settings.mode, Mode::Nudge);
    }

    #[test]
    fn test_malformed_fields_default_individually() {
        let state = UsageState::from_entries(&entries(json!({
            "viewedPosts": "many",
            "pixelsScrolled": 1200,
            "threshold": 0,
            "mode": "block",
            "todayDate": "2024-01-01",
            "hourlyData": [1, 2, 3],
            "history": [
                { "date": "2023-12-30", "tweets": 3, "pixels": 10 },
                { "tweets": 5 },
                { "date": "2023-12-31", "postsViewed": 7 }
            ]
        })));

        assert_eq!(state.counters.viewed_posts_today, 0);
        assert_eq!(state.counters.pixels_scrolled_today, 1200);
        assert_eq!(state.settings, Settings::default());
        assert_eq!(state.counters.today_date.unwrap().as_str(), "2024-01-01");
        assert_eq!(state.hourly, HourlyIndex::default());
        assert_eq!(state.history.len(), 2);
        assert_eq!(state.history.last().unwrap().posts_viewed, 7);
    }

    #[test]
    fn test_fractional_scroll_totals_are_kept() {
        let state = UsageState::from_entries(&entries(json!({
            "pixelsScrolled": 5120.5,
            "history": [
                { "date": "2024-01-01", "tweets": 30, "pixels": 8000.25, "hourly": { "09": 30 } },
                { "date": "2024-01-02", "postsViewed": 4, "pixelsScrolled": 1200 }
            ]
        })));

        assert_eq!(state.counters.pixels_scrolled_today, 5120);
        assert_eq!(state.history.len(), 2);
        let first = &state.history.records()[0];
        assert_eq!(first.posts_viewed, 30);
        assert_eq!(first.pixels_scrolled, 8000);
        assert_eq!(state.history.records()[1].pixels_scrolled, 1200);
    }

    #[test]
    fn test_entries_for_writes_requested_keys_and_version() {
        let mut state = UsageState::default();
        state.counters.viewed_posts_today = 3;
        state.counters.today_date = Some(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap().into());

        let written = state.entries_for(&[keys::VIEWED_POSTS, keys::TODAY_DATE]);
        assert_eq!(
            written,
            entries(json!({
                "viewedPosts": 3,
                "todayDate": "2024-01-01",
                "schemaVersion": SCHEMA_VERSION,
            }))
        );
    }

    #[tokio::test]
    async fn test_load_round_trip() -> Result<()> {
        let mut state = UsageState::default();
        state.counters.viewed_posts_today = 12;
        state.counters.pixels_scrolled_today = 4000;
        state.counters.today_date = Some(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap().into());
        state.counters.last_reset_time = Some(Utc.with_ymd_and_hms(2024, 1, 1, 8, 0, 0).unwrap());
        state.settings.mode = Mode::Count;

        let store = MemoryStore::new();
        store.set(state.to_entries()).await?;

        assert_eq!(UsageState::load(&store).await?, state);
        Ok(())
    }

    #[tokio::test]
    async fn test_save_settings_leaves_counters() -> Result<()> {
        let store = MemoryStore::with_entries(entries(json!({ "viewedPosts": 9 })));
        save_settings(
            &store,
            Settings {
                threshold: NonZeroU32::new(25).unwrap(),
                mode: Mode::Count,
            },
        )
        .await?;

        let state = UsageState::load(&store).await?;
        assert_eq!(state.counters.viewed_posts_today, 9);
        assert_eq!(state.settings.threshold.get(), 25);
        assert_eq!(state.settings.mode, Mode::Count);
        Ok(())
    }
}
