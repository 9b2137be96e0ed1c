use chrono::{DateTime, Duration, TimeZone, Timelike};

use crate::{
    storage::entities::{HistoryLog, HourlyIndex, MinuteIndex, UsageState},
    utils::{
        percentage::Percentage,
        time::{date_key_of, minute_key_of, DateKey, HourKey, MinuteKey},
    },
};

pub const MINUTE_SERIES_LEN: usize = 60;
pub const DAILY_SERIES_HISTORY: usize = 30;
pub const HEATMAP_CELLS: usize = 28;
pub const HEATMAP_MAX_INTENSITY: u8 = 5;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MinutePoint {
    pub minute: MinuteKey,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HourBar {
    pub hour: HourKey,
    pub count: u64,
    /// Relative to the busiest hour shown.
    pub height: Percentage,
    pub is_current: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DayBar {
    pub date: DateKey,
    pub posts: u64,
    pub height: Percentage,
    pub is_weekend: bool,
    pub is_today: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeatCell {
    pub date: DateKey,
    pub posts: u64,
    /// `0` for a day without posts, otherwise `1..=5`.
    pub intensity: u8,
}

/// Posts per minute for the last hour, oldest first. Minutes without posts are present with a
/// zero count.
pub fn minute_series<Tz: TimeZone>(minutes: &MinuteIndex, now: &DateTime<Tz>) -> Vec<MinutePoint> {
    (0..MINUTE_SERIES_LEN as i64)
        .rev()
        .map(|ago| {
            let minute = minute_key_of(&(now.clone() - Duration::minutes(ago)));
            MinutePoint {
                count: minutes.get(&minute),
                minute,
            }
        })
        .collect()
}

/// Hours of today from the first one with posts up to the current one. Starts at midnight if
/// nothing was counted yet.
pub fn hourly_series<Tz: TimeZone>(hourly: &HourlyIndex, now: &DateTime<Tz>) -> Vec<HourBar> {
    let today = date_key_of(now);
    let current_hour = now.hour();
    let count_at = |hour: u32| {
        hourly
            .day(&today)
            .and_then(|day| day.get(&HourKey::from_hour(hour)))
            .copied()
            .unwrap_or(0)
    };

    let first_hour = (0..24).find(|hour| count_at(*hour) > 0).unwrap_or(0);
    let max = hourly
        .day(&today)
        .and_then(|day| day.values().max().copied())
        .unwrap_or(0)
        .max(1);

    (first_hour..=current_hour)
        .map(|hour| {
            let count = count_at(hour);
            HourBar {
                hour: HourKey::from_hour(hour),
                count,
                height: Percentage::of(count, max),
                is_current: hour == current_hour,
            }
        })
        .collect()
}

/// The last month of closed days followed by today.
pub fn daily_series(state: &UsageState, today: &DateKey) -> Vec<DayBar> {
    let days = days_with_today(&state.history, DAILY_SERIES_HISTORY, state, today);
    let max = days.iter().map(|(_, posts)| *posts).max().unwrap_or(0).max(1);

    days.into_iter()
        .map(|(date, posts)| DayBar {
            height: Percentage::of(posts, max),
            is_weekend: date.is_weekend(),
            is_today: &date == today,
            posts,
            date,
        })
        .collect()
}

/// Four weeks ending today. Cells before the first known day are `None`.
pub fn heatmap(state: &UsageState, today: &DateKey) -> Vec<Option<HeatCell>> {
    let days = days_with_today(&state.history, HEATMAP_CELLS - 1, state, today);
    let max = days.iter().map(|(_, posts)| *posts).max().unwrap_or(0).max(1);

    let padding = HEATMAP_CELLS.saturating_sub(days.len());
    std::iter::repeat(None)
        .take(padding)
        .chain(days.into_iter().map(|(date, posts)| {
            Some(HeatCell {
                intensity: intensity(posts, max),
                date,
                posts,
            })
        }))
        .collect()
}

fn intensity(posts: u64, max: u64) -> u8 {
    if posts == 0 {
        return 0;
    }
    let scaled = (posts as f64 / max as f64 * f64::from(HEATMAP_MAX_INTENSITY)).ceil();
    (scaled as u8).min(HEATMAP_MAX_INTENSITY)
}

fn days_with_today(
    history: &HistoryLog,
    count: usize,
    state: &UsageState,
    today: &DateKey,
) -> Vec<(DateKey, u64)> {
    history
        .recent(count)
        .iter()
        .map(|record| (record.date.clone(), record.posts_viewed))
        .chain(std::iter::once((
            today.clone(),
            state.counters.viewed_posts_today,
        )))
        .collect()
}

#[cfg(test)]
mod tests {
    use chrono::{FixedOffset, NaiveDate};

    use super::*;
    use crate::storage::entities::DailyRecord;

    fn now(h: u32, m: u32) -> DateTime<FixedOffset> {
        FixedOffset::east_opt(2 * 3600)
            .unwrap()
            .with_ymd_and_hms(2024, 1, 3, h, m, 0)
            .unwrap()
    }

    fn record(day: u32, posts: u64) -> DailyRecord {
        DailyRecord {
            date: NaiveDate::from_ymd_opt(2023, 12, day).unwrap().into(),
            posts_viewed: posts,
            pixels_scrolled: 0,
            hourly: Default::default(),
        }
    }

    #[test]
    fn test_minute_series_is_zero_filled() {
        let mut minutes = MinuteIndex::default();
        minutes.increment(minute_key_of(&now(10, 30)));
        minutes.increment(minute_key_of(&now(10, 30)));
        minutes.increment(minute_key_of(&now(9, 40)));

        let series = minute_series(&minutes, &now(10, 30));
        assert_eq!(series.len(), 60);
        assert_eq!(series[0].minute.as_str(), "2024-01-03T09:31");
        assert_eq!(series[59].minute.as_str(), "2024-01-03T10:30");
        assert_eq!(series[59].count, 2);
        assert_eq!(series[9].count, 1);
        assert_eq!(series.iter().map(|v| v.count).sum::<u64>(), 3);
    }

    #[test]
    fn test_hourly_series_starts_at_first_active_hour() {
        let mut hourly = HourlyIndex::default();
        let today = date_key_of(&now(0, 0));
        for _ in 0..4 {
            hourly.increment(&today, HourKey::from_hour(8));
        }
        hourly.increment(&today, HourKey::from_hour(10));

        let bars = hourly_series(&hourly, &now(11, 15));
        let hours: Vec<_> = bars.iter().map(|v| v.hour.as_str()).collect();
        assert_eq!(hours, ["08", "09", "10", "11"]);
        assert_eq!(*bars[0].height, 100.);
        assert_eq!(*bars[1].height, 0.);
        assert_eq!(*bars[2].height, 25.);
        assert!(bars[3].is_current);
        assert!(!bars[0].is_current);
    }

    #[test]
    fn test_hourly_series_without_data() {
        let bars = hourly_series(&HourlyIndex::default(), &now(2, 0));
        assert_eq!(bars.len(), 3);
        assert!(bars.iter().all(|v| v.count == 0 && *v.height == 0.));
    }

    #[test]
    fn test_daily_series_ends_with_today() {
        let mut state = UsageState::default();
        state.history = HistoryLog::new((1..=31).map(|day| record(day, u64::from(day))).collect());
        state.counters.viewed_posts_today = 62;
        let today = date_key_of(&now(12, 0));

        let bars = daily_series(&state, &today);
        assert_eq!(bars.len(), 31);
        assert_eq!(bars[0].date.as_str(), "2023-12-02");
        assert!(bars[30].is_today);
        assert_eq!(*bars[30].height, 100.);
        assert_eq!(*bars[29].height, 50.);
        // 2023-12-02 was a Saturday.
        assert!(bars[0].is_weekend);
        assert!(!bars[3].is_weekend);
    }

    #[test]
    fn test_heatmap_padding_and_intensity() {
        let mut state = UsageState::default();
        state.history = HistoryLog::new(vec![record(30, 0), record(31, 10)]);
        state.counters.viewed_posts_today = 3;
        let today = date_key_of(&now(12, 0));

        let cells = heatmap(&state, &today);
        assert_eq!(cells.len(), 28);
        assert!(cells[..25].iter().all(Option::is_none));

        let known: Vec<_> = cells[25..].iter().flatten().collect();
        assert_eq!(known[0].intensity, 0);
        assert_eq!(known[1].intensity, 5);
        // 3 / 10 * 5 = 1.5, rounded up.
        assert_eq!(known[2].intensity, 2);
        assert_eq!(known[2].date, today);
    }

    #[test]
    fn test_heatmap_with_full_history() {
        let mut state = UsageState::default();
        state.history = HistoryLog::new((1..=31).map(|day| record(day, 1)).collect());
        let cells = heatmap(&state, &date_key_of(&now(12, 0)));
        assert_eq!(cells.len(), 28);
        assert!(cells.iter().all(Option::is_some));
        assert_eq!(cells[0].as_ref().unwrap().date.as_str(), "2023-12-05");
        assert_eq!(cells[27].as_ref().unwrap().intensity, 0);
    }
}
