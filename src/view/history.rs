use crate::storage::entities::{DailyRecord, HistoryLog};

pub const SPARKLINE_DAYS: usize = 7;

/// Today's count against the recent past.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Comparison {
    /// Percent change against the last recorded day, `0` when that day had no posts.
    pub vs_yesterday_percent: i64,
    pub week_average: u64,
    pub vs_week: i64,
    pub month_average: u64,
    pub vs_month: i64,
}

/// `None` until at least one day was closed.
pub fn compare(history: &HistoryLog, today_posts: u64) -> Option<Comparison> {
    let yesterday = history.last()?.posts_viewed;
    let today = today_posts as i64;

    let vs_yesterday_percent = if yesterday == 0 {
        0
    } else {
        ((today - yesterday as i64) as f64 / yesterday as f64 * 100.).round() as i64
    };
    let week_average = average_posts(history.recent(7));
    let month_average = average_posts(history.recent(30));

    Some(Comparison {
        vs_yesterday_percent,
        week_average,
        vs_week: today - week_average as i64,
        month_average,
        vs_month: today - month_average as i64,
    })
}

fn average_posts(records: &[DailyRecord]) -> u64 {
    if records.is_empty() {
        return 0;
    }
    let total: u64 = records.iter().map(|v| v.posts_viewed).sum();
    (total as f64 / records.len() as f64).round() as u64
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryEntry<'a> {
    pub record: &'a DailyRecord,
    /// Difference to the day recorded before this one. `None` for the oldest record.
    pub posts_delta: Option<i64>,
    pub pixels_delta: Option<i64>,
    /// Posts of this day and the six recorded before it, oldest first.
    pub sparkline: Option<[u64; SPARKLINE_DAYS]>,
}

/// History newest first.
pub fn history_entries(history: &HistoryLog) -> Vec<HistoryEntry<'_>> {
    let records = history.records();
    records
        .iter()
        .enumerate()
        .rev()
        .map(|(index, record)| {
            let previous = index.checked_sub(1).map(|v| &records[v]);
            HistoryEntry {
                record,
                posts_delta: previous.map(|v| record.posts_viewed as i64 - v.posts_viewed as i64),
                pixels_delta: previous
                    .map(|v| record.pixels_scrolled as i64 - v.pixels_scrolled as i64),
                sparkline: sparkline(records, index),
            }
        })
        .collect()
}

fn sparkline(records: &[DailyRecord], index: usize) -> Option<[u64; SPARKLINE_DAYS]> {
    let start = (index + 1).checked_sub(SPARKLINE_DAYS)?;
    let mut values = [0; SPARKLINE_DAYS];
    for (value, record) in values.iter_mut().zip(&records[start..=index]) {
        *value = record.posts_viewed;
    }
    Some(values)
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, NaiveDate};

    use super::*;

    fn history(posts: &[u64]) -> HistoryLog {
        let start = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        HistoryLog::new(
            posts
                .iter()
                .enumerate()
                .map(|(i, posts)| DailyRecord {
                    date: (start + Duration::days(i as i64)).into(),
                    posts_viewed: *posts,
                    pixels_scrolled: posts * 100,
                    hourly: Default::default(),
                })
                .collect(),
        )
    }

    #[test]
    fn test_compare_without_history() {
        assert_eq!(compare(&HistoryLog::default(), 10), None);
    }

    #[test]
    fn test_compare() {
        let log = history(&[100, 100, 100, 100, 100, 100, 100, 10, 20, 40]);
        let comparison = compare(&log, 50).unwrap();
        assert_eq!(comparison.vs_yesterday_percent, 25);
        // (100 * 4 + 10 + 20 + 40) / 7 = 67.1
        assert_eq!(comparison.week_average, 67);
        assert_eq!(comparison.vs_week, -17);
        assert_eq!(comparison.month_average, 77);
        assert_eq!(comparison.vs_month, -27);
    }

    #[test]
    fn test_compare_against_empty_yesterday() {
        let comparison = compare(&history(&[0]), 12).unwrap();
        assert_eq!(comparison.vs_yesterday_percent, 0);
        assert_eq!(comparison.vs_week, 12);
    }

    #[test]
    fn test_history_entries() {
        let log = history(&[1, 2, 3, 4, 5, 6, 7, 5]);
        let entries = history_entries(&log);

        assert_eq!(entries.len(), 8);
        assert_eq!(entries[0].record.posts_viewed, 5);
        assert_eq!(entries[0].posts_delta, Some(-2));
        assert_eq!(entries[0].pixels_delta, Some(-200));
        assert_eq!(entries[0].sparkline, Some([2, 3, 4, 5, 6, 7, 5]));
        assert_eq!(entries[1].sparkline, Some([1, 2, 3, 4, 5, 6, 7]));
        assert_eq!(entries[2].sparkline, None);

        let oldest = entries.last().unwrap();
        assert_eq!(oldest.posts_delta, None);
        assert_eq!(oldest.pixels_delta, None);
    }
}
