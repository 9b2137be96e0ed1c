use chrono::{DateTime, Utc};
use tracing::warn;

use crate::{
    storage::{
        entities::{DailyRecord, LiveCounters, UsageState},
        snapshot::keys,
    },
    utils::time::DateKey,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RolloverOutcome {
    /// Nothing was stored before, today's date was stamped.
    FirstRun,
    SameDay,
    /// Counters were reset. `archived` is the day that was moved into the history, if it had any
    /// activity.
    NewDay { archived: Option<DateKey> },
}

impl RolloverOutcome {
    /// Keys that have to be written to make the outcome durable.
    pub fn changed_keys(&self) -> &'static [&'static str] {
        match self {
            RolloverOutcome::FirstRun => &[keys::TODAY_DATE],
            RolloverOutcome::SameDay => &[],
            RolloverOutcome::NewDay { .. } => &[
                keys::HISTORY,
                keys::HOURLY_DATA,
                keys::VIEWED_POSTS,
                keys::PIXELS_SCROLLED,
                keys::TODAY_DATE,
                keys::LAST_RESET_TIME,
            ],
        }
    }
}

/// Closes the stored day if `today` is a different one. Days in between that were never
/// observed don't get a record. Running it again for the same `today` changes nothing.
pub fn roll_over(state: &mut UsageState, today: &DateKey, now: DateTime<Utc>) -> RolloverOutcome {
    let stored = match &state.counters.today_date {
        None => {
            state.counters.today_date = Some(today.clone());
            return RolloverOutcome::FirstRun;
        }
        Some(stored) if stored == today => return RolloverOutcome::SameDay,
        Some(stored) => stored.clone(),
    };

    // Another context might have closed the same day already. Records must stay in date order,
    // which a host clock that moved back would break.
    let after_history = state
        .history
        .last()
        .map_or(true, |last| last.date < stored);
    if !state.history.contains_date(&stored) && (!after_history || &stored > today) {
        warn!("Stored day {stored} is out of order with {today}, the host clock moved back");
    }
    let archived = if state.counters.had_activity() && after_history && &stored < today {
        state.history.push(DailyRecord {
            date: stored.clone(),
            posts_viewed: state.counters.viewed_posts_today,
            pixels_scrolled: state.counters.pixels_scrolled_today,
            hourly: state.hourly.day(&stored).cloned().unwrap_or_default(),
        });
        state.hourly.retain_history(&state.history);
        Some(stored)
    } else {
        None
    };

    state.counters = LiveCounters {
        viewed_posts_today: 0,
        pixels_scrolled_today: 0,
        today_date: Some(today.clone()),
        last_reset_time: Some(now),
    };

    RolloverOutcome::NewDay { archived }
}
