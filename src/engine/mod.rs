//! The aggregation engine owns the usage state of one context. It decides when a day is over,
//! keeps minute, hour and day resolutions consistent and writes every change through a
//! [PersistentStore].
//!
//! An engine instance is driven by a single task, so its read-modify-write cycles never overlap.
//! Writes from other processes sharing the store are last write wins.

pub mod rollover;

use std::num::NonZeroU32;

use chrono::{DateTime, FixedOffset, Utc};
use rollover::{roll_over, RolloverOutcome};
use tracing::{debug, info, warn};

use crate::{
    storage::{
        entities::{Mode, UsageState},
        snapshot::keys,
        store::PersistentStore,
    },
    utils::time::{date_key_of, hour_key_of, minute_key_of, minute_retention_start},
};

/// Scroll distance is written every time the running total passes a multiple of this value.
pub const SCROLL_PERSIST_STEP: u64 = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Observation {
    PostViewed,
    /// Signed scroll distance in pixels, direction doesn't matter.
    ScrollDelta(i64),
}

/// Read-only projection of the current day handed to presentation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViewState {
    pub viewed_posts_today: u64,
    pub pixels_scrolled_today: u64,
    pub threshold: NonZeroU32,
    pub mode: Mode,
    pub is_over_threshold: bool,
}

impl ViewState {
    pub fn of(state: &UsageState) -> Self {
        let threshold = state.settings.threshold;
        Self {
            viewed_posts_today: state.counters.viewed_posts_today,
            pixels_scrolled_today: state.counters.pixels_scrolled_today,
            threshold,
            mode: state.settings.mode,
            is_over_threshold: state.counters.viewed_posts_today >= u64::from(threshold.get()),
        }
    }
}

pub struct AggregationEngine<S: PersistentStore> {
    store: S,
    state: UsageState,
}

impl<S: PersistentStore> AggregationEngine<S> {
    /// Loads the stored state and closes the stored day if `now` is on a different one. A store
    /// that can't be read is treated as empty.
    pub async fn initialize(store: S, now: DateTime<FixedOffset>) -> Self {
        let state = match UsageState::load(&store).await {
            Ok(state) => state,
            Err(e) => {
                warn!("Couldn't load stored usage, starting from scratch {e:?}");
                UsageState::default()
            }
        };
        let mut engine = Self { store, state };
        engine.roll_over_if_needed(&now).await;
        engine
    }

    pub fn state(&self) -> &UsageState {
        &self.state
    }

    pub fn view_state(&self) -> ViewState {
        ViewState::of(&self.state)
    }

    /// Applies a single observation and persists the result.
    pub async fn observe(
        &mut self,
        observation: Observation,
        now: DateTime<FixedOffset>,
    ) -> ViewState {
        self.roll_over_if_needed(&now).await;
        let evicted = self
            .state
            .minutes
            .evict_before(&minute_retention_start(&now));
        if evicted > 0 {
            debug!("Evicted {evicted} minute buckets");
        }

        match observation {
            Observation::PostViewed => self.record_post(&now).await,
            Observation::ScrollDelta(delta) => self.record_scroll(delta).await,
        }
        self.view_state()
    }

    async fn record_post(&mut self, now: &DateTime<FixedOffset>) {
        let today = date_key_of(now);
        self.state.counters.viewed_posts_today += 1;
        self.state.hourly.increment(&today, hour_key_of(now));
        self.state.minutes.increment(minute_key_of(now));

        let mut changed = vec![keys::VIEWED_POSTS, keys::HOURLY_DATA, keys::MINUTE_DATA];
        if self.state.counters.viewed_posts_today == 1 {
            self.state.counters.last_reset_time = Some(now.with_timezone(&Utc));
            self.state.counters.today_date = Some(today);
            changed.extend([keys::LAST_RESET_TIME, keys::TODAY_DATE]);
        }
        debug!(
            "Posts viewed: {}/{}",
            self.state.counters.viewed_posts_today, self.state.settings.threshold
        );
        self.persist(&changed).await;
    }

    async fn record_scroll(&mut self, delta: i64) {
        let before = self.state.counters.pixels_scrolled_today;
        let after = before.saturating_add(delta.unsigned_abs());
        self.state.counters.pixels_scrolled_today = after;

        if after / SCROLL_PERSIST_STEP != before / SCROLL_PERSIST_STEP {
            self.persist(&[keys::PIXELS_SCROLLED]).await;
        }
    }

    /// Manual reset of today's post counter. Scroll distance is kept.
    pub async fn reset(&mut self, now: DateTime<FixedOffset>) -> ViewState {
        self.roll_over_if_needed(&now).await;
        let today = date_key_of(&now);
        self.state.counters.viewed_posts_today = 0;
        self.state.counters.last_reset_time = Some(now.with_timezone(&Utc));
        self.state.hourly.clear_day(&today);
        info!("Post counter was reset");
        self.persist(&[
            keys::VIEWED_POSTS,
            keys::HOURLY_DATA,
            keys::LAST_RESET_TIME,
        ])
        .await;
        self.view_state()
    }

    /// Writes all usage data, including scroll distance that hasn't reached the next persist
    /// step. Settings are never written by the engine.
    pub async fn flush(&mut self) {
        self.persist(&keys::USAGE).await;
    }

    async fn roll_over_if_needed(&mut self, now: &DateTime<FixedOffset>) {
        let today = date_key_of(now);
        let outcome = roll_over(&mut self.state, &today, now.with_timezone(&Utc));
        match &outcome {
            RolloverOutcome::SameDay => return,
            RolloverOutcome::FirstRun => info!("No stored day, starting {today}"),
            RolloverOutcome::NewDay { archived } => {
                info!("New day {today}, archived {archived:?}, counters reset")
            }
        }
        self.persist(outcome.changed_keys()).await;
    }

    /// Best effort. A failed write is logged and the update only lives in memory until the next
    /// successful one.
    async fn persist(&self, changed: &[&str]) {
        if let Err(e) = self.store.set(self.state.entries_for(changed)).await {
            warn!("Failed to persist {changed:?}, the update is lost: {e:?}");
        }
    }
}
