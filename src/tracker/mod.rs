//! The tracker is the page-side context: it turns page events into counted posts and keeps the
//! usage state up to date.
//!
//! ```text
//! PageSource -> DetectionModule -> mpsc -> ProcessingModule -> AggregationEngine -> store
//! ```
//!
//! A change of threshold or mode rebuilds the whole pipeline from the store, the same thing a
//! page reload does to a content script.

use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use anyhow::Result;
use collection::{
    collector::DetectionModule,
    detector::PostDetector,
    page::{JsonLinesSource, PageSource},
};
use event::TrackerEvent;
use processing::{engine_processor::EngineProcessor, ProcessingModule};
use tokio::{
    io::BufReader,
    sync::{broadcast, broadcast::error::RecvError, mpsc},
};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::{
    engine::AggregationEngine,
    storage::{
        file_store::{FileStore, DEFAULT_POLL_INTERVAL},
        snapshot::keys,
        store::{PersistentStore, StoreChange},
    },
    utils::clock::{Clock, DefaultClock},
};

pub mod args;
pub mod collection;
pub mod event;
pub mod processing;
pub mod shutdown;

const EVENT_CHANNEL_CAPACITY: usize = 64;

const DEFAULT_SETTLE_DELAY: Duration = collection::collector::SETTLE_DELAY;

/// Page events come from `input` if it is set, otherwise from stdin.
pub async fn open_page_source(input: Option<&Path>) -> Result<Box<dyn PageSource>> {
    Ok(match input {
        Some(input) => {
            info!("Reading page events from {input:?}");
            let file = tokio::fs::File::open(input).await?;
            Box::new(JsonLinesSource::new(BufReader::new(file)))
        }
        None => Box::new(JsonLinesSource::new(BufReader::new(tokio::io::stdin()))),
    })
}

/// Represents the starting point for the tracker
pub async fn start_tracker(dir: PathBuf, source: Box<dyn PageSource>) -> Result<()> {
    let store = Arc::new(FileStore::new(&dir)?);
    info!("Using store {:?}", store.path());
    let clock: Arc<dyn Clock> = Arc::new(DefaultClock);
    let shutdown_token = CancellationToken::new();

    let (_, _, tracking_result) = tokio::join!(
        shutdown::detect_shutdown(shutdown_token.clone()),
        store.watch_external_changes(clock.as_ref(), DEFAULT_POLL_INTERVAL, shutdown_token.clone()),
        async {
            let result = run_tracking(store.clone(), source, clock.clone(), &shutdown_token).await;
            shutdown_token.cancel();
            result
        },
    );

    if let Err(tracking_result) = &tracking_result {
        error!("Tracking stopped with an error {:?}", tracking_result);
    }
    tracking_result
}

/// Runs the pipeline until the page is gone or `shutdown` is cancelled, restarting it every
/// time settings change.
pub async fn run_tracking<S: PersistentStore + Clone>(
    store: S,
    mut source: Box<dyn PageSource>,
    clock: Arc<dyn Clock>,
    shutdown: &CancellationToken,
) -> Result<()> {
    loop {
        let round = shutdown.child_token();
        let mut changes = store.subscribe();
        let (sender, receiver) = mpsc::channel::<TrackerEvent>(EVENT_CHANNEL_CAPACITY);

        let engine = AggregationEngine::initialize(store.clone(), clock.local_time()).await;
        info!("Tracking started {:?}", engine.view_state());

        let collector = create_collector(sender, source, &round, clock.clone());
        let processor = create_processor(receiver, engine);

        let (settings_changed, collection_result, processing_result) = tokio::join!(
            wait_for_settings_change(&mut changes, &round),
            async {
                let result = collector.run().await;
                // Either the page is gone or the round is over already.
                round.cancel();
                result
            },
            processor.run(),
        );

        if let Err(processing_result) = processing_result {
            error!("Processing module got an error {:?}", processing_result);
        }
        source = collection_result
            .inspect_err(|e| error!("Collection module got an error {e:?}"))?;

        if !settings_changed || shutdown.is_cancelled() {
            return Ok(());
        }
        info!("Settings changed, restarting tracking");
    }
}

/// Resolves to `true` and cancels `round` when threshold or mode change, resolves to `false` if
/// `round` is cancelled for another reason.
async fn wait_for_settings_change(
    changes: &mut broadcast::Receiver<Vec<StoreChange>>,
    round: &CancellationToken,
) -> bool {
    loop {
        tokio::select! {
            _ = round.cancelled() => return false,
            received = changes.recv() => match received {
                Ok(batch) if batch.iter().any(|v| keys::SETTINGS.contains(&v.key.as_str())) => {
                    round.cancel();
                    return true;
                }
                Ok(_) => (),
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Missed {skipped} store notifications");
                }
                Err(RecvError::Closed) => {
                    round.cancelled().await;
                    return false;
                }
            }
        }
    }
}

fn create_collector(
    sender: mpsc::Sender<TrackerEvent>,
    source: Box<dyn PageSource>,
    shutdown_token: &CancellationToken,
    clock: Arc<dyn Clock>,
) -> DetectionModule {
    DetectionModule::new(
        sender,
        source,
        PostDetector::default(),
        shutdown_token.clone(),
        DEFAULT_SETTLE_DELAY,
        clock,
    )
}

fn create_processor<S: PersistentStore>(
    receiver: mpsc::Receiver<TrackerEvent>,
    engine: AggregationEngine<S>,
) -> ProcessingModule<EngineProcessor<S>> {
    ProcessingModule::new(receiver, EngineProcessor::new(engine))
}

#[cfg(test)]
mod tracker_tests {
    use std::{num::NonZeroU32, sync::Arc, time::Duration};

    use anyhow::Result;
    use async_trait::async_trait;
    use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
    use tempfile::tempdir;
    use tokio::{sync::mpsc, time::Instant};
    use tokio_util::sync::CancellationToken;

    use super::run_tracking;
    use crate::{
        storage::{
            entities::{Mode, Settings, UsageState},
            file_store::FileStore,
            memory_store::MemoryStore,
            snapshot::save_settings,
        },
        tracker::collection::page::{JsonLinesSource, PageEvent, PageSource},
        utils::{
            clock::Clock,
            logging::TEST_LOGGING,
            time::DateKey,
        },
    };

    const TEST_START_DATE: NaiveDateTime = NaiveDateTime::new(
        NaiveDate::from_ymd_opt(2018, 7, 4).unwrap(),
        NaiveTime::from_hms_opt(10, 0, 0).unwrap(),
    );

    #[derive(Clone)]
    struct TestClock {
        start_time: DateTime<Utc>,
        reference: Instant,
    }

    impl TestClock {
        fn new() -> Self {
            Self {
                start_time: Utc.from_utc_datetime(&TEST_START_DATE),
                reference: Instant::now(),
            }
        }
    }

    #[async_trait]
    impl Clock for TestClock {
        fn time(&self) -> DateTime<Utc> {
            self.start_time + self.reference.elapsed()
        }

        fn local_time(&self) -> DateTime<FixedOffset> {
            self.time().fixed_offset()
        }

        fn instant(&self) -> Instant {
            Instant::now()
        }

        async fn sleep(&self, duration: Duration) {
            tokio::time::sleep(duration).await;
        }

        async fn sleep_until(&self, instant: tokio::time::Instant) {
            tokio::time::sleep_until(instant).await;
        }
    }

    struct ChannelSource(mpsc::Receiver<PageEvent>);

    #[async_trait]
    impl PageSource for ChannelSource {
        async fn next_event(&mut self) -> Result<Option<PageEvent>> {
            Ok(self.0.recv().await)
        }
    }

    fn mutation(scroll_y: u32, links: &[&str]) -> String {
        let posts = links
            .iter()
            .enumerate()
            .map(|(i, link)| {
                format!(
                    r#"{{"permalink":"{link}","content":"","top":{},"bottom":{}}}"#,
                    i * 300,
                    i * 300 + 300
                )
            })
            .collect::<Vec<_>>()
            .join(",");
        format!(
            r#"{{"type":"mutation","scrollY":{scroll_y},"viewportHeight":900,"posts":[{posts}]}}"#
        )
    }

    /// Very simple smoke test: page events in, usage out.
    #[tokio::test(start_paused = true)]
    async fn smoke_test_tracker() -> Result<()> {
        *TEST_LOGGING;
        let input = [
            mutation(0, &["/u/status/1", "/u/status/2"]),
            "{\"broken\": true}".to_string(),
            mutation(1500, &["/u/status/2", "/u/status/3"]),
            mutation(1500, &["/u/status/1", "/u/status/2", "/u/status/3"]),
        ]
        .join("\n");
        let source = JsonLinesSource::new(std::io::Cursor::new(input.into_bytes()));

        let dir = tempdir()?;
        let store = Arc::new(FileStore::new(dir.path())?);
        let shutdown = CancellationToken::new();

        run_tracking(store.clone(), Box::new(source), Arc::new(TestClock::new()), &shutdown).await?;

        let state = UsageState::load(&store).await?;
        assert_eq!(state.counters.viewed_posts_today, 3);
        assert_eq!(state.counters.pixels_scrolled_today, 1500);
        let today = DateKey::from(TEST_START_DATE.date());
        assert_eq!(state.counters.today_date, Some(today.clone()));
        assert_eq!(state.hourly.total_for(&today), 3);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn test_settings_change_restarts_tracking() -> Result<()> {
        *TEST_LOGGING;
        let store = Arc::new(MemoryStore::new());
        let (page, events) = mpsc::channel(8);
        let shutdown = CancellationToken::new();

        let clock = Arc::new(TestClock::new());

        let page_side = async {
            let feed: PageEvent = serde_json::from_str(&mutation(0, &["/a", "/b"]))?;
            page.send(feed.clone()).await?;
            tokio::time::sleep(Duration::from_millis(500)).await;
            assert_eq!(UsageState::load(&store).await?.counters.viewed_posts_today, 2);

            save_settings(
                &store,
                Settings {
                    threshold: NonZeroU32::new(3).unwrap(),
                    mode: Mode::Count,
                },
            )
            .await?;
            tokio::time::sleep(Duration::from_millis(500)).await;

            // The restarted pipeline has no memory of the posts it has seen, like a reloaded page.
            page.send(feed).await?;
            tokio::time::sleep(Duration::from_millis(500)).await;
            drop(page);
            anyhow::Ok(())
        };
        let (tracking, page_side) = tokio::join!(
            run_tracking(store.clone(), Box::new(ChannelSource(events)), clock, &shutdown),
            page_side
        );
        tracking?;
        page_side?;

        let state = UsageState::load(&store).await?;
        assert_eq!(state.counters.viewed_posts_today, 4);
        assert_eq!(state.settings.threshold.get(), 3);
        assert_eq!(state.settings.mode, Mode::Count);
        Ok(())
    }
}
