use std::{sync::Arc, time::Duration};

use anyhow::Result;
use tokio::{sync::mpsc, time::Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, Instrument};

use crate::{tracker::event::TrackerEvent, utils::clock::Clock};

use super::{
    detector::PostDetector,
    page::{FeedSnapshot, PageEvent, PageSource},
};

/// Detection waits for the page to stay quiet this long, so a burst of mutations results in a
/// single pass.
pub const SETTLE_DELAY: Duration = Duration::from_millis(100);

pub struct DetectionModule {
    next: mpsc::Sender<TrackerEvent>,
    source: Box<dyn PageSource>,
    detector: PostDetector,
    shutdown: CancellationToken,
    settle_delay: Duration,
    time_provider: Arc<dyn Clock>,
    last_scroll_y: Option<f64>,
    latest: Option<FeedSnapshot>,
}

impl DetectionModule {
    pub fn new(
        next: mpsc::Sender<TrackerEvent>,
        source: Box<dyn PageSource>,
        detector: PostDetector,
        shutdown: CancellationToken,
        settle_delay: Duration,
        time_provider: Arc<dyn Clock>,
    ) -> Self {
        Self {
            next,
            source,
            detector,
            shutdown,
            settle_delay,
            time_provider,
            last_scroll_y: None,
            latest: None,
        }
    }

    /// Executes the detection event loop. Returns the page source once the loop is cancelled or
    /// the page is gone, so a restarted pipeline can keep reading from it.
    pub async fn run(mut self) -> Result<Box<dyn PageSource>> {
        let mut settle_at: Option<Instant> = None;
        loop {
            tokio::select! {
                // Cancelation means we stop execution of the event loop. Which means we also drop
                // the sender channel and consequently stop processing module.
                _ = self.shutdown.cancelled() => {
                    break;
                }
                _ = settle(self.time_provider.as_ref(), settle_at) => {
                    settle_at = None;
                    self.rescan().await?;
                }
                event = self.source.next_event() => match event {
                    Ok(Some(event)) => {
                        self.accept(event).await?;
                        settle_at = Some(self.time_provider.instant() + self.settle_delay);
                    }
                    Ok(None) => {
                        info!("Page source is exhausted");
                        if settle_at.is_some() {
                            self.rescan().await?;
                        }
                        break;
                    }
                    Err(e) => {
                        error!("Encountered an error while reading the page {:?}", e);
                        break;
                    }
                }
            }
        }
        Ok(self.source)
    }

    async fn accept(&mut self, event: PageEvent) -> Result<()> {
        match &event {
            PageEvent::Mutation(_) => debug!("Feed mutated"),
            PageEvent::Scroll(_) => debug!("Feed scrolled"),
        }
        let snapshot = event.into_snapshot();

        let previous = self.last_scroll_y.replace(snapshot.scroll_y);
        let delta = previous.map_or(0, |previous| (snapshot.scroll_y - previous).round() as i64);
        if delta != 0 {
            let event = TrackerEvent::Scrolled {
                pixels: delta,
                at: self.time_provider.local_time(),
            };
            send(&self.next, event).await?;
        }

        self.latest = Some(snapshot);
        Ok(())
    }

    async fn rescan(&mut self) -> Result<()> {
        let Some(snapshot) = self.latest.as_ref() else {
            return Ok(());
        };
        let posts = self.detector.detect_new_posts(snapshot);
        let at = self.time_provider.local_time();
        for post in posts {
            send(&self.next, TrackerEvent::PostViewed { post, at }).await?;
        }
        Ok(())
    }
}

/// Only borrows the sender, so the detection future stays `Send` while it waits for room in the
/// channel.
async fn send(next: &mpsc::Sender<TrackerEvent>, event: TrackerEvent) -> Result<()> {
    let span = info_span!("Sending tracker event");
    debug!("Sending message {:?}", event);
    next.send(event)
        .instrument(span)
        .await
        .inspect_err(|e| error!("Unexpected error during sending {e:?}"))?;
    Ok(())
}

async fn settle(clock: &dyn Clock, at: Option<Instant>) {
    match at {
        Some(at) => clock.sleep_until(at).await,
        None => std::future::pending().await,
    }
}
