use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, Local, Utc};
use tokio::time::Instant;

/// Source of both wall-clock time (for bucket keys and rollover) and tokio instants (for the
/// settle and poll timers). Tests pin the wall clock to a fixed day and run on paused time.
#[async_trait]
pub trait Clock: Sync + Send + 'static {
    fn time(&self) -> DateTime<Utc>;

    /// Wall-clock time in the user's timezone. Every bucket key is derived from this value.
    fn local_time(&self) -> DateTime<FixedOffset> {
        self.time().with_timezone(&Local).fixed_offset()
    }

    fn instant(&self) -> Instant;

    async fn sleep(&self, duration: Duration);

    async fn sleep_until(&self, instant: tokio::time::Instant);
}

pub struct DefaultClock;

#[async_trait]
impl Clock for DefaultClock {
    fn time(&self) -> DateTime<Utc> {
        Utc::now()
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
