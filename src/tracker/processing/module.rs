use anyhow::Result;

use crate::tracker::event::TrackerEvent;

/// Represents an event processor. Realistically this abstracts over the aggregation engine and
/// anything that wants to look at the same events, like a replay recorder.
pub trait EventProcessor {
    fn process_next(&mut self, message: TrackerEvent) -> impl std::future::Future<Output = Result<()>>;

    fn finalize(&mut self) -> impl std::future::Future<Output = Result<()>>;
}
