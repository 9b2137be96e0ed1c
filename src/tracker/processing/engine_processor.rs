use anyhow::Result;
use tracing::{info, warn};

use crate::{
    engine::{AggregationEngine, ViewState},
    storage::store::PersistentStore,
    tracker::event::TrackerEvent,
};

use super::module::EventProcessor;

/// Bridges [ProcessingModule](super::ProcessingModule) and [AggregationEngine]. Events are
/// applied one at a time, each persisted before the next one is taken from the queue.
pub struct EngineProcessor<S: PersistentStore> {
    engine: AggregationEngine<S>,
    was_over_threshold: bool,
}

impl<S: PersistentStore> EngineProcessor<S> {
    pub fn new(engine: AggregationEngine<S>) -> Self {
        let was_over_threshold = engine.view_state().is_over_threshold;
        Self {
            engine,
            was_over_threshold,
        }
    }

    pub fn view_state(&self) -> ViewState {
        self.engine.view_state()
    }
}

impl<S: PersistentStore> EventProcessor for EngineProcessor<S> {
    async fn process_next(&mut self, message: TrackerEvent) -> Result<()> {
        let view = self
            .engine
            .observe(message.observation(), message.at())
            .await;

        if let TrackerEvent::PostViewed { post, .. } = &message {
            info!(
                "Post #{} counted, {}/{} today",
                post.sequence, view.viewed_posts_today, view.threshold
            );
        }
        if view.is_over_threshold && !self.was_over_threshold {
            warn!("Daily limit of {} posts reached", view.threshold);
        }
        self.was_over_threshold = view.is_over_threshold;
        Ok(())
    }

    async fn finalize(&mut self) -> Result<()> {
        self.engine.flush().await;
        Ok(())
    }
}
