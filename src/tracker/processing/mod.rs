use anyhow::Result;
use module::EventProcessor;
use tokio::sync::mpsc::Receiver;
use tracing::{debug, error, info, trace};

use super::event::TrackerEvent;

pub mod engine_processor;
pub mod module;

/// Drains the detection channel. Events reach the processor one at a time and in the order they
/// were detected. A failed event is logged and skipped, the next one is still processed.
pub struct ProcessingModule<Processor> {
    receiver: Receiver<TrackerEvent>,
    processor: Processor,
}

impl<P: EventProcessor> ProcessingModule<P> {
    pub fn new(receiver: Receiver<TrackerEvent>, processor: P) -> Self {
        Self {
            receiver,
            processor,
        }
    }

    /// Runs until every sender is gone, then finalizes the processor and hands it back.
    pub async fn run(mut self) -> Result<P> {
        let mut posts = 0usize;
        let mut failed = 0usize;
        while let Some(event) = self.receiver.recv().await {
            trace!("Processing event {:?}", event);
            let at = event.at();
            let is_post = matches!(event, TrackerEvent::PostViewed { .. });
            match self.processor.process_next(event).await {
                Ok(_) if is_post => posts += 1,
                Ok(_) => debug!("Processed scroll at {at}"),
                Err(e) => {
                    failed += 1;
                    error!("Error processing event at {at}: {e:?}")
                }
            }
        }

        self.receiver.close();
        info!("Detection closed after {posts} posts, {failed} events failed");
        self.processor.finalize().await?;
        Ok(self.processor)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use anyhow::{anyhow, Result};
    use chrono::{FixedOffset, TimeZone};
    use tokio::sync::mpsc;

    use super::{engine_processor::EngineProcessor, module::EventProcessor, ProcessingModule};
    use crate::{
        engine::AggregationEngine,
        storage::{entities::UsageState, memory_store::MemoryStore},
        tracker::{
            collection::detector::{NewlyObservedPost, PostKey},
            event::TrackerEvent,
        },
    };

    fn post_event(sequence: u64) -> TrackerEvent {
        TrackerEvent::PostViewed {
            post: NewlyObservedPost {
                key: PostKey::Permalink(format!("/status/{sequence}").into()),
                sequence,
            },
            at: FixedOffset::east_opt(0)
                .unwrap()
                .with_ymd_and_hms(2024, 1, 3, 12, 0, 0)
                .unwrap(),
        }
    }

    #[derive(Default)]
    struct FlakyProcessor {
        processed: Vec<TrackerEvent>,
        finalized: bool,
    }

    impl EventProcessor for FlakyProcessor {
        async fn process_next(&mut self, message: TrackerEvent) -> Result<()> {
            if let TrackerEvent::PostViewed { post, .. } = &message {
                if post.sequence == 2 {
                    return Err(anyhow!("flaky"));
                }
            }
            self.processed.push(message);
            Ok(())
        }

        async fn finalize(&mut self) -> Result<()> {
            self.finalized = true;
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_errors_do_not_stop_processing() -> Result<()> {
        let (sender, receiver) = mpsc::channel(8);
        for sequence in 1..=3 {
            sender.send(post_event(sequence)).await?;
        }
        drop(sender);

        let processor = ProcessingModule::new(receiver, FlakyProcessor::default())
            .run()
            .await?;

        assert_eq!(processor.processed.len(), 2);
        assert!(processor.finalized);
        Ok(())
    }

    #[tokio::test]
    async fn test_engine_processor_counts_and_flushes() -> Result<()> {
        let store = Arc::new(MemoryStore::new());
        let now = FixedOffset::east_opt(0)
            .unwrap()
            .with_ymd_and_hms(2024, 1, 3, 11, 0, 0)
            .unwrap();
        let engine = AggregationEngine::initialize(store.clone(), now).await;

        let (sender, receiver) = mpsc::channel(8);
        sender.send(post_event(1)).await?;
        sender
            .send(TrackerEvent::Scrolled { pixels: -250, at: now })
            .await?;
        sender.send(post_event(2)).await?;
        drop(sender);

        let processor = ProcessingModule::new(receiver, EngineProcessor::new(engine))
            .run()
            .await?;

        assert_eq!(processor.view_state().viewed_posts_today, 2);
        let stored = UsageState::load(&store).await?;
        assert_eq!(stored.counters.viewed_posts_today, 2);
        // Below the persist step, only written by the final flush.
        assert_eq!(stored.counters.pixels_scrolled_today, 250);
        Ok(())
    }
}
