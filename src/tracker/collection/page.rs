//! What the tracker knows about the page. The page side (a content script or anything else that
//! can see the feed) reports layout snapshots, one json object per line.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio_stream::{wrappers::LinesStream, StreamExt};
use tracing::{trace, warn};

/// A feed post as laid out on the page. Positions are relative to the top of the viewport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct PostElement {
    /// Link to the post itself, the only stable identity a post has.
    #[serde(default)]
    pub permalink: Option<String>,
    #[serde(default)]
    pub content: String,
    pub top: f64,
    pub bottom: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct FeedSnapshot {
    pub scroll_y: f64,
    pub viewport_height: f64,
    /// Posts in document order.
    #[serde(default)]
    pub posts: Vec<PostElement>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum PageEvent {
    /// The feed's DOM changed.
    Mutation(FeedSnapshot),
    Scroll(FeedSnapshot),
}

impl PageEvent {
    pub fn snapshot(&self) -> &FeedSnapshot {
        match self {
            PageEvent::Mutation(snapshot) | PageEvent::Scroll(snapshot) => snapshot,
        }
    }

    pub fn into_snapshot(self) -> FeedSnapshot {
        match self {
            PageEvent::Mutation(snapshot) | PageEvent::Scroll(snapshot) => snapshot,
        }
    }
}

/// Intended to serve as a contract for anything that can report the state of a feed page.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PageSource: Send {
    /// Waits for the next page event. `None` means the page is gone. Implementations must be
    /// cancel safe, an event must not be lost if the future is dropped before completion.
    async fn next_event(&mut self) -> Result<Option<PageEvent>>;
}

/// Reads page events as newline delimited json.
pub struct JsonLinesSource<R> {
    lines: LinesStream<R>,
}

impl<R: AsyncBufRead + Unpin + Send> JsonLinesSource<R> {
    pub fn new(reader: R) -> Self {
        Self {
            lines: LinesStream::new(reader.lines()),
        }
    }
}

#[async_trait]
impl<R: AsyncBufRead + Unpin + Send> PageSource for JsonLinesSource<R> {
    async fn next_event(&mut self) -> Result<Option<PageEvent>> {
        while let Some(line) = self.lines.next().await {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<PageEvent>(&line) {
                Ok(event) => {
                    trace!("Received page event {event:?}");
                    return Ok(Some(event));
                }
                Err(e) => {
                    // A page that sends garbage once might still send something useful later.
                    warn!("Skipping malformed page event {line}: {e}")
                }
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use anyhow::Result;

    use super::{JsonLinesSource, PageEvent, PageSource};

    #[tokio::test]
    async fn test_json_lines_source_skips_garbage() -> Result<()> {
        let input: &[u8] = b"{\"type\":\"mutation\",\"scrollY\":0,\"viewportHeight\":800,\"posts\":[{\"permalink\":\"/a/status/1\",\"top\":10,\"bottom\":200}]}\n\
              \n\
              not json\n\
              {\"type\":\"scroll\",\"scrollY\":350.5,\"viewportHeight\":800}\n";
        let mut source = JsonLinesSource::new(input);

        let first = source.next_event().await?.unwrap();
        assert!(matches!(first, PageEvent::Mutation(_)));
        assert_eq!(first.snapshot().posts.len(), 1);
        assert_eq!(
            first.snapshot().posts[0].permalink.as_deref(),
            Some("/a/status/1")
        );

        let second = source.next_event().await?.unwrap();
        assert!(matches!(second, PageEvent::Scroll(_)));
        assert_eq!(second.snapshot().scroll_y, 350.5);
        assert!(second.snapshot().posts.is_empty());

        assert!(source.next_event().await?.is_none());
        Ok(())
    }
}
