use std::{collections::HashMap, sync::Arc};

use tracing::{debug, warn};

use super::page::{FeedSnapshot, PostElement};

/// Posts this close to the viewport already count as viewed, they are about to scroll in.
pub const LOOK_AHEAD_MARGIN_PX: f64 = 1000.;

/// Length of the content prefix used to identify posts without a permalink.
pub const FINGERPRINT_CHARS: usize = 100;

/// Identity of a post across re-renders.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PostKey {
    Permalink(Arc<str>),
    /// Fallback for posts without a permalink. Different posts that start the same way collide.
    Fingerprint(Arc<str>),
}

impl PostKey {
    pub fn of(post: &PostElement) -> Self {
        match post.permalink.as_deref().map(str::trim) {
            Some(link) if !link.is_empty() => PostKey::Permalink(link.into()),
            _ => {
                let prefix = post.content.chars().take(FINGERPRINT_CHARS).collect::<String>();
                PostKey::Fingerprint(prefix.into())
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewlyObservedPost {
    pub key: PostKey,
    /// 1-based position in detection order.
    pub sequence: u64,
}

/// Remembers every post counted during its lifetime and numbers them in the order they were
/// first seen. Feeds remove and re-add nodes for the same post all the time, so nothing is ever
/// forgotten.
pub struct PostDetector {
    sequences: HashMap<PostKey, u64>,
    last_sequence: u64,
    look_ahead: f64,
}

impl Default for PostDetector {
    fn default() -> Self {
        Self::new(LOOK_AHEAD_MARGIN_PX)
    }
}

impl PostDetector {
    pub fn new(look_ahead: f64) -> Self {
        Self {
            sequences: HashMap::new(),
            last_sequence: 0,
            look_ahead,
        }
    }

    /// Returns posts of `snapshot` that are counted for the first time, in document order.
    pub fn detect_new_posts(&mut self, snapshot: &FeedSnapshot) -> Vec<NewlyObservedPost> {
        let mut observed = vec![];
        for post in &snapshot.posts {
            if !self.is_in_view(post, snapshot.viewport_height) {
                continue;
            }
            let key = PostKey::of(post);
            if self.sequences.contains_key(&key) {
                continue;
            }
            if matches!(key, PostKey::Fingerprint(_)) {
                warn!("Post without a permalink, falling back to its content");
            }

            self.last_sequence += 1;
            self.sequences.insert(key.clone(), self.last_sequence);
            observed.push(NewlyObservedPost {
                key,
                sequence: self.last_sequence,
            });
        }
        if !observed.is_empty() {
            debug!("Detected {} new posts", observed.len());
        }
        observed
    }

    /// Number a post received when it was counted, if it was.
    pub fn sequence_of(&self, key: &PostKey) -> Option<u64> {
        self.sequences.get(key).copied()
    }

    pub fn counted(&self) -> usize {
        self.sequences.len()
    }

    fn is_in_view(&self, post: &PostElement, viewport_height: f64) -> bool {
        post.top < viewport_height + self.look_ahead && post.bottom > -self.look_ahead
    }
}
