use chrono::{DateTime, FixedOffset};

use crate::engine::Observation;

use super::collection::detector::NewlyObservedPost;

/// Message passed from detection to processing.
#[derive(Debug, Clone, PartialEq)]
pub enum TrackerEvent {
    PostViewed {
        post: NewlyObservedPost,
        at: DateTime<FixedOffset>,
    },
    Scrolled {
        pixels: i64,
        at: DateTime<FixedOffset>,
    },
}

impl TrackerEvent {
    pub fn observation(&self) -> Observation {
        match self {
            TrackerEvent::PostViewed { .. } => Observation::PostViewed,
            TrackerEvent::Scrolled { pixels, .. } => Observation::ScrollDelta(*pixels),
        }
    }

    pub fn at(&self) -> DateTime<FixedOffset> {
        match self {
            TrackerEvent::PostViewed { at, .. } | TrackerEvent::Scrolled { at, .. } => *at,
        }
    }
}
