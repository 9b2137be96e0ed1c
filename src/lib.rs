//! Counts feed posts as they scroll into view and keeps daily, hourly and per-minute statistics.
//! The tracker runs next to the page and owns all writes of usage data, the cli reads the same
//! store to show statistics and change settings.
//!

pub mod cli;
pub mod engine;
pub mod storage;
pub mod tracker;
pub mod utils;
pub mod view;
