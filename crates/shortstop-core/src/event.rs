//! Classified viewing events.

use serde::{Deserialize, Serialize};

/// A discrete, de-duplicated viewing event produced by a page observer.
///
/// Item events carry the item's path. Session and tick events carry the
/// payload the aggregator needs to record them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ViewEvent {
    /// An item appeared; its dwell timer is running.
    ViewStarted { url: String },
    /// The item stayed on screen for the full dwell threshold.
    ViewConfirmed { url: String },
    /// The user moved on before the dwell threshold.
    ViewSkipped { url: String },
    /// The item left the screen.
    ViewEnded { url: String },
    /// The user entered the feed.
    SessionStarted,
    /// The user left the feed.
    SessionEnded {
        /// Session length in seconds
        duration: u64,
        /// Wall-clock start, `HH:MM`
        timestamp: String,
    },
    /// Media played for `seconds` more.
    WatchTimeTick { seconds: u64 },
}

impl ViewEvent {
    /// Short name for log fields.
    pub fn name(&self) -> &'static str {
        match self {
            Self::ViewStarted { .. } => "view_started",
            Self::ViewConfirmed { .. } => "view_confirmed",
            Self::ViewSkipped { .. } => "view_skipped",
            Self::ViewEnded { .. } => "view_ended",
            Self::SessionStarted => "session_started",
            Self::SessionEnded { .. } => "session_ended",
            Self::WatchTimeTick { .. } => "watch_time_tick",
        }
    }

    /// The item path, for item events.
    pub fn url(&self) -> Option<&str> {
        match self {
            Self::ViewStarted { url }
            | Self::ViewConfirmed { url }
            | Self::ViewSkipped { url }
            | Self::ViewEnded { url } => Some(url),
            Self::SessionStarted | Self::SessionEnded { .. } | Self::WatchTimeTick { .. } => None,
        }
    }
}
