//! Media discovery and event delivery seams of the classifier.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{trace, warn};

use shortstop_core::ViewEvent;

use crate::aggregator::AggregatorHandle;

// ============================================================================
// Media Probe
// ============================================================================

/// Playback state of a discovered media element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaStatus {
    Playing,
    Paused,
}

/// Looks for the media element of the item at `path`.
pub trait MediaProbe: Send + Sync {
    /// Current playback state, or `None` if no element exists yet.
    fn discover(&self, path: &str) -> Option<MediaStatus>;
}

/// Probe answered from the bridge's most recent media report.
///
/// The connection records each media signal here and clears it when the
/// page navigates, so a report never outlives the item it came from.
#[derive(Debug, Clone, Default)]
pub struct ReportedMedia {
    status: Arc<Mutex<Option<MediaStatus>>>,
}

impl ReportedMedia {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn report(&self, status: MediaStatus) {
        self.with(|slot| *slot = Some(status));
    }

    pub fn clear(&self) {
        self.with(|slot| *slot = None);
    }

    fn with(&self, f: impl FnOnce(&mut Option<MediaStatus>)) {
        match self.status.lock() {
            Ok(mut slot) => f(&mut slot),
            Err(poisoned) => f(&mut poisoned.into_inner()),
        }
    }
}

impl MediaProbe for ReportedMedia {
    fn discover(&self, path: &str) -> Option<MediaStatus> {
        let status = match self.status.lock() {
            Ok(slot) => *slot,
            Err(poisoned) => *poisoned.into_inner(),
        };
        trace!(path, found = status.is_some(), "Media probe");
        status
    }
}

// ============================================================================
// Event Sink
// ============================================================================

/// Where classified events go.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn emit(&self, event: ViewEvent);
}

#[async_trait]
impl EventSink for mpsc::UnboundedSender<ViewEvent> {
    async fn emit(&self, event: ViewEvent) {
        // Receiver gone means nobody cares any more
        let _ = self.send(event);
    }
}

#[async_trait]
impl EventSink for AggregatorHandle {
    async fn emit(&self, event: ViewEvent) {
        let name = event.name();
        if let Err(e) = self.apply(event).await {
            warn!(event = name, error = %e, "Aggregator rejected view event");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reported_media_tracks_latest_report() {
        let probe = ReportedMedia::new();
        assert_eq!(probe.discover("/shorts/a"), None);

        probe.report(MediaStatus::Paused);
        probe.report(MediaStatus::Playing);
        assert_eq!(probe.discover("/shorts/a"), Some(MediaStatus::Playing));

        probe.clear();
        assert_eq!(probe.discover("/shorts/a"), None);
    }
}
