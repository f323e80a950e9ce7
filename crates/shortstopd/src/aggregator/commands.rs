//! Aggregator commands, errors, and events.
//!
//! - `AggregatorCommand`: requests sent to the actor
//! - `AggregatorError`: failures reported back through the oneshot reply
//! - `DaemonEvent`: broadcasts for subscribed clients

use thiserror::Error;
use tokio::sync::oneshot;

use shortstop_core::{
    DayKey, ExportDocument, Intervention, Settings, SettingsUpdate, TodaySummary, ViewEvent,
    WeeklySeries,
};

use crate::store::StoreError;

// ============================================================================
// Aggregator Commands
// ============================================================================

/// Commands sent to the aggregator actor.
///
/// Each command carries a oneshot sender for its reply, so callers can
/// await completion of the read-modify-write they requested.
#[derive(Debug)]
pub enum AggregatorCommand {
    /// Apply one classified viewing event.
    Apply {
        event: ViewEvent,
        respond_to: oneshot::Sender<Result<(), AggregatorError>>,
    },

    /// End the open session. Missing fields are derived from the session
    /// start the aggregator recorded.
    EndSession {
        duration: Option<u64>,
        timestamp: Option<String>,
        respond_to: oneshot::Sender<Result<(), AggregatorError>>,
    },

    /// Zero the live session counters.
    ResetCurrentSession {
        respond_to: oneshot::Sender<Result<(), AggregatorError>>,
    },

    /// Clear the badge text.
    ResetBadge { respond_to: oneshot::Sender<()> },

    /// Live session watch time in seconds.
    GetSessionTime { respond_to: oneshot::Sender<u64> },

    GetToday {
        respond_to: oneshot::Sender<TodaySummary>,
    },

    GetWeekly {
        respond_to: oneshot::Sender<WeeklySeries>,
    },

    Export {
        respond_to: oneshot::Sender<ExportDocument>,
    },

    /// Delete the last seven days of per-day entries.
    ///
    /// Replies with the number of table entries removed.
    ResetRecentStats {
        respond_to: oneshot::Sender<Result<usize, AggregatorError>>,
    },

    GetSettings {
        respond_to: oneshot::Sender<Settings>,
    },

    /// Apply a settings change; replies with the resulting settings and
    /// the reasons for any rejected fields.
    UpdateSettings {
        update: SettingsUpdate,
        respond_to: oneshot::Sender<Result<(Settings, Vec<String>), AggregatorError>>,
    },

    /// Run a synthetic count intervention through the host surfaces.
    TestNotification { respond_to: oneshot::Sender<()> },
}

// ============================================================================
// Aggregator Errors
// ============================================================================

/// Errors that can occur during aggregator operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AggregatorError {
    /// Persisting the mutation failed. In-memory state already moved on.
    #[error("store write failed: {0}")]
    Store(String),

    /// The response channel was closed before receiving a response.
    ///
    /// This typically indicates the actor was shut down.
    #[error("response channel closed")]
    ChannelClosed,
}

impl From<StoreError> for AggregatorError {
    fn from(err: StoreError) -> Self {
        Self::Store(err.to_string())
    }
}

// ============================================================================
// Daemon Events
// ============================================================================

/// Events broadcast to subscribed clients.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DaemonEvent {
    /// New badge text; `""` clears it.
    Badge { text: String },

    /// A threshold was crossed.
    InterventionRaised { intervention: Intervention },

    /// Show a notification.
    Notify { title: String, message: String },

    /// Open the extension popup.
    OpenPopup,

    /// Navigate the active tab.
    Redirect { url: String },

    /// Counters for `day` changed.
    StatsChanged { day: DayKey },
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_aggregator_error_display() {
        assert_eq!(
            AggregatorError::ChannelClosed.to_string(),
            "response channel closed"
        );

        let err: AggregatorError = StoreError::TaskFailed("cancelled".to_string()).into();
        assert_eq!(
            err.to_string(),
            "store write failed: store write task failed: cancelled"
        );

        let err: AggregatorError = StoreError::Io {
            path: PathBuf::from("/nope"),
            error: std::io::Error::new(std::io::ErrorKind::Other, "disk full"),
        }
        .into();
        assert!(err.to_string().contains("disk full"));
    }

    #[tokio::test]
    async fn test_command_channel_closed_error() {
        let (tx, rx) = oneshot::channel::<Result<(), AggregatorError>>();
        drop(tx);
        assert!(rx.await.is_err());
    }
}
