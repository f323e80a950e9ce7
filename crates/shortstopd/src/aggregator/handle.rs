//! Client interface for interacting with the AggregatorActor.
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Channel errors are mapped to `AggregatorError::ChannelClosed`

use tokio::sync::{broadcast, mpsc, oneshot};

use shortstop_core::{
    ExportDocument, Settings, SettingsUpdate, TodaySummary, ViewEvent, WeeklySeries,
};

use super::commands::{AggregatorCommand, AggregatorError, DaemonEvent};

/// Handle for interacting with the aggregator actor.
///
/// Cheap to clone; every connection and classifier holds one.
#[derive(Clone)]
pub struct AggregatorHandle {
    sender: mpsc::Sender<AggregatorCommand>,
    event_sender: broadcast::Sender<DaemonEvent>,
}

impl AggregatorHandle {
    pub fn new(
        sender: mpsc::Sender<AggregatorCommand>,
        event_sender: broadcast::Sender<DaemonEvent>,
    ) -> Self {
        Self {
            sender,
            event_sender,
        }
    }

    /// Sends a command built around a fresh oneshot and awaits the reply.
    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> AggregatorCommand,
    ) -> Result<T, AggregatorError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(build(tx))
            .await
            .map_err(|_| AggregatorError::ChannelClosed)?;
        rx.await.map_err(|_| AggregatorError::ChannelClosed)
    }

    /// Applies one classified viewing event.
    ///
    /// # Errors
    ///
    /// - `AggregatorError::Store` if the mutation could not be persisted
    /// - `AggregatorError::ChannelClosed` if the actor has shut down
    pub async fn apply(&self, event: ViewEvent) -> Result<(), AggregatorError> {
        self.request(|respond_to| AggregatorCommand::Apply { event, respond_to })
            .await?
    }

    /// Ends the open session, deriving missing fields from its start.
    pub async fn end_session(
        &self,
        duration: Option<u64>,
        timestamp: Option<String>,
    ) -> Result<(), AggregatorError> {
        self.request(|respond_to| AggregatorCommand::EndSession {
            duration,
            timestamp,
            respond_to,
        })
        .await?
    }

    pub async fn reset_current_session(&self) -> Result<(), AggregatorError> {
        self.request(|respond_to| AggregatorCommand::ResetCurrentSession { respond_to })
            .await?
    }

    pub async fn reset_badge(&self) -> Result<(), AggregatorError> {
        self.request(|respond_to| AggregatorCommand::ResetBadge { respond_to })
            .await
    }

    /// Live session watch time in seconds.
    pub async fn session_time(&self) -> Result<u64, AggregatorError> {
        self.request(|respond_to| AggregatorCommand::GetSessionTime { respond_to })
            .await
    }

    pub async fn today(&self) -> Result<TodaySummary, AggregatorError> {
        self.request(|respond_to| AggregatorCommand::GetToday { respond_to })
            .await
    }

    pub async fn weekly(&self) -> Result<WeeklySeries, AggregatorError> {
        self.request(|respond_to| AggregatorCommand::GetWeekly { respond_to })
            .await
    }

    pub async fn export(&self) -> Result<ExportDocument, AggregatorError> {
        self.request(|respond_to| AggregatorCommand::Export { respond_to })
            .await
    }

    /// Deletes the last seven days of statistics; returns entries removed.
    pub async fn reset_recent_stats(&self) -> Result<usize, AggregatorError> {
        self.request(|respond_to| AggregatorCommand::ResetRecentStats { respond_to })
            .await?
    }

    pub async fn settings(&self) -> Result<Settings, AggregatorError> {
        self.request(|respond_to| AggregatorCommand::GetSettings { respond_to })
            .await
    }

    /// Applies `update`; returns the resulting settings and the reasons
    /// any fields were rejected.
    pub async fn update_settings(
        &self,
        update: SettingsUpdate,
    ) -> Result<(Settings, Vec<String>), AggregatorError> {
        self.request(|respond_to| AggregatorCommand::UpdateSettings { update, respond_to })
            .await?
    }

    pub async fn test_notification(&self) -> Result<(), AggregatorError> {
        self.request(|respond_to| AggregatorCommand::TestNotification { respond_to })
            .await
    }

    /// Subscribe to daemon events.
    pub fn subscribe(&self) -> broadcast::Receiver<DaemonEvent> {
        self.event_sender.subscribe()
    }

    /// Returns true if the actor has shut down.
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}
