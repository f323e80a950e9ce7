//! Connection handler for individual client connections.
//!
//! Each client connection gets its own `ConnectionHandler` that:
//! - Performs protocol version negotiation
//! - Parses incoming messages
//! - Routes extension messages and queries to the aggregator
//! - Feeds raw page signals to a classifier owned by the connection
//!
//! A bridge connection stands for one page. Its classifier is spawned on
//! the first `PAGE_SIGNAL` and finalized when the page unloads or the
//! connection drops, which closes any open viewing session.
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Connection errors are logged and result in graceful disconnect

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, BufWriter};
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::{Mutex, RwLock};
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use shortstop_core::{Clock, ViewEvent};
use shortstop_protocol::{ClientMessage, DaemonMessage, MessageType, PageSignal, ProtocolVersion};

use crate::aggregator::{AggregatorError, AggregatorHandle};
use crate::classifier::{spawn_classifier, ClassifierHandle, MediaStatus, ReportedMedia};
use crate::config::ClassifierConfig;

/// Type alias for subscriber writer handle
pub type SubscriberWriter = Arc<Mutex<BufWriter<OwnedWriteHalf>>>;

/// A client receiving daemon broadcasts
pub struct Subscriber {
    pub writer: SubscriberWriter,
}

/// Type alias for the subscribers map
pub type SubscribersMap = Arc<RwLock<HashMap<String, Subscriber>>>;

/// Maximum number of concurrent subscribers
pub(crate) const MAX_SUBSCRIBERS: usize = 16;

/// Maximum message size (1 MB)
const MAX_MESSAGE_SIZE: usize = 1_048_576;

/// Read timeout for idle connections (30 minutes; a page can sit idle)
const READ_TIMEOUT: Duration = Duration::from_secs(1800);

/// Write timeout (10 seconds)
const WRITE_TIMEOUT: Duration = Duration::from_secs(10);

type ClientId = String;

/// Per-page classification context shared by all connections.
#[derive(Clone)]
pub struct PageContext {
    pub classifier: ClassifierConfig,
    pub clock: Arc<dyn Clock>,
}

/// Connection handler for a single client.
pub struct ConnectionHandler {
    reader: BufReader<OwnedReadHalf>,

    /// Shared with the broadcaster once subscribed
    writer: SubscriberWriter,

    aggregator: AggregatorHandle,
    subscribers: SubscribersMap,
    page: PageContext,

    client_id: Option<ClientId>,
    subscribed: bool,
    connection_number: u64,

    /// Classifier for this page, spawned on the first page signal
    classifier: Option<ClassifierHandle>,
    media: ReportedMedia,
    last_path: Option<String>,
}

impl ConnectionHandler {
    pub fn new(
        reader: OwnedReadHalf,
        writer: OwnedWriteHalf,
        aggregator: AggregatorHandle,
        subscribers: SubscribersMap,
        page: PageContext,
        connection_number: u64,
    ) -> Self {
        Self {
            reader: BufReader::new(reader),
            writer: Arc::new(Mutex::new(BufWriter::new(writer))),
            aggregator,
            subscribers,
            page,
            client_id: None,
            subscribed: false,
            connection_number,
            classifier: None,
            media: ReportedMedia::new(),
            last_path: None,
        }
    }

    /// Runs the connection handler.
    ///
    /// Performs the handshake, then processes messages until the
    /// connection closes. Returns the client ID for subscriber cleanup.
    pub async fn run(mut self) -> Option<ClientId> {
        debug!(connection = self.connection_number, "New client connected");

        match self.handle_handshake().await {
            Ok(()) => {
                info!(client_id = ?self.client_id, "Client handshake completed");
            }
            Err(e) => {
                warn!(
                    connection = self.connection_number,
                    error = %e,
                    "Handshake failed"
                );
                return None;
            }
        }

        let client_id = self.client_id.clone();

        if let Err(e) = self.process_messages().await {
            debug!(client_id = ?self.client_id, error = %e, "Connection closed");
        }

        self.close_page().await;
        info!(client_id = ?self.client_id, "Client disconnected");
        client_id
    }

    /// Expects `CONNECT`, checks the protocol version, answers
    /// `CONNECTED` or `REJECTED`.
    async fn handle_handshake(&mut self) -> Result<(), ConnectionError> {
        let msg = self.read_message().await?;

        let client_version = msg.protocol_version;
        if !client_version.is_compatible_with(&ProtocolVersion::CURRENT) {
            warn!(
                client_version = %client_version,
                server_version = %ProtocolVersion::CURRENT,
                "Protocol version mismatch"
            );

            self.send_message(DaemonMessage::rejected(&format!(
                "Protocol version {} not compatible with server version {}",
                client_version,
                ProtocolVersion::CURRENT
            )))
            .await?;

            return Err(ConnectionError::VersionMismatch {
                client: client_version,
                server: ProtocolVersion::CURRENT,
            });
        }

        match msg.message {
            MessageType::Connect { client_id } => {
                let assigned_id =
                    client_id.unwrap_or_else(|| format!("client-{}", self.connection_number));
                self.client_id = Some(assigned_id.clone());
                self.send_message(DaemonMessage::connected(assigned_id))
                    .await?;
                Ok(())
            }
            other => {
                self.send_message(DaemonMessage::error("Expected CONNECT message for handshake"))
                    .await?;
                Err(ConnectionError::UnexpectedMessage(other.name().to_string()))
            }
        }
    }

    async fn process_messages(&mut self) -> Result<(), ConnectionError> {
        loop {
            let msg = match timeout(READ_TIMEOUT, self.read_message()).await {
                Ok(Ok(msg)) => msg,
                Ok(Err(ConnectionError::Eof)) => {
                    debug!(client_id = ?self.client_id, "Client sent EOF");
                    return Ok(());
                }
                Ok(Err(ConnectionError::ParseError(reason))) => {
                    // A bad line does not poison the stream
                    warn!(client_id = ?self.client_id, error = %reason, "Unparseable message");
                    let _ = self
                        .send_message(DaemonMessage::error_with_code(&reason, "parse_error"))
                        .await;
                    continue;
                }
                Ok(Err(e)) => return Err(e),
                Err(_) => {
                    debug!(client_id = ?self.client_id, "Connection timed out");
                    return Err(ConnectionError::Timeout);
                }
            };

            match self.handle_message(msg).await {
                Ok(()) => {}
                Err(ConnectionError::Eof) => return Ok(()),
                Err(e) => {
                    error!(client_id = ?self.client_id, error = %e, "Error handling message");
                    let _ = self
                        .send_message(DaemonMessage::error(&e.to_string()))
                        .await;
                }
            }
        }
    }

    /// Handles a single client message.
    async fn handle_message(&mut self, msg: ClientMessage) -> Result<(), ConnectionError> {
        let agg = self.aggregator.clone();
        let reply = match msg.message {
            MessageType::Connect { .. } => DaemonMessage::error("Already connected"),

            // Extension messages
            MessageType::ShortsViewed { url } => {
                agg.apply(ViewEvent::ViewConfirmed { url }).await?;
                DaemonMessage::Ack
            }
            MessageType::ShortsSkipped { url } => {
                agg.apply(ViewEvent::ViewSkipped { url }).await?;
                DaemonMessage::Ack
            }
            MessageType::StartShortsSession => {
                agg.apply(ViewEvent::SessionStarted).await?;
                DaemonMessage::Ack
            }
            MessageType::EndSession {
                duration,
                timestamp,
            } => {
                agg.end_session(duration, timestamp).await?;
                DaemonMessage::Ack
            }
            MessageType::UpdateWatchTime { seconds } => {
                agg.apply(ViewEvent::WatchTimeTick { seconds }).await?;
                DaemonMessage::Ack
            }
            MessageType::ResetBadge => {
                agg.reset_badge().await?;
                DaemonMessage::Ack
            }
            MessageType::GetSessionTime => DaemonMessage::SessionTime {
                session_time: agg.session_time().await?,
            },
            MessageType::TestNotification => {
                agg.test_notification().await?;
                DaemonMessage::Ack
            }

            // Raw page observation; no reply, signals are high-rate
            MessageType::PageSignal { signal } => {
                self.handle_page_signal(signal).await;
                return Ok(());
            }

            MessageType::ResetCurrentSession => {
                agg.reset_current_session().await?;
                DaemonMessage::Ack
            }

            MessageType::Subscribe => return self.handle_subscribe().await,
            MessageType::Unsubscribe => {
                if let Some(ref client_id) = self.client_id {
                    self.subscribers.write().await.remove(client_id);
                }
                self.subscribed = false;
                debug!(client_id = ?self.client_id, "Client unsubscribed from updates");
                DaemonMessage::Ack
            }

            // Queries and maintenance
            MessageType::GetToday => DaemonMessage::Today {
                summary: agg.today().await?,
            },
            MessageType::GetWeekly => DaemonMessage::Weekly {
                series: agg.weekly().await?,
            },
            MessageType::ExportStats => DaemonMessage::Export {
                document: agg.export().await?,
            },
            MessageType::ResetRecentStats => DaemonMessage::Reset {
                removed: agg.reset_recent_stats().await?,
            },
            MessageType::GetSettings => DaemonMessage::Settings {
                settings: agg.settings().await?,
                rejected: Vec::new(),
            },
            MessageType::UpdateSettings { update } => {
                let (settings, rejected) = agg.update_settings(update).await?;
                DaemonMessage::Settings { settings, rejected }
            }

            MessageType::Ping { seq } => DaemonMessage::Pong { seq },
            MessageType::Disconnect => {
                debug!(client_id = ?self.client_id, "Client requested disconnect");
                return Err(ConnectionError::Eof);
            }
        };

        self.send_message(reply).await
    }

    async fn handle_subscribe(&mut self) -> Result<(), ConnectionError> {
        let Some(client_id) = self.client_id.clone() else {
            return self
                .send_message(DaemonMessage::error("Must connect before subscribing"))
                .await;
        };

        {
            let mut subs = self.subscribers.write().await;
            if subs.len() >= MAX_SUBSCRIBERS && !subs.contains_key(&client_id) {
                drop(subs);
                return self
                    .send_message(DaemonMessage::error(&format!(
                        "Too many subscribers (max: {MAX_SUBSCRIBERS})"
                    )))
                    .await;
            }
            subs.insert(
                client_id.clone(),
                Subscriber {
                    writer: Arc::clone(&self.writer),
                },
            );
        }

        self.subscribed = true;
        debug!(client_id = %client_id, "Client subscribed to updates");

        // Current numbers as initial state
        let summary = self.aggregator.today().await?;
        self.send_message(DaemonMessage::Today { summary }).await
    }

    async fn handle_page_signal(&mut self, signal: PageSignal) {
        match &signal {
            PageSignal::MediaAttached { playing } => self.media.report(if *playing {
                MediaStatus::Playing
            } else {
                MediaStatus::Paused
            }),
            PageSignal::MediaPlay => self.media.report(MediaStatus::Playing),
            PageSignal::MediaPause => self.media.report(MediaStatus::Paused),
            _ => {
                if let Some(path) = signal.observed_path() {
                    if self.last_path.as_deref() != Some(path) {
                        self.last_path = Some(path.to_string());
                        self.media.clear();
                    }
                }
            }
        }

        if matches!(signal, PageSignal::Unload) {
            if let Some(classifier) = self.classifier.take() {
                classifier.signal(signal);
                classifier.shutdown().await;
            }
            self.last_path = None;
            self.media.clear();
            return;
        }

        let classifier = self.classifier.get_or_insert_with(|| {
            debug!(client_id = ?self.client_id, "Starting page classifier");
            spawn_classifier(
                self.page.classifier,
                Arc::new(self.media.clone()),
                Arc::new(self.aggregator.clone()),
                Arc::clone(&self.page.clock),
            )
        });
        if !classifier.signal(signal) {
            warn!(client_id = ?self.client_id, "Page classifier stopped, dropping signal");
            self.classifier = None;
        }
    }

    /// Finalizes the page's classifier, closing any open session.
    async fn close_page(&mut self) {
        if let Some(classifier) = self.classifier.take() {
            classifier.shutdown().await;
        }
    }

    async fn read_message(&mut self) -> Result<ClientMessage, ConnectionError> {
        let mut line = String::new();

        let bytes_read = self
            .reader
            .read_line(&mut line)
            .await
            .map_err(|e| ConnectionError::Io(e.to_string()))?;

        if bytes_read == 0 {
            return Err(ConnectionError::Eof);
        }

        if line.len() > MAX_MESSAGE_SIZE {
            return Err(ConnectionError::MessageTooLarge {
                size: line.len(),
                max: MAX_MESSAGE_SIZE,
            });
        }

        let msg: ClientMessage = serde_json::from_str(&line)
            .map_err(|e| ConnectionError::ParseError(e.to_string()))?;

        debug!(
            client_id = ?self.client_id,
            message_type = msg.message.name(),
            "Received message"
        );

        Ok(msg)
    }

    async fn send_message(&self, msg: DaemonMessage) -> Result<(), ConnectionError> {
        write_line(&self.writer, &msg).await
    }

    pub fn is_subscribed(&self) -> bool {
        self.subscribed
    }

    pub fn client_id(&self) -> Option<&str> {
        self.client_id.as_deref()
    }
}

/// Writes one NDJSON line with the write timeout applied.
pub(crate) async fn write_line(
    writer: &SubscriberWriter,
    msg: &DaemonMessage,
) -> Result<(), ConnectionError> {
    let json =
        serde_json::to_string(msg).map_err(|e| ConnectionError::ParseError(e.to_string()))?;

    let mut writer = writer.lock().await;

    match timeout(WRITE_TIMEOUT, async {
        writer.write_all(json.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        writer.flush().await?;
        Ok::<(), std::io::Error>(())
    })
    .await
    {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(ConnectionError::Io(e.to_string())),
        Err(_) => Err(ConnectionError::WriteTimeout),
    }
}

/// Errors that can occur during connection handling.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("Protocol version mismatch: client {client}, server {server}")]
    VersionMismatch {
        client: ProtocolVersion,
        server: ProtocolVersion,
    },

    #[error("Unexpected message: {0}")]
    UnexpectedMessage(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("Connection closed")]
    Eof,

    #[error("Read timeout")]
    Timeout,

    #[error("Write timeout")]
    WriteTimeout,

    #[error("Message too large: {size} bytes (max: {max})")]
    MessageTooLarge { size: usize, max: usize },

    #[error("Aggregator error: {0}")]
    Aggregator(#[from] AggregatorError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_error_display() {
        let err = ConnectionError::VersionMismatch {
            client: ProtocolVersion::new(2, 0),
            server: ProtocolVersion::new(1, 1),
        };
        assert!(err.to_string().contains("2.0"));
        assert!(err.to_string().contains("1.1"));

        let err: ConnectionError = AggregatorError::ChannelClosed.into();
        assert_eq!(err.to_string(), "Aggregator error: response channel closed");
    }

    #[test]
    fn test_message_size_error() {
        let err = ConnectionError::MessageTooLarge {
            size: 2_000_000,
            max: MAX_MESSAGE_SIZE,
        };
        assert!(err.to_string().contains("2000000"));
    }
}
