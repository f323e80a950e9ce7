//! Protocol message types for daemon communication.
//!
//! Messages travel as newline-delimited JSON. Every client message is an
//! envelope carrying the protocol version plus a `type`-tagged payload.
//! The extension's own message names (`SHORTS_VIEWED`, `END_SESSION`, ...)
//! are kept verbatim so a bridge can forward them unchanged.

use serde::{Deserialize, Serialize};

use shortstop_core::{
    DayKey, ExportDocument, Intervention, Settings, SettingsUpdate, TodaySummary, WeeklySeries,
};

use crate::signal::PageSignal;
use crate::version::ProtocolVersion;

/// Message types that can be sent by clients to the daemon.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageType {
    /// Client handshake
    Connect {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        client_id: Option<String>,
    },

    /// A short-form item was watched past the dwell threshold
    ShortsViewed { url: String },

    /// A short-form item was left before the dwell threshold
    ShortsSkipped { url: String },

    /// The user entered the feed
    StartShortsSession,

    /// The user left the feed
    EndSession {
        /// Session length in seconds; computed by the daemon when absent
        #[serde(default, skip_serializing_if = "Option::is_none")]
        duration: Option<u64>,
        /// Wall-clock start (`HH:MM`); computed by the daemon when absent
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp: Option<String>,
    },

    /// Media played for `seconds` more
    UpdateWatchTime { seconds: u64 },

    /// Clear the badge text
    ResetBadge,

    /// Request the live session watch time (answered with `SESSION_TIME`)
    GetSessionTime,

    /// Fire a synthetic intervention through the host surfaces
    TestNotification,

    /// Raw page observation, classified by the daemon
    PageSignal { signal: PageSignal },

    /// Zero the live session counters
    ResetCurrentSession,

    /// Subscribe to badge, intervention and stats broadcasts
    Subscribe,

    /// Stop receiving broadcasts
    Unsubscribe,

    /// Request today's summary
    GetToday,

    /// Request the seven-day chart series
    GetWeekly,

    /// Request a full export document
    ExportStats,

    /// Delete the last seven days of statistics
    ResetRecentStats,

    /// Request current settings
    GetSettings,

    /// Change settings
    UpdateSettings { update: SettingsUpdate },

    /// Ping to check connection
    Ping { seq: u64 },

    /// Client disconnecting gracefully
    Disconnect,
}

impl MessageType {
    /// Wire name of the message, for log fields.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Connect { .. } => "CONNECT",
            Self::ShortsViewed { .. } => "SHORTS_VIEWED",
            Self::ShortsSkipped { .. } => "SHORTS_SKIPPED",
            Self::StartShortsSession => "START_SHORTS_SESSION",
            Self::EndSession { .. } => "END_SESSION",
            Self::UpdateWatchTime { .. } => "UPDATE_WATCH_TIME",
            Self::ResetBadge => "RESET_BADGE",
            Self::GetSessionTime => "GET_SESSION_TIME",
            Self::TestNotification => "TEST_NOTIFICATION",
            Self::PageSignal { .. } => "PAGE_SIGNAL",
            Self::ResetCurrentSession => "RESET_CURRENT_SESSION",
            Self::Subscribe => "SUBSCRIBE",
            Self::Unsubscribe => "UNSUBSCRIBE",
            Self::GetToday => "GET_TODAY",
            Self::GetWeekly => "GET_WEEKLY",
            Self::ExportStats => "EXPORT_STATS",
            Self::ResetRecentStats => "RESET_RECENT_STATS",
            Self::GetSettings => "GET_SETTINGS",
            Self::UpdateSettings { .. } => "UPDATE_SETTINGS",
            Self::Ping { .. } => "PING",
            Self::Disconnect => "DISCONNECT",
        }
    }
}

/// Messages sent from client to daemon.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientMessage {
    /// Protocol version; assumed current when a bridge omits it
    #[serde(default)]
    pub protocol_version: ProtocolVersion,

    /// Message payload
    #[serde(flatten)]
    pub message: MessageType,
}

impl ClientMessage {
    /// Creates a new client message with current protocol version.
    pub fn new(message: MessageType) -> Self {
        Self {
            protocol_version: ProtocolVersion::CURRENT,
            message,
        }
    }

    pub fn connect(client_id: Option<String>) -> Self {
        Self::new(MessageType::Connect { client_id })
    }

    pub fn shorts_viewed(url: impl Into<String>) -> Self {
        Self::new(MessageType::ShortsViewed { url: url.into() })
    }

    pub fn shorts_skipped(url: impl Into<String>) -> Self {
        Self::new(MessageType::ShortsSkipped { url: url.into() })
    }

    pub fn page_signal(signal: PageSignal) -> Self {
        Self::new(MessageType::PageSignal { signal })
    }

    pub fn ping(seq: u64) -> Self {
        Self::new(MessageType::Ping { seq })
    }

    pub fn disconnect() -> Self {
        Self::new(MessageType::Disconnect)
    }
}

/// Messages sent from daemon to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DaemonMessage {
    /// Connection accepted
    Connected {
        protocol_version: ProtocolVersion,
        client_id: String,
    },

    /// Connection rejected (version mismatch)
    Rejected {
        reason: String,
        protocol_version: ProtocolVersion,
    },

    /// A fire-and-forget message was processed
    Ack,

    /// Response to `GET_SESSION_TIME`
    SessionTime {
        #[serde(rename = "sessionTime")]
        session_time: u64,
    },

    /// Response to `GET_TODAY`
    Today { summary: TodaySummary },

    /// Response to `GET_WEEKLY`
    Weekly { series: WeeklySeries },

    /// Response to `EXPORT_STATS`
    Export { document: ExportDocument },

    /// Response to `RESET_RECENT_STATS`
    Reset {
        /// Per-day table entries deleted
        removed: usize,
    },

    /// Response to `GET_SETTINGS` and `UPDATE_SETTINGS`
    Settings {
        settings: Settings,
        /// Reasons for fields that were not applied
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        rejected: Vec<String>,
    },

    /// Broadcast: new badge text (`""` clears it)
    Badge { text: String },

    /// Broadcast: a threshold was crossed
    Intervention { intervention: Intervention },

    /// Broadcast: counters for `day` changed
    StatsChanged { day: DayKey },

    /// Broadcast: show a system notification
    Notify { title: String, message: String },

    /// Broadcast: open the extension popup
    OpenPopup,

    /// Broadcast: navigate the active tab to `url`
    Redirect { url: String },

    /// Pong response to ping
    Pong { seq: u64 },

    /// Error response
    Error {
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        code: Option<String>,
    },
}

impl DaemonMessage {
    pub fn connected(client_id: String) -> Self {
        Self::Connected {
            protocol_version: ProtocolVersion::CURRENT,
            client_id,
        }
    }

    pub fn rejected(reason: &str) -> Self {
        Self::Rejected {
            reason: reason.to_string(),
            protocol_version: ProtocolVersion::CURRENT,
        }
    }

    pub fn error(message: &str) -> Self {
        Self::Error {
            message: message.to_string(),
            code: None,
        }
    }

    pub fn error_with_code(message: &str, code: &str) -> Self {
        Self::Error {
            message: message.to_string(),
            code: Some(code.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extension_message_names_are_preserved() {
        let msg = ClientMessage::shorts_viewed("/shorts/abc");
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"type\":\"SHORTS_VIEWED\""));
        assert!(json.contains("\"url\":\"/shorts/abc\""));
    }

    #[test]
    fn test_bare_extension_message_parses_without_version() {
        let msg: ClientMessage = serde_json::from_str(r#"{"type":"END_SESSION"}"#).unwrap();
        assert_eq!(msg.protocol_version, ProtocolVersion::CURRENT);
        assert_eq!(
            msg.message,
            MessageType::EndSession {
                duration: None,
                timestamp: None
            }
        );

        let msg: ClientMessage =
            serde_json::from_str(r#"{"type":"UPDATE_WATCH_TIME","seconds":1}"#).unwrap();
        assert_eq!(msg.message, MessageType::UpdateWatchTime { seconds: 1 });
    }

    #[test]
    fn test_session_time_uses_extension_field_name() {
        let json = serde_json::to_string(&DaemonMessage::SessionTime { session_time: 42 }).unwrap();
        assert_eq!(json, r#"{"type":"SESSION_TIME","sessionTime":42}"#);
    }

    #[test]
    fn test_surface_broadcasts_are_tagged() {
        let json = serde_json::to_string(&DaemonMessage::Redirect {
            url: "https://example.com".to_string(),
        })
        .unwrap();
        assert_eq!(json, r#"{"type":"REDIRECT","url":"https://example.com"}"#);

        let json = serde_json::to_string(&DaemonMessage::OpenPopup).unwrap();
        assert_eq!(json, r#"{"type":"OPEN_POPUP"}"#);
    }

    #[test]
    fn test_page_signal_nests_inside_envelope() {
        let msg = ClientMessage::page_signal(PageSignal::UrlChanged {
            path: "/shorts/a".to_string(),
        });
        let json = serde_json::to_string(&msg).unwrap();
        let parsed: ClientMessage = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, msg);
        assert_eq!(parsed.message.name(), "PAGE_SIGNAL");
    }
}
