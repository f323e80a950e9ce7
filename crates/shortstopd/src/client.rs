//! Request/response client for the daemon socket.
//!
//! Used by the `shortstop` CLI and by tests. Performs the `CONNECT`
//! handshake on connect, then exchanges one NDJSON line per request.
//!
//! **Panic-Free Policy:** no `.unwrap()`, `.expect()`, `panic!()`,
//! `unreachable!()`, or `todo!()`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::UnixStream;
use tokio::time::timeout;
use tracing::debug;

use shortstop_protocol::{ClientMessage, DaemonMessage, MessageType};

/// How long to wait for any single reply.
const REPLY_TIMEOUT: Duration = Duration::from_secs(10);

/// Errors talking to the daemon.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("daemon not reachable at {path}: {error}")]
    Connect {
        path: PathBuf,
        #[source]
        error: std::io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid message from daemon: {0}")]
    Protocol(#[from] serde_json::Error),

    #[error("daemon rejected connection: {0}")]
    Rejected(String),

    #[error("daemon error: {0}")]
    Daemon(String),

    #[error("unexpected reply: {0}")]
    Unexpected(String),

    #[error("daemon closed the connection")]
    Closed,

    #[error("timed out waiting for daemon")]
    Timeout,
}

/// A connected, handshaken daemon client.
pub struct DaemonClient {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
    client_id: String,
}

impl DaemonClient {
    /// Connects to `socket_path` and completes the handshake.
    pub async fn connect(
        socket_path: &Path,
        client_id: Option<String>,
    ) -> Result<Self, ClientError> {
        let stream = UnixStream::connect(socket_path)
            .await
            .map_err(|error| ClientError::Connect {
                path: socket_path.to_path_buf(),
                error,
            })?;
        let (reader, writer) = stream.into_split();
        let mut client = Self {
            reader: BufReader::new(reader),
            writer,
            client_id: String::new(),
        };

        client.send(&ClientMessage::connect(client_id)).await?;
        match client.next_message().await? {
            DaemonMessage::Connected { client_id, .. } => {
                debug!(client_id = %client_id, "Connected to daemon");
                client.client_id = client_id;
                Ok(client)
            }
            DaemonMessage::Rejected { reason, .. } => Err(ClientError::Rejected(reason)),
            DaemonMessage::Error { message, .. } => Err(ClientError::Daemon(message)),
            other => Err(ClientError::Unexpected(format!("{other:?}"))),
        }
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Sends one message without waiting for a reply.
    pub async fn send(&mut self, msg: &ClientMessage) -> Result<(), ClientError> {
        let mut line = serde_json::to_string(msg)?;
        line.push('\n');
        self.writer.write_all(line.as_bytes()).await?;
        self.writer.flush().await?;
        Ok(())
    }

    /// Reads the next message from the daemon, whatever it is.
    pub async fn next_message(&mut self) -> Result<DaemonMessage, ClientError> {
        let mut line = String::new();
        let read = timeout(REPLY_TIMEOUT, self.reader.read_line(&mut line))
            .await
            .map_err(|_| ClientError::Timeout)??;
        if read == 0 {
            return Err(ClientError::Closed);
        }
        Ok(serde_json::from_str(&line)?)
    }

    /// Sends `message` and returns its reply.
    ///
    /// Broadcasts that arrive first (when subscribed) are skipped. An
    /// `ERROR` reply becomes `ClientError::Daemon`.
    pub async fn request(&mut self, message: MessageType) -> Result<DaemonMessage, ClientError> {
        self.send(&ClientMessage::new(message)).await?;
        loop {
            match self.next_message().await? {
                DaemonMessage::Error { message, .. } => return Err(ClientError::Daemon(message)),
                msg if is_broadcast(&msg) => continue,
                msg => return Ok(msg),
            }
        }
    }

    /// Says goodbye and closes the connection.
    pub async fn disconnect(mut self) -> Result<(), ClientError> {
        self.send(&ClientMessage::disconnect()).await
    }
}

/// True for unsolicited daemon broadcasts.
pub fn is_broadcast(msg: &DaemonMessage) -> bool {
    matches!(
        msg,
        DaemonMessage::Badge { .. }
            | DaemonMessage::Intervention { .. }
            | DaemonMessage::StatsChanged { .. }
            | DaemonMessage::Notify { .. }
            | DaemonMessage::OpenPopup
            | DaemonMessage::Redirect { .. }
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_broadcast() {
        assert!(is_broadcast(&DaemonMessage::OpenPopup));
        assert!(is_broadcast(&DaemonMessage::Badge {
            text: String::new()
        }));
        assert!(!is_broadcast(&DaemonMessage::Ack));
        assert!(!is_broadcast(&DaemonMessage::Pong { seq: 1 }));
    }

    #[tokio::test]
    async fn test_connect_to_missing_socket_fails() {
        let dir = tempfile::TempDir::new().unwrap();
        let result = DaemonClient::connect(&dir.path().join("absent.sock"), None).await;
        assert!(matches!(result, Err(ClientError::Connect { .. })));
    }
}
