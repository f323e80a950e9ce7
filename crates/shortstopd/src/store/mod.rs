//! Persistent counter store.
//!
//! A flat key-value namespace of JSON values with an async `get`/`set`
//! contract and a change stream. Reads never fail: missing keys are simply
//! absent from the returned [`Snapshot`]. Writes are last-write-wins per
//! key; serializing read-modify-write cycles is the caller's job (the
//! session aggregator owns every counter mutation).
//!
//! Two backends:
//! - [`MemoryStore`] for tests and ephemeral runs
//! - [`JsonFileStore`] persisting to one JSON document with atomic replace
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()` or `.expect()` in production code
//! - Corrupt or malformed persisted data degrades to defaults with a warning
//! - Change notifications with no subscribers are dropped silently

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::broadcast;

mod file;
pub mod keys;
mod memory;
mod snapshot;

pub use file::JsonFileStore;
pub use memory::MemoryStore;
pub use snapshot::{Snapshot, StatsTables};

/// Capacity of the change notification channel.
const CHANGE_BUFFER: usize = 64;

// ============================================================================
// Store Contract
// ============================================================================

/// Async key-value contract of the counter store.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Reads `keys`. Keys with no stored value are absent from the result.
    async fn get(&self, keys: &[&str]) -> Snapshot;

    /// Writes every key in `snapshot`, replacing previous values.
    ///
    /// A JSON `null` deletes the key.
    async fn set(&self, snapshot: Snapshot) -> Result<(), StoreError>;

    /// Subscribes to change notifications.
    fn subscribe(&self) -> broadcast::Receiver<StoreChange>;
}

/// Shared, type-erased store handle.
pub type SharedStore = Arc<dyn CounterStore>;

/// Keys touched by one `set`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreChange {
    pub keys: Vec<String>,
}

impl StoreChange {
    fn from_snapshot(snapshot: &Snapshot) -> Self {
        Self {
            keys: snapshot.keys().cloned().collect(),
        }
    }

    /// True if `key` was written.
    pub fn touches(&self, key: &str) -> bool {
        self.keys.iter().any(|k| k == key)
    }

    /// True if any per-day statistics table was written.
    pub fn touches_daily_tables(&self) -> bool {
        keys::DAILY_TABLES.iter().any(|key| self.touches(key))
    }
}

fn change_channel() -> broadcast::Sender<StoreChange> {
    let (tx, _) = broadcast::channel(CHANGE_BUFFER);
    tx
}

// ============================================================================
// Store Errors
// ============================================================================

/// Errors from persisting the store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Failed to write the store file.
    #[error("failed to write store {path}: {error}")]
    Io {
        path: PathBuf,
        #[source]
        error: std::io::Error,
    },

    /// The store document could not be serialized.
    #[error("failed to serialize store: {0}")]
    Serialize(#[from] serde_json::Error),

    /// The blocking write task panicked or was cancelled.
    #[error("store write task failed: {0}")]
    TaskFailed(String),
}

impl StoreError {
    pub(crate) fn io(path: impl Into<PathBuf>, error: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_change_touches() {
        let change = StoreChange {
            keys: vec![keys::SHORTS_HISTORY.to_string()],
        };
        assert!(change.touches(keys::SHORTS_HISTORY));
        assert!(!change.touches(keys::SHORTS_URLS));
        assert!(change.touches_daily_tables());

        let counters_only = StoreChange {
            keys: vec![keys::CURRENT_SESSION_TIME.to_string()],
        };
        assert!(!counters_only.touches_daily_tables());
    }

    #[test]
    fn test_store_error_display() {
        let err = StoreError::io(
            "/tmp/store.json",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        assert_eq!(err.to_string(), "failed to write store /tmp/store.json: denied");
    }
}
