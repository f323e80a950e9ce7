//! JSON file store backend.
//!
//! The whole store is one JSON object on disk. It is loaded once at open
//! and kept in memory; every `set` rewrites the file through a temporary
//! sibling that is renamed over the original, so a crash mid-write leaves
//! either the old or the new document, never a torn one.

use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::{Map, Value};
use tempfile::NamedTempFile;
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info, warn};

use super::memory::apply;
use super::{change_channel, CounterStore, Snapshot, StoreChange, StoreError};

/// Store persisted to a single JSON file.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    values: Mutex<Map<String, Value>>,
    changes: broadcast::Sender<StoreChange>,
}

impl JsonFileStore {
    /// Opens the store at `path`, creating parent directories.
    ///
    /// A missing file starts an empty store. A file that is not a JSON
    /// object is logged and ignored; it is overwritten on the first `set`.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Io` if the directory cannot be created or the
    /// file exists but cannot be read.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StoreError::io(parent, e))?;
        }

        let values = match tokio::fs::read(&path).await {
            Ok(bytes) => decode(&path, &bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %path.display(), "No store file yet, starting empty");
                Map::new()
            }
            Err(e) => return Err(StoreError::io(&path, e)),
        };

        debug!(path = %path.display(), keys = values.len(), "Store loaded");

        Ok(Self {
            path,
            values: Mutex::new(values),
            changes: change_channel(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn decode(path: &Path, bytes: &[u8]) -> Map<String, Value> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Map::new();
    }
    match serde_json::from_slice::<Value>(bytes) {
        Ok(Value::Object(map)) => map,
        Ok(_) => {
            warn!(path = %path.display(), "Store file is not a JSON object, starting empty");
            Map::new()
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Store file is corrupt, starting empty");
            Map::new()
        }
    }
}

/// Writes `bytes` to `path` via a temporary file in the same directory.
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));

    let mut tmp = NamedTempFile::new_in(dir).map_err(|e| StoreError::io(dir, e))?;
    tmp.write_all(bytes).map_err(|e| StoreError::io(tmp.path(), e))?;
    tmp.as_file()
        .sync_all()
        .map_err(|e| StoreError::io(tmp.path(), e))?;
    tmp.persist(path)
        .map_err(|e| StoreError::io(path, e.error))?;
    Ok(())
}

#[async_trait]
impl CounterStore for JsonFileStore {
    async fn get(&self, keys: &[&str]) -> Snapshot {
        let values = self.values.lock().await;
        let mut picked = Map::new();
        for key in keys {
            if let Some(value) = values.get(*key) {
                picked.insert((*key).to_string(), value.clone());
            }
        }
        Snapshot::from_map(picked)
    }

    async fn set(&self, snapshot: Snapshot) -> Result<(), StoreError> {
        if snapshot.is_empty() {
            return Ok(());
        }
        let change = StoreChange::from_snapshot(&snapshot);

        // The lock is held across the write so files land in `set` order
        let mut values = self.values.lock().await;
        let mut next = values.clone();
        apply(&mut next, snapshot);

        let bytes = serde_json::to_vec_pretty(&next)?;
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || write_atomic(&path, &bytes))
            .await
            .map_err(|e| StoreError::TaskFailed(e.to_string()))??;

        *values = next;
        drop(values);

        let _ = self.changes.send(change);
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<StoreChange> {
        self.changes.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::keys;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_missing_file_starts_empty() {
        let dir = TempDir::new().unwrap();
        let store = JsonFileStore::open(dir.path().join("nested/store.json"))
            .await
            .unwrap();
        assert!(store.get(&[keys::SHORTS_HISTORY]).await.is_empty());
    }

    #[tokio::test]
    async fn test_values_survive_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("store.json");

        let store = JsonFileStore::open(&path).await.unwrap();
        let mut snap = Snapshot::new();
        snap.put(keys::REDIRECT_THRESHOLD, 9u32);
        store.set(snap).await.unwrap();
        drop(store);

        let reopened = JsonFileStore::open(&path).await.unwrap();
        let settings = reopened.get(&keys::SETTINGS).await.settings();
        assert_eq!(settings.redirect_threshold, 9);
    }

    #[tokio::test]
    async fn test_corrupt_file_is_ignored_then_replaced() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("store.json");
        std::fs::write(&path, b"{ not json").unwrap();

        let store = JsonFileStore::open(&path).await.unwrap();
        assert!(store.get(&[keys::SHORTS_HISTORY]).await.is_empty());

        let mut snap = Snapshot::new();
        snap.put(keys::ENABLE_REDIRECT, true);
        store.set(snap).await.unwrap();

        let raw: Value = serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(raw[keys::ENABLE_REDIRECT], Value::Bool(true));
    }
}
