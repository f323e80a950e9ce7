//! In-memory store backend.

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::{broadcast, RwLock};

use super::{change_channel, CounterStore, Snapshot, StoreChange, StoreError};

/// Store kept entirely in memory; lost on exit.
#[derive(Debug)]
pub struct MemoryStore {
    values: RwLock<Map<String, Value>>,
    changes: broadcast::Sender<StoreChange>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_values(Map::new())
    }

    /// Creates a store seeded with `values`.
    pub fn with_values(values: Map<String, Value>) -> Self {
        Self {
            values: RwLock::new(values),
            changes: change_channel(),
        }
    }

    /// Copy of everything stored.
    pub async fn dump(&self) -> Map<String, Value> {
        self.values.read().await.clone()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CounterStore for MemoryStore {
    async fn get(&self, keys: &[&str]) -> Snapshot {
        let values = self.values.read().await;
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
        {
            let mut values = self.values.write().await;
            apply(&mut values, snapshot);
        }
        // No subscribers is fine
        let _ = self.changes.send(change);
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<StoreChange> {
        self.changes.subscribe()
    }
}

/// Applies a snapshot to a value map; `null` deletes.
pub(super) fn apply(values: &mut Map<String, Value>, snapshot: Snapshot) {
    for (key, value) in snapshot.into_map() {
        if value.is_null() {
            values.remove(&key);
        } else {
            values.insert(key, value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::keys;

    #[tokio::test]
    async fn test_get_missing_keys_is_empty() {
        let store = MemoryStore::new();
        let snap = store.get(&[keys::SHORTS_HISTORY]).await;
        assert!(snap.is_empty());
    }

    #[tokio::test]
    async fn test_set_then_get_and_notify() {
        let store = MemoryStore::new();
        let mut rx = store.subscribe();

        let mut snap = Snapshot::new();
        snap.put(keys::CURRENT_SESSION_TIME, 12u64);
        store.set(snap).await.unwrap();

        let read = store.get(&[keys::CURRENT_SESSION_TIME]).await;
        assert_eq!(read.u64_or(keys::CURRENT_SESSION_TIME, 0), 12);

        let change = rx.recv().await.unwrap();
        assert!(change.touches(keys::CURRENT_SESSION_TIME));
    }

    #[tokio::test]
    async fn test_null_deletes_key() {
        let store = MemoryStore::new();
        let mut snap = Snapshot::new();
        snap.put(keys::LAST_ACTIVE_DATE, "2026-10-05");
        store.set(snap).await.unwrap();

        let mut clear = Snapshot::new();
        clear.put_value(keys::LAST_ACTIVE_DATE, Value::Null);
        store.set(clear).await.unwrap();

        assert!(store.dump().await.is_empty());
    }
}
