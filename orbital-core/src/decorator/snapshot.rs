//! Snapshot storage for the saved-state decorator.
//!
//! States are encoded with MessagePack (named fields) so a snapshot written
//! by one build can be read back after fields are added with defaults.

use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::ContainerError;

/// Somewhere to keep encoded state snapshots, keyed by name.
pub trait SnapshotStore: Send + Sync {
    /// Store `bytes` under `key`, replacing any previous snapshot.
    fn save(&self, key: &str, bytes: Vec<u8>) -> Result<(), ContainerError>;

    /// The last snapshot stored under `key`, if any.
    fn load(&self, key: &str) -> Result<Option<Vec<u8>>, ContainerError>;
}

/// Encode a state for storage.
pub fn encode_snapshot<S>(state: &S) -> Result<Vec<u8>, ContainerError>
where
    S: Serialize,
{
    Ok(rmp_serde::to_vec_named(state)?)
}

/// Decode a stored state.
pub fn decode_snapshot<S>(bytes: &[u8]) -> Result<S, ContainerError>
where
    S: DeserializeOwned,
{
    Ok(rmp_serde::from_slice(bytes)?)
}

/// Load and decode the last snapshot stored under `key`, if any.
pub fn restore_snapshot<S, St>(store: &St, key: &str) -> Result<Option<S>, ContainerError>
where
    S: DeserializeOwned,
    St: SnapshotStore + ?Sized,
{
    store
        .load(key)?
        .map(|bytes| decode_snapshot(&bytes))
        .transpose()
}

/// Like [`restore_snapshot`], falling back to `default` when nothing was
/// stored or the snapshot cannot be read.
pub fn restore_snapshot_or<S, St>(store: &St, key: &str, default: S) -> S
where
    S: DeserializeOwned,
    St: SnapshotStore + ?Sized,
{
    match restore_snapshot(store, key) {
        Ok(Some(state)) => state,
        Ok(None) => default,
        Err(err) => {
            tracing::warn!(key, error = %err, "discarding unreadable state snapshot");
            default
        }
    }
}

/// In-process snapshot store.
#[derive(Debug, Default)]
pub struct MemorySnapshotStore {
    entries: DashMap<String, Vec<u8>>,
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys with a snapshot.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop the snapshot under `key`.
    pub fn remove(&self, key: &str) -> Option<Vec<u8>> {
        self.entries.remove(key).map(|(_, bytes)| bytes)
    }
}

impl SnapshotStore for MemorySnapshotStore {
    fn save(&self, key: &str, bytes: Vec<u8>) -> Result<(), ContainerError> {
        self.entries.insert(key.to_string(), bytes);
        Ok(())
    }

    fn load(&self, key: &str) -> Result<Option<Vec<u8>>, ContainerError> {
        Ok(self.entries.get(key).map(|entry| entry.value().clone()))
    }
}
