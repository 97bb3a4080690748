//! Durable queue store: saves and restores the pending-change queue.
//!
//! The remote service is the source of truth, so a queue that cannot be read
//! back is treated as empty rather than as a fatal error.

use crate::error::StorageError;
use crate::storage::KeyValueStore;
use chrono::Utc;
use offsync_engine::{OriginId, QueueSnapshot, SyncQueue};
use std::sync::Arc;

/// Storage key of the serialized queue.
pub const QUEUE_KEY: &str = "sync_queue";
/// Storage key of the generated device identifier.
pub const DEVICE_ID_KEY: &str = "device_id";

/// Persists the [`SyncQueue`] and the device identifier.
#[derive(Clone)]
pub struct QueueStore {
    storage: Arc<dyn KeyValueStore>,
}

impl QueueStore {
    /// Wrap a key-value store.
    pub fn new(storage: Arc<dyn KeyValueStore>) -> Self {
        Self { storage }
    }

    /// Write the whole queue. The previous value stays readable until the new
    /// one is fully written.
    pub fn persist(&self, queue: &SyncQueue, origin_id: &str) -> Result<(), StorageError> {
        let snapshot = QueueSnapshot::new(origin_id, Utc::now(), queue.clone());
        let json = snapshot.to_json()?;
        self.storage.set(QUEUE_KEY, &json)?;
        tracing::debug!(items = snapshot.pending_count(), "Persisted sync queue");
        Ok(())
    }

    /// Read the queue back. Missing or unreadable data yields an empty queue.
    pub fn load(&self) -> SyncQueue {
        let json = match self.storage.get(QUEUE_KEY) {
            Ok(Some(json)) => json,
            Ok(None) => return SyncQueue::new(),
            Err(e) => {
                tracing::warn!(error = %e, "Could not read sync queue, starting empty");
                return SyncQueue::new();
            }
        };

        match QueueSnapshot::from_json(&json) {
            Ok(snapshot) => {
                tracing::info!(
                    items = snapshot.pending_count(),
                    saved_at = %snapshot.saved_at,
                    "Restored sync queue"
                );
                snapshot.queue
            }
            Err(e) => {
                tracing::warn!(error = %e, "Discarding corrupt sync queue");
                SyncQueue::new()
            }
        }
    }

    /// Stable identifier of this device, generated on first use.
    pub fn device_id(&self) -> OriginId {
        match self.storage.get(DEVICE_ID_KEY) {
            Ok(Some(id)) if !id.trim().is_empty() => return id.trim().to_string(),
            Ok(_) => {}
            Err(e) => tracing::warn!(error = %e, "Could not read device id, generating a new one"),
        }

        let id = uuid::Uuid::new_v4().to_string();
        if let Err(e) = self.storage.set(DEVICE_ID_KEY, &id) {
            tracing::warn!(error = %e, "Could not store device id");
        }
        id
    }
}
