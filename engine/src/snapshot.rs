//! Persisted form of the pending-change queue.
//!
//! Snapshots are the bridge between the in-memory [`SyncQueue`] and durable
//! storage. Categories are kept in a BTreeMap so serialization is
//! deterministic.

use crate::{error::Result, Error, OriginId, SyncQueue, Timestamp};
use serde::{Deserialize, Serialize};

/// Version of the snapshot format for future compatibility.
pub const SNAPSHOT_FORMAT_VERSION: u32 = 1;

/// A point-in-time copy of the queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueSnapshot {
    /// Snapshot format version
    pub format_version: u32,
    /// Device that wrote the snapshot
    pub origin_id: OriginId,
    /// When the snapshot was taken
    pub saved_at: Timestamp,
    /// Queued items by category
    #[serde(rename = "categories")]
    pub queue: SyncQueue,
}

impl QueueSnapshot {
    /// Capture a queue.
    pub fn new(origin_id: impl Into<OriginId>, saved_at: Timestamp, queue: SyncQueue) -> Self {
        Self {
            format_version: SNAPSHOT_FORMAT_VERSION,
            origin_id: origin_id.into(),
            saved_at,
            queue,
        }
    }

    /// Total queued items in the snapshot.
    pub fn pending_count(&self) -> usize {
        self.queue.pending_count(None)
    }

    /// Serialize to JSON with deterministic ordering.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| Error::InvalidSnapshot(e.to_string()))
    }

    /// Deserialize from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        let snapshot: Self =
            serde_json::from_str(json).map_err(|e| Error::InvalidSnapshot(e.to_string()))?;

        if snapshot.format_version > SNAPSHOT_FORMAT_VERSION {
            return Err(Error::InvalidSnapshot(format!(
                "unsupported snapshot format version: {} (max supported: {})",
                snapshot.format_version, SNAPSHOT_FORMAT_VERSION
            )));
        }

        // A category key must match the items filed under it.
        for (category, items) in snapshot.queue.iter() {
            if let Some(stray) = items.iter().find(|item| &item.category != category) {
                return Err(Error::InvalidSnapshot(format!(
                    "item {} filed under {category} belongs to {}",
                    stray.id, stray.category
                )));
            }
        }

        Ok(snapshot)
    }
}
