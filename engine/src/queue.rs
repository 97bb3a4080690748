//! The pending-change queue.
//!
//! Queued edits are grouped by category. Within a category items are kept in
//! enqueue order; a category's list is only ever appended to or has whole
//! items removed once they are synced or cleared.

use crate::{Category, Document, ItemId, OriginId, Timestamp};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// One queued edit batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueItem {
    /// Unique identifier of this queue entry
    pub id: ItemId,
    /// Category the edit targets
    pub category: Category,
    /// Edited records, in caller order
    pub payload: Vec<Document>,
    /// When the entry was created
    pub timestamp: Timestamp,
    /// Client/session that produced the edit
    pub origin_id: OriginId,
    /// Free-form annotations supplied by the caller
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl QueueItem {
    /// Create a new queue item.
    pub fn new(
        id: impl Into<ItemId>,
        category: impl Into<Category>,
        payload: Vec<Document>,
        timestamp: Timestamp,
        origin_id: impl Into<OriginId>,
    ) -> Self {
        Self {
            id: id.into(),
            category: category.into(),
            payload,
            timestamp,
            origin_id: origin_id.into(),
            metadata: Map::new(),
        }
    }

    /// Attach metadata.
    pub fn with_metadata(mut self, metadata: Map<String, Value>) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Mapping from category to its queued items, oldest first.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SyncQueue {
    categories: BTreeMap<Category, Vec<QueueItem>>,
}

impl SyncQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an item to its category.
    pub fn enqueue(&mut self, item: QueueItem) {
        self.categories
            .entry(item.category.clone())
            .or_default()
            .push(item);
    }

    /// Items queued for a category, oldest first.
    pub fn items(&self, category: &str) -> &[QueueItem] {
        self.categories
            .get(category)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Categories that have at least one queued item.
    pub fn categories(&self) -> impl Iterator<Item = &Category> {
        self.categories
            .iter()
            .filter(|(_, items)| !items.is_empty())
            .map(|(category, _)| category)
    }

    /// Whether `category` (or any category, if `None`) has queued items.
    pub fn has_pending(&self, category: Option<&str>) -> bool {
        match category {
            Some(category) => !self.items(category).is_empty(),
            None => self.categories.values().any(|items| !items.is_empty()),
        }
    }

    /// Number of queued items in one category, or in all of them.
    pub fn pending_count(&self, category: Option<&str>) -> usize {
        match category {
            Some(category) => self.items(category).len(),
            None => self.categories.values().map(Vec::len).sum(),
        }
    }

    /// Check if nothing is queued.
    pub fn is_empty(&self) -> bool {
        !self.has_pending(None)
    }

    /// Drop queued items for one category, or for all of them.
    ///
    /// Returns the number of items removed.
    pub fn clear(&mut self, category: Option<&str>) -> usize {
        match category {
            Some(category) => self
                .categories
                .remove(category)
                .map(|items| items.len())
                .unwrap_or(0),
            None => {
                let removed = self.pending_count(None);
                self.categories.clear();
                removed
            }
        }
    }

    /// Remove the given items from a category after they were synced.
    ///
    /// Items queued after the sync pass read the queue are not in `ids` and
    /// stay queued. Returns the number of items removed.
    pub fn acknowledge(&mut self, category: &str, ids: &[ItemId]) -> usize {
        let Some(items) = self.categories.get_mut(category) else {
            return 0;
        };
        let before = items.len();
        items.retain(|item| !ids.contains(&item.id));
        let removed = before - items.len();
        if items.is_empty() {
            self.categories.remove(category);
        }
        removed
    }

    /// Iterate over all categories and their items.
    pub fn iter(&self) -> impl Iterator<Item = (&Category, &[QueueItem])> {
        self.categories
            .iter()
            .filter(|(_, items)| !items.is_empty())
            .map(|(category, items)| (category, items.as_slice()))
    }
}
