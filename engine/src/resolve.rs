//! Conflict resolution between queued local edits and a remote snapshot.
//!
//! # Algorithm
//!
//! 1. Sort queued items by timestamp, oldest first (stable, so items with
//!    equal timestamps keep enqueue order)
//! 2. Index the remote snapshot by record identifier
//! 3. Apply every local record in order, resolving identifier collisions
//!    with the configured [`ConflictStrategy`]
//! 4. Return the merged snapshot: remote records in their original order,
//!    followed by newly added records in first-seen order
//!
//! Resolution is a pure function of its inputs.

use crate::{error::Result, Document, Error, QueueItem, RecordId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Policy applied when a local record collides with an existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ConflictStrategy {
    /// Keep the existing record; only non-conflicting local additions land
    RemoteWins,
    /// Replace the existing record with the local one
    LocalWins,
    /// Shallow-merge local fields over the existing record's fields
    Merge,
    /// Compare record timestamps; the later one wins (default)
    #[default]
    LastModifiedWins,
}

impl ConflictStrategy {
    /// All strategies, in declaration order.
    pub const ALL: [ConflictStrategy; 4] = [
        ConflictStrategy::RemoteWins,
        ConflictStrategy::LocalWins,
        ConflictStrategy::Merge,
        ConflictStrategy::LastModifiedWins,
    ];

    /// Name used in configuration and serialized forms.
    pub fn as_str(&self) -> &'static str {
        match self {
            ConflictStrategy::RemoteWins => "remoteWins",
            ConflictStrategy::LocalWins => "localWins",
            ConflictStrategy::Merge => "merge",
            ConflictStrategy::LastModifiedWins => "lastModifiedWins",
        }
    }
}

impl fmt::Display for ConflictStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConflictStrategy {
    type Err = Error;

    /// Accepts the camelCase name, case-insensitively, with `-` or `_`
    /// separators ignored (`last_modified_wins`, `LastModifiedWins`).
    fn from_str(s: &str) -> Result<Self> {
        let normalized: String = s
            .chars()
            .filter(|c| *c != '-' && *c != '_')
            .collect::<String>()
            .to_ascii_lowercase();

        Self::ALL
            .into_iter()
            .find(|strategy| strategy.as_str().to_ascii_lowercase() == normalized)
            .ok_or_else(|| Error::UnknownStrategy(s.to_string()))
    }
}

/// Output of a resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Resolution {
    /// Merged snapshot to write back
    pub records: Vec<Document>,
    /// Local records that were added, replaced or merged in
    pub applied: usize,
    /// Identifiers of local records discarded in favour of an existing one
    pub discarded: Vec<RecordId>,
}

/// Working snapshot: records in order plus an identifier index.
#[derive(Debug, Default)]
struct Merged {
    records: Vec<Document>,
    index: HashMap<RecordId, usize>,
}

impl Merged {
    fn from_remote(remote: Vec<Document>) -> Self {
        let mut merged = Self::default();
        for record in remote {
            merged.push(record);
        }
        merged
    }

    fn push(&mut self, record: Document) {
        if let Some(id) = record.id() {
            if let Some(&slot) = self.index.get(&id) {
                // Duplicate identifier inside the remote snapshot: last one wins
                self.records[slot] = record;
                return;
            }
            self.index.insert(id, self.records.len());
        }
        self.records.push(record);
    }

    fn get_mut(&mut self, id: &str) -> Option<&mut Document> {
        let slot = *self.index.get(id)?;
        self.records.get_mut(slot)
    }
}

/// Applies queued items onto a remote snapshot.
#[derive(Debug, Clone, Copy, Default)]
pub struct Resolver {
    strategy: ConflictStrategy,
}

impl Resolver {
    /// Create a resolver for a strategy.
    pub fn new(strategy: ConflictStrategy) -> Self {
        Self { strategy }
    }

    /// The configured strategy.
    pub fn strategy(&self) -> ConflictStrategy {
        self.strategy
    }

    /// Merge `queued` into `remote`.
    pub fn resolve(&self, queued: &[QueueItem], remote: Vec<Document>) -> Resolution {
        if queued.is_empty() {
            return Resolution {
                records: remote,
                applied: 0,
                discarded: Vec::new(),
            };
        }

        let mut ordered: Vec<&QueueItem> = queued.iter().collect();
        ordered.sort_by_key(|item| item.timestamp);

        // With nothing remote to conflict with, the queue's final
        // per-identifier state is the answer.
        let strategy = match self.strategy {
            ConflictStrategy::RemoteWins | ConflictStrategy::LastModifiedWins
                if remote.is_empty() =>
            {
                ConflictStrategy::LocalWins
            }
            strategy => strategy,
        };

        let mut merged = Merged::from_remote(remote);
        let mut applied = 0;
        let mut discarded = Vec::new();

        for item in ordered {
            for record in &item.payload {
                let Some(id) = record.id() else {
                    merged.push(record.clone());
                    applied += 1;
                    continue;
                };

                let Some(existing) = merged.get_mut(&id) else {
                    merged.push(record.clone());
                    applied += 1;
                    continue;
                };

                let local_wins = match strategy {
                    ConflictStrategy::RemoteWins => false,
                    ConflictStrategy::LocalWins => {
                        *existing = record.clone();
                        true
                    }
                    ConflictStrategy::Merge => {
                        existing.merge_from(record);
                        true
                    }
                    ConflictStrategy::LastModifiedWins => {
                        let local_at = record.modified_at().unwrap_or(item.timestamp);
                        let newer = existing
                            .modified_at()
                            .map_or(true, |remote_at| local_at > remote_at);
                        if newer {
                            *existing = record.clone();
                        }
                        newer
                    }
                };

                if local_wins {
                    applied += 1;
                } else {
                    discarded.push(id);
                }
            }
        }

        Resolution {
            records: merged.records,
            applied,
            discarded,
        }
    }
}

/// Resolve `queued` against `remote` with `strategy`.
pub fn resolve(strategy: ConflictStrategy, queued: &[QueueItem], remote: Vec<Document>) -> Resolution {
    Resolver::new(strategy).resolve(queued, remote)
}
