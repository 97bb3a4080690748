//! # offsync engine
//!
//! Deterministic core of an offline write queue.
//!
//! A client that cannot reach its remote data service keeps accepting edits
//! and records them in a [`SyncQueue`]. Once the service is reachable again,
//! each category's queued edits are merged into the service's current
//! snapshot by the [`Resolver`], and the merged snapshot is written back.
//!
//! ## Design Principles
//!
//! - **No IO**: the engine knows nothing about files, network or clocks;
//!   timestamps are passed in
//! - **Deterministic**: same inputs always produce the same merged snapshot
//! - **Schema-light**: records are free-form JSON objects with an `id`
//!
//! ## Core Concepts
//!
//! ### Records
//!
//! A [`Document`] is a JSON object. The engine reads two things from it: the
//! identifier (`id`, string or integer) and a last-modified time
//! (`modifiedAt`, `updatedAt` or `timestamp`).
//!
//! ### Queue
//!
//! A [`QueueItem`] is one edit batch for one category. The [`SyncQueue`]
//! keeps items per category in enqueue order and only ever appends or
//! removes whole items.
//!
//! ### Conflict resolution
//!
//! [`ConflictStrategy`] selects how a local record that collides with an
//! existing identifier is handled:
//! - [`ConflictStrategy::RemoteWins`] - keep the existing record
//! - [`ConflictStrategy::LocalWins`] - replace it
//! - [`ConflictStrategy::Merge`] - overlay local fields onto it
//! - [`ConflictStrategy::LastModifiedWins`] - newer timestamp wins (default)
//!
//! ## Quick Start
//!
//! ```rust
//! use offsync_engine::{resolve, ConflictStrategy, Document, QueueItem, Schema};
//! use chrono::Utc;
//! use serde_json::json;
//!
//! // 1. Validate an incoming change set
//! let schema = Schema::new();
//! let payload = schema
//!     .validate_changes("loot", vec![json!({"id": 1, "copies": 3})])
//!     .unwrap();
//!
//! // 2. Queue it
//! let item = QueueItem::new("item-1", "loot", payload, Utc::now(), "device-1");
//!
//! // 3. Merge into the remote snapshot
//! let remote = vec![
//!     Document::from_value(json!({"id": 1, "copies": 1})).unwrap(),
//!     Document::from_value(json!({"id": 2, "copies": 5})).unwrap(),
//! ];
//! let merged = resolve(ConflictStrategy::LocalWins, &[item], remote);
//! assert_eq!(merged.records.len(), 2);
//! assert_eq!(merged.records[0].get("copies"), Some(&json!(3)));
//! ```
//!
//! ## Persistence
//!
//! Use [`QueueSnapshot`] to serialize a queue for durable storage. Snapshots
//! carry a format version and serialize deterministically.

pub mod error;
pub mod queue;
pub mod record;
pub mod resolve;
pub mod schema;
pub mod snapshot;
pub mod stats;

// Re-export main types at crate root
pub use error::Error;
pub use queue::{QueueItem, SyncQueue};
pub use record::Document;
pub use resolve::{resolve, ConflictStrategy, Resolution, Resolver};
pub use schema::{CategorySchema, FieldDef, FieldType, Schema};
pub use snapshot::{QueueSnapshot, SNAPSHOT_FORMAT_VERSION};
pub use stats::{CategoryOutcome, SyncResult, SyncStats, SyncStatus};

/// Type aliases for clarity
pub type Category = String;
pub type RecordId = String;
pub type ItemId = String;
pub type OriginId = String;
pub type Timestamp = chrono::DateTime<chrono::Utc>;
