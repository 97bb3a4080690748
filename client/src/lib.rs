//! # offsync client
//!
//! Offline write queue for applications whose remote data service is not
//! always reachable.
//!
//! Edits are validated and queued locally with [`SyncScheduler::queue_changes`],
//! persisted to a [`KeyValueStore`], and reconciled with the remote service
//! whenever it becomes reachable. Conflicts with records already on the
//! remote are settled by the configured [`ConflictStrategy`].
//!
//! ```no_run
//! use offsync_client::{FileStore, HttpRemote, SyncOptions, SyncScheduler};
//! use serde_json::{json, Map};
//! use std::sync::Arc;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let store = Arc::new(FileStore::open(".offsync")?);
//! let remote = Arc::new(HttpRemote::new("http://localhost:3000"));
//! let scheduler = SyncScheduler::new(store, remote, SyncOptions::default());
//! let background = scheduler.spawn_background();
//!
//! scheduler.queue_changes("loot", vec![json!({"id": 1, "copies": 3})], Map::new())?;
//!
//! let result = scheduler.force_sync_all_changes().await;
//! println!("{}", result.message);
//!
//! scheduler.shutdown();
//! background.await?;
//! # Ok(())
//! # }
//! ```

mod background;
pub mod config;
pub mod error;
pub mod monitor;
pub mod queue_store;
pub mod remote;
pub mod scheduler;
pub mod storage;

pub use config::{Config, ConfigError, SyncOptions};
pub use error::{ClientError, Result, StorageError};
pub use monitor::{ConnectionMonitor, ConnectionStatus};
pub use queue_store::QueueStore;
pub use remote::{HttpRemote, MemoryRemote, RemoteError, RemoteService};
pub use scheduler::{ChangeValidator, SchedulerBuilder, SyncScheduler, SyncTrigger};
pub use storage::{FileStore, KeyValueStore, MemoryStore};

pub use offsync_engine::{
    ConflictStrategy, Document, QueueItem, SyncResult, SyncStats, SyncStatus,
};
