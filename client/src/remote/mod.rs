//! The remote data service the queue reconciles against.
//!
//! The service holds the authoritative snapshot of every category. The
//! scheduler only ever reads a full snapshot and writes a full snapshot
//! back; there is no delta protocol.

mod http;
mod memory;

pub use http::HttpRemote;
pub use memory::MemoryRemote;

use async_trait::async_trait;
use offsync_engine::Document;

/// Remote service failure. Every variant is retryable from the queue's
/// point of view.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RemoteError {
    #[error("remote unreachable: {0}")]
    Unreachable(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("remote returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("could not decode remote response: {0}")]
    Decode(String),
}

/// Operations consumed from the remote data service.
#[async_trait]
pub trait RemoteService: Send + Sync {
    /// Current records of a category; empty if the category has none.
    async fn fetch_latest(&self, category: &str) -> Result<Vec<Document>, RemoteError>;

    /// Replace the category's records with exactly `records`.
    async fn save(&self, category: &str, records: &[Document]) -> Result<(), RemoteError>;

    /// Lightweight liveness probe.
    async fn check_health(&self) -> Result<(), RemoteError>;
}
