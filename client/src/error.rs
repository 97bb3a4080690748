//! Error types for the client.
//!
//! Only validation errors ever reach callers of the scheduler; everything
//! else is caught, logged and turned into a [`offsync_engine::SyncResult`].

use crate::config::ConfigError;
use crate::remote::RemoteError;

/// Local durable storage failure.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("storage io error for key {key}: {source}")]
    Io {
        key: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid storage key: {0:?}")]
    InvalidKey(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] offsync_engine::Error),
}

/// Client error type.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("invalid change: {0}")]
    Validation(#[from] offsync_engine::Error),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("remote error: {0}")]
    Remote(#[from] RemoteError),

    #[error("config error: {0}")]
    Config(#[from] ConfigError),
}

/// Result type alias for the client.
pub type Result<T> = std::result::Result<T, ClientError>;
