//! Error types for the offsync engine.

use crate::Category;
use thiserror::Error;

/// All possible errors from the offsync engine.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    // Validation errors
    #[error("invalid category name: {0:?}")]
    InvalidCategory(Category),

    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    #[error("record at index {index} has no usable identifier")]
    MissingIdentifier { index: usize },

    #[error("missing required field: {0}")]
    MissingRequiredField(String),

    #[error("type mismatch for field '{field}': expected {expected}, got {got}")]
    TypeMismatch {
        field: String,
        expected: String,
        got: String,
    },

    #[error("rejected by validator: {0}")]
    Rejected(String),

    // Configuration errors
    #[error("unknown conflict strategy: {0}")]
    UnknownStrategy(String),

    // State errors
    #[error("invalid snapshot: {0}")]
    InvalidSnapshot(String),
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;
