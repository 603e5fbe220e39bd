//! Error types for the synchronization layer.

use thiserror::Error;

/// Main error type for store operations.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error(
        "Status type id mismatch: store is scoped to {expected}, got {got} (story {story_id})"
    )]
    StatusTypeIdMismatch {
        expected: String,
        got: String,
        story_id: String,
    },

    #[error("Event type is reserved for the store protocol: {0}")]
    ReservedEventType(String),

    #[error("Store already registered: {0}")]
    StoreExists(String),

    #[error("Store {0} is registered with a different state type")]
    StoreTypeMismatch(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    #[error("Invalid envelope: {0}")]
    InvalidEnvelope(String),

    #[error("Multiple leaders detected for store {0}")]
    DuplicateLeader(String),
}

impl From<serde_json::Error> for SyncError {
    fn from(e: serde_json::Error) -> Self {
        SyncError::Serialization(e.to_string())
    }
}

impl From<rmp_serde::encode::Error> for SyncError {
    fn from(e: rmp_serde::encode::Error) -> Self {
        SyncError::Serialization(e.to_string())
    }
}

impl From<rmp_serde::decode::Error> for SyncError {
    fn from(e: rmp_serde::decode::Error) -> Self {
        SyncError::Deserialization(e.to_string())
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, SyncError>;
