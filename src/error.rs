//! Error types for the treesnap library
//!
//! This module defines every error that snapshot creation, navigation and
//! restore can surface. The taxonomy follows the engine's propagation rules:
//!
//! - `NotFound` / `LabelNotFound`: a node or label is missing. Raised before any
//!   write is performed.
//! - `SchemaMismatch`: a node lacks the versioning capability. Snapshot creation
//!   recovers from this locally by omitting the node; restore surfaces it.
//! - `StoreFailure`: an opaque error coming from the store, propagated unchanged.
//! - `InvariantViolation`: a defensive check failed (cycles, depth overflow).
//!   Never expected on well-formed data.

use thiserror::Error;

/// Type alias for Results in the treesnap library
pub type Result<T> = std::result::Result<T, SnapshotError>;

/// Main error type for all treesnap operations
#[derive(Debug, Error)]
pub enum SnapshotError {
    /// Live node, version node or other entity not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// A version label is absent from a node's own history
    #[error("Label {label} not found in history of {live_id}")]
    LabelNotFound {
        /// Live node whose history was searched
        live_id: String,
        /// Requested label
        label: String,
    },

    /// Node lacks the versioning capability
    #[error("Schema mismatch: {0}")]
    SchemaMismatch(String),

    /// Opaque failure reported by the underlying store
    #[error("Store failure: {0}")]
    StoreFailure(String),

    /// Defensive check failed; data is not well formed
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    /// Version label could not be parsed
    #[error("Invalid version label: {0:?}")]
    InvalidLabel(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// A transaction is already open on the store
    #[error("A transaction is already active on this store")]
    TransactionActive,

    /// The token does not belong to the active transaction
    #[error("Stale transaction token: {0}")]
    StaleTransaction(u64),

    /// I/O errors while persisting or loading a store
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Errors during JSON serialization/deserialization
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Errors during bincode serialization/deserialization
    #[error("Bincode error: {0}")]
    Bincode(String),
}

impl From<bincode::error::DecodeError> for SnapshotError {
    fn from(err: bincode::error::DecodeError) -> Self {
        SnapshotError::Bincode(err.to_string())
    }
}

impl From<bincode::error::EncodeError> for SnapshotError {
    fn from(err: bincode::error::EncodeError) -> Self {
        SnapshotError::Bincode(err.to_string())
    }
}

impl SnapshotError {
    /// Create a store failure with a custom message
    pub fn store(msg: impl Into<String>) -> Self {
        SnapshotError::StoreFailure(msg.into())
    }

    /// Create a not-found error with a custom message
    pub fn not_found(msg: impl Into<String>) -> Self {
        SnapshotError::NotFound(msg.into())
    }

    /// Create an invariant violation with a custom message
    pub fn invariant(msg: impl Into<String>) -> Self {
        SnapshotError::InvariantViolation(msg.into())
    }

    /// Create a schema mismatch with a custom message
    pub fn schema(msg: impl Into<String>) -> Self {
        SnapshotError::SchemaMismatch(msg.into())
    }

    /// Check if this error reports a missing node or label
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            SnapshotError::NotFound(_) | SnapshotError::LabelNotFound { .. }
        )
    }

    /// Check if this error indicates malformed data
    pub fn is_fatal(&self) -> bool {
        matches!(self, SnapshotError::InvariantViolation(_))
    }

    /// Get a user-friendly error message with suggestions
    pub fn user_message(&self) -> String {
        match self {
            SnapshotError::LabelNotFound { live_id, label } => {
                format!(
                    "Version {} does not exist for node '{}'. Use 'history' to list its versions.",
                    label, live_id
                )
            }
            SnapshotError::SchemaMismatch(msg) => {
                format!("{}. Only versionable folders and documents can be snapshotted or restored.", msg)
            }
            SnapshotError::TransactionActive => {
                "Another operation holds the store. Retry once it has finished.".to_string()
            }
            _ => self.to_string(),
        }
    }
}
