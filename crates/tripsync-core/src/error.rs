//! Error types for TripSync

use thiserror::Error;

use crate::types::CollectionKind;

/// Main error type for TripSync operations
#[derive(Error, Debug)]
pub enum SyncError {
    /// Draft rejected before any write was issued
    #[error("Invalid input: {0}")]
    Validation(String),

    /// Delete or vote target no longer exists
    #[error("Record not found: {kind}/{id}")]
    NotFound {
        /// Collection the record was expected in
        kind: CollectionKind,
        /// Record id as given by the caller
        id: String,
    },

    /// Session store could not be reached
    #[error("Store unreachable: {0}")]
    Connectivity(String),

    /// Conditional update lost against a concurrent writer
    #[error("Write conflict: {0}")]
    Conflict(String),

    /// No identity yet; mutations are disabled
    #[error("Identity unavailable: {0}")]
    IdentityUnavailable(String),

    /// Invalid configuration value
    #[error("Configuration error: {0}")]
    Config(String),

    /// Database creation/opening error
    #[error("Database error: {0}")]
    Database(#[from] redb::DatabaseError),

    /// Transaction error
    #[error("Transaction error: {0}")]
    Transaction(#[from] redb::TransactionError),

    /// Table error
    #[error("Table error: {0}")]
    Table(#[from] redb::TableError),

    /// Storage operation error
    #[error("Storage operation error: {0}")]
    StorageOp(#[from] redb::StorageError),

    /// Commit error
    #[error("Commit error: {0}")]
    Commit(#[from] redb::CommitError),

    /// Error during serialization/deserialization
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Automerge document error
    #[error("Automerge error: {0}")]
    Automerge(String),

    /// General I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// How a failure should reach the person using the app.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Shown next to the form that produced it
    Inline,
    /// Quiet connecting/stale indicator, logged as a warning
    Indicator,
    /// Logged only; the action is a no-op from the user's side
    Ignored,
}

impl SyncError {
    /// Classify the error for the presentation layer.
    ///
    /// No variant maps to a blocking or modal failure.
    pub fn severity(&self) -> Severity {
        match self {
            SyncError::Validation(_) | SyncError::Config(_) => Severity::Inline,
            SyncError::NotFound { .. } | SyncError::IdentityUnavailable(_) => Severity::Ignored,
            _ => Severity::Indicator,
        }
    }

    /// Shorthand for a not-found error on `kind`.
    pub fn not_found(kind: CollectionKind, id: impl ToString) -> Self {
        SyncError::NotFound {
            kind,
            id: id.to_string(),
        }
    }
}

/// Result type alias using SyncError
pub type SyncResult<T> = Result<T, SyncError>;
