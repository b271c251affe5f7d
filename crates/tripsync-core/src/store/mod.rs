//! Session store interface
//!
//! The engine talks to the hosted document store only through
//! [`SessionStore`]. A store owns durable state for many sessions and
//! pushes a full snapshot of a collection to every watcher whenever that
//! collection changes.
//!
//! ## Contract
//!
//! ```text
//! add     → assigns id, sequence, revision 1
//! update  → merges top-level fields iff revision matches, bumps revision
//! remove  → NotFound if the id is absent
//! watch   → current snapshot now, then one snapshot per committed change
//! ```
//!
//! Every method is an await point. Implementations serialise writes per
//! document; nothing else is promised across documents or collections.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::error::SyncResult;
use crate::types::{CollectionPath, RecordId};

pub mod local;

pub use local::{LocalStore, SessionPersistence};

/// A record as the store keeps it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRecord {
    pub id: RecordId,
    /// Arrival order within the session, assigned on add
    pub sequence: u64,
    /// Starts at 1, incremented by every update
    pub revision: u64,
    /// Record fields without the id
    pub fields: serde_json::Value,
}

/// Live change feed for one collection
pub struct ChangeFeed {
    /// State at the moment the feed was opened
    pub initial: Vec<StoredRecord>,
    /// One full snapshot per committed change
    pub changes: broadcast::Receiver<Arc<Vec<StoredRecord>>>,
}

/// Hosted document store holding every session's collections
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Write a new record and return its store-assigned id.
    async fn add(&self, path: &CollectionPath, fields: serde_json::Value) -> SyncResult<RecordId>;

    /// Fetch one record.
    async fn get(&self, path: &CollectionPath, id: &RecordId) -> SyncResult<Option<StoredRecord>>;

    /// Fetch the whole collection in arrival order.
    async fn list(&self, path: &CollectionPath) -> SyncResult<Vec<StoredRecord>>;

    /// Delete a record.
    ///
    /// # Errors
    ///
    /// `SyncError::NotFound` if no record has this id.
    async fn remove(&self, path: &CollectionPath, id: &RecordId) -> SyncResult<()>;

    /// Conditionally merge `patch` into a record's top-level fields.
    ///
    /// Returns the new revision.
    ///
    /// # Errors
    ///
    /// `SyncError::Conflict` if the record's revision is no longer
    /// `expected_revision`; `SyncError::NotFound` if it is gone.
    async fn update(
        &self,
        path: &CollectionPath,
        id: &RecordId,
        expected_revision: u64,
        patch: serde_json::Map<String, serde_json::Value>,
    ) -> SyncResult<u64>;

    /// Open a change feed on a collection.
    async fn watch(&self, path: &CollectionPath) -> SyncResult<ChangeFeed>;
}
