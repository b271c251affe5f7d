//! Persistent storage using redb.
//!
//! This module provides ACID-compliant storage for:
//! - Session documents (Automerge blobs, one per session)
//! - The client's anonymous identity

use crate::error::SyncError;
use crate::types::Identity;
use parking_lot::RwLock;
use redb::{Database, ReadableTable, TableDefinition};
use std::path::Path;
use std::sync::Arc;

// Table definitions
const SESSIONS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("sessions");
const IDENTITY_TABLE: TableDefinition<&str, &str> = TableDefinition::new("identity");

/// Storage layer using redb for ACID-compliant persistence
#[derive(Clone)]
pub struct Storage {
    db: Arc<RwLock<Database>>,
}

impl Storage {
    /// Create a new storage instance at the given path.
    ///
    /// Creates the parent directory and all tables if needed.
    pub fn new(path: impl AsRef<Path>) -> Result<Self, SyncError> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let db = Database::create(path)?;

        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(SESSIONS_TABLE)?;
            let _ = write_txn.open_table(IDENTITY_TABLE)?;
        }
        write_txn.commit()?;

        Ok(Self {
            db: Arc::new(RwLock::new(db)),
        })
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Session Document Operations
    // ═══════════════════════════════════════════════════════════════════════

    /// Save a session document, overwriting any previous version.
    pub fn save_session(&self, session_key: &str, data: &[u8]) -> Result<(), SyncError> {
        let db = self.db.read();
        let write_txn = db.begin_write()?;
        {
            let mut table = write_txn.open_table(SESSIONS_TABLE)?;
            table.insert(session_key, data)?;
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Load a session document.
    ///
    /// Returns `None` if the session has never been written.
    pub fn load_session(&self, session_key: &str) -> Result<Option<Vec<u8>>, SyncError> {
        let db = self.db.read();
        let read_txn = db.begin_read()?;
        let table = read_txn.open_table(SESSIONS_TABLE)?;
        Ok(table.get(session_key)?.map(|v| v.value().to_vec()))
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Identity Operations
    // ═══════════════════════════════════════════════════════════════════════

    /// Identity storage key (one anonymous identity per client)
    const IDENTITY_KEY: &'static str = "anonymous_identity";

    /// Save the client's anonymous identity.
    pub fn save_identity(&self, identity: &Identity) -> Result<(), SyncError> {
        let db = self.db.read();
        let write_txn = db.begin_write()?;
        {
            let mut table = write_txn.open_table(IDENTITY_TABLE)?;
            table.insert(Self::IDENTITY_KEY, identity.as_str())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Load the client's anonymous identity.
    ///
    /// Returns `None` if no identity has been created yet.
    pub fn load_identity(&self) -> Result<Option<Identity>, SyncError> {
        let db = self.db.read();
        let read_txn = db.begin_read()?;
        let table = read_txn.open_table(IDENTITY_TABLE)?;

        match table.get(Self::IDENTITY_KEY)? {
            Some(v) => Ok(Some(Identity::new(v.value())?)),
            None => Ok(None),
        }
    }
}
