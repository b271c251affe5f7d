//! Automerge document holding one session's four collections
//!
//! SessionDoc keeps a map per collection kind at the document root. Each
//! record is stored as a JSON string keyed by its id, so the document stays
//! schema-free while the typed view lives in [`crate::records`].

use automerge::{transaction::Transactable, AutoCommit, ObjId, ObjType, ReadDoc, ROOT};

use crate::error::SyncError;
use crate::store::StoredRecord;
use crate::types::{CollectionKind, RecordId};

/// Automerge document wrapper for a session's shared lists
///
/// # Example
///
/// ```
/// use tripsync_core::session::SessionDoc;
/// use tripsync_core::{CollectionKind, RecordId, StoredRecord};
///
/// let mut doc = SessionDoc::new();
/// let record = StoredRecord {
///     id: RecordId::new(),
///     sequence: doc.next_sequence(CollectionKind::Checklist).unwrap(),
///     revision: 1,
///     fields: serde_json::json!({"text": "Passports"}),
/// };
/// doc.put(CollectionKind::Checklist, &record).unwrap();
///
/// let records = doc.list(CollectionKind::Checklist).unwrap();
/// assert_eq!(records.len(), 1);
/// ```
pub struct SessionDoc {
    doc: AutoCommit,
}

fn am_err(e: impl std::fmt::Display) -> SyncError {
    SyncError::Automerge(e.to_string())
}

impl SessionDoc {
    /// Create a new empty session document
    ///
    /// Initializes one empty map per collection kind.
    pub fn new() -> Self {
        let mut doc = AutoCommit::new();
        for kind in CollectionKind::ALL {
            doc.put_object(ROOT, kind.segment(), ObjType::Map)
                .expect("fresh document accepts root maps");
        }
        Self { doc }
    }

    /// Load a session document from saved bytes
    ///
    /// # Errors
    ///
    /// Returns `SyncError::Automerge` if the bytes are not a valid Automerge document.
    pub fn load(data: &[u8]) -> Result<Self, SyncError> {
        let doc = AutoCommit::load(data).map_err(am_err)?;
        Ok(Self { doc })
    }

    /// Save the document to bytes
    pub fn save(&mut self) -> Vec<u8> {
        self.doc.save()
    }

    /// Fork the document for an independent replica
    pub fn fork(&mut self) -> Self {
        Self {
            doc: self.doc.fork(),
        }
    }

    /// Merge another replica into this one
    ///
    /// Concurrent inserts from both sides survive. Concurrent writes to the
    /// same record resolve to one of them deterministically.
    pub fn merge(&mut self, other: &mut SessionDoc) -> Result<(), SyncError> {
        self.doc.merge(&mut other.doc).map_err(am_err)?;
        Ok(())
    }

    fn collection(&self, kind: CollectionKind) -> Result<Option<ObjId>, SyncError> {
        Ok(self
            .doc
            .get(ROOT, kind.segment())
            .map_err(am_err)?
            .map(|(_, id)| id))
    }

    fn collection_mut(&mut self, kind: CollectionKind) -> Result<ObjId, SyncError> {
        match self.collection(kind)? {
            Some(id) => Ok(id),
            None => self
                .doc
                .put_object(ROOT, kind.segment(), ObjType::Map)
                .map_err(am_err),
        }
    }

    /// Insert or overwrite a record
    pub fn put(&mut self, kind: CollectionKind, record: &StoredRecord) -> Result<(), SyncError> {
        let obj = self.collection_mut(kind)?;
        let json =
            serde_json::to_string(record).map_err(|e| SyncError::Serialization(e.to_string()))?;
        self.doc
            .put(&obj, record.id.to_string(), json)
            .map_err(am_err)?;
        Ok(())
    }

    /// Get a record by id
    ///
    /// # Errors
    ///
    /// Returns `SyncError::Serialization` if the stored value is corrupted.
    pub fn get(&self, kind: CollectionKind, id: &RecordId) -> Result<Option<StoredRecord>, SyncError> {
        let Some(obj) = self.collection(kind)? else {
            return Ok(None);
        };
        match self.doc.get(&obj, id.to_string()).map_err(am_err)? {
            Some((value, _)) => {
                let json = value
                    .to_str()
                    .ok_or_else(|| SyncError::Serialization("record value is not a string".into()))?;
                let record = serde_json::from_str(json)
                    .map_err(|e| SyncError::Serialization(e.to_string()))?;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    /// Remove a record, returning whether it existed
    pub fn remove(&mut self, kind: CollectionKind, id: &RecordId) -> Result<bool, SyncError> {
        let Some(obj) = self.collection(kind)? else {
            return Ok(false);
        };
        let key = id.to_string();
        if self.doc.get(&obj, key.as_str()).map_err(am_err)?.is_none() {
            return Ok(false);
        }
        self.doc.delete(&obj, key).map_err(am_err)?;
        Ok(true)
    }

    /// All records of a collection in arrival order
    ///
    /// Values that fail to parse are skipped.
    pub fn list(&self, kind: CollectionKind) -> Result<Vec<StoredRecord>, SyncError> {
        let mut records = Vec::new();
        if let Some(obj) = self.collection(kind)? {
            for key in self.doc.keys(&obj) {
                if let Some((value, _)) = self.doc.get(&obj, key.as_str()).map_err(am_err)? {
                    if let Some(json) = value.to_str() {
                        if let Ok(record) = serde_json::from_str::<StoredRecord>(json) {
                            records.push(record);
                        }
                    }
                }
            }
        }
        records.sort_by_key(|r| (r.sequence, r.id));
        Ok(records)
    }

    /// Next arrival sequence number for a collection
    pub fn next_sequence(&self, kind: CollectionKind) -> Result<u64, SyncError> {
        Ok(self
            .list(kind)?
            .iter()
            .map(|r| r.sequence)
            .max()
            .map_or(1, |max| max + 1))
    }
}

impl Default for SessionDoc {
    fn default() -> Self {
        Self::new()
    }
}
