//! Shared-list records and their ordered snapshots
//!
//! The four collection kinds share one CRUD shape. [`Entity`] captures what
//! differs between them: the collection they live in, the draft a member
//! submits, and the rule that turns a draft into a writable body.
//!
//! Records reach the engine as [`StoredRecord`]s and are normalised into a
//! [`Snapshot`]: decoded, sorted by `createdAt` ascending, records without a
//! timestamp last, arrival order breaking ties.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::warn;

use crate::error::{SyncError, SyncResult};
use crate::store::StoredRecord;
use crate::types::{CollectionKind, Identity, RecordId};

pub mod announcement;
pub mod checklist;
pub mod expense;
pub mod poll;

pub use announcement::{Announcement, AnnouncementDraft};
pub use checklist::{ChecklistDraft, ChecklistItem};
pub use expense::{expense_total, format_amount, Expense, ExpenseDraft};
pub use poll::{Poll, PollDraft, PollOption};

/// A record kind stored in one of the session's collections
pub trait Entity: Serialize + DeserializeOwned + Clone + fmt::Debug + Send + Sync + 'static {
    /// Collection this kind lives in
    const KIND: CollectionKind;

    /// What a member submits from a form
    type Draft: Send;

    /// Validated fields written to the store, minus the stamp
    type Body: Serialize + Send;

    /// Check a draft and produce the body to write.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::Validation` when the draft breaks the kind's
    /// constraints. Nothing is written in that case.
    fn validate(draft: Self::Draft) -> SyncResult<Self::Body>;

    fn id(&self) -> RecordId;

    fn created_at(&self) -> Option<DateTime<Utc>>;
}

/// Body plus creation stamp, as written to the store
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Stamped<B> {
    #[serde(flatten)]
    pub body: B,
    pub created_at: DateTime<Utc>,
    pub created_by: Identity,
}

/// Reject blank text, returning the trimmed value.
pub(crate) fn required_text(field: &str, value: &str) -> SyncResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(SyncError::Validation(format!("{} must not be empty", field)));
    }
    Ok(trimmed.to_string())
}

/// One decoded record with its store bookkeeping
#[derive(Debug, Clone)]
pub struct Entry<E> {
    pub record: E,
    /// Store revision, bumped on every update
    pub revision: u64,
    /// Arrival order within the session
    pub sequence: u64,
}

impl<E: Entity> Entry<E> {
    /// Decode a stored record into a typed entry.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::Serialization` if the stored fields do not match
    /// the kind's shape.
    pub fn decode(stored: &StoredRecord) -> SyncResult<Self> {
        let mut fields = match &stored.fields {
            serde_json::Value::Object(map) => map.clone(),
            other => {
                return Err(SyncError::Serialization(format!(
                    "record {} is not an object: {}",
                    stored.id, other
                )))
            }
        };
        fields.insert(
            "id".to_string(),
            serde_json::Value::String(stored.id.to_string()),
        );
        let record: E = serde_json::from_value(serde_json::Value::Object(fields))
            .map_err(|e| SyncError::Serialization(format!("record {}: {}", stored.id, e)))?;
        Ok(Self {
            record,
            revision: stored.revision,
            sequence: stored.sequence,
        })
    }
}

/// Full ordered state of one collection at one moment
///
/// Cheap to clone; every delivery to a subscriber is one of these.
#[derive(Debug, Clone)]
pub struct Snapshot<E> {
    entries: Arc<Vec<Entry<E>>>,
}

impl<E: Entity> Snapshot<E> {
    pub fn empty() -> Self {
        Self {
            entries: Arc::new(Vec::new()),
        }
    }

    /// Normalise raw store records.
    ///
    /// Records that fail to decode are skipped with a warning so one bad
    /// writer cannot blank the list for everyone.
    pub fn from_stored(records: &[StoredRecord]) -> Self {
        let entries = records
            .iter()
            .filter_map(|stored| match Entry::decode(stored) {
                Ok(entry) => Some(entry),
                Err(e) => {
                    warn!(kind = %E::KIND, id = %stored.id, error = %e, "Skipping malformed record");
                    None
                }
            })
            .collect();
        Self::from_entries(entries)
    }

    /// Order entries by creation time, missing timestamps last.
    pub fn from_entries(mut entries: Vec<Entry<E>>) -> Self {
        entries.sort_by(|a, b| {
            let ka = (a.record.created_at().is_none(), a.record.created_at(), a.sequence);
            let kb = (b.record.created_at().is_none(), b.record.created_at(), b.sequence);
            ka.cmp(&kb)
        });
        Self {
            entries: Arc::new(entries),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Records in display order
    pub fn iter(&self) -> impl Iterator<Item = &E> {
        self.entries.iter().map(|e| &e.record)
    }

    pub fn entries(&self) -> &[Entry<E>] {
        &self.entries
    }

    pub fn entry(&self, id: &RecordId) -> Option<&Entry<E>> {
        self.entries.iter().find(|e| e.record.id() == *id)
    }

    pub fn get(&self, id: &RecordId) -> Option<&E> {
        self.entry(id).map(|e| &e.record)
    }

    pub fn ids(&self) -> Vec<RecordId> {
        self.iter().map(|r| r.id()).collect()
    }

    pub fn to_vec(&self) -> Vec<E> {
        self.iter().cloned().collect()
    }
}

impl<E: Entity> Default for Snapshot<E> {
    fn default() -> Self {
        Self::empty()
    }
}
