//! Shared packing checklist

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{required_text, Entity};
use crate::error::SyncResult;
use crate::types::{CollectionKind, Identity, RecordId};

/// One line of the group checklist
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChecklistItem {
    pub id: RecordId,
    pub text: String,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    pub created_by: Identity,
}

/// Checklist form input
#[derive(Debug, Clone)]
pub struct ChecklistDraft {
    pub text: String,
}

impl ChecklistDraft {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

#[derive(Debug, Serialize)]
pub struct ChecklistBody {
    text: String,
}

impl Entity for ChecklistItem {
    const KIND: CollectionKind = CollectionKind::Checklist;
    type Draft = ChecklistDraft;
    type Body = ChecklistBody;

    fn validate(draft: ChecklistDraft) -> SyncResult<ChecklistBody> {
        Ok(ChecklistBody {
            text: required_text("checklist item", &draft.text)?,
        })
    }

    fn id(&self) -> RecordId {
        self.id
    }

    fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }
}
