use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{required_text, Entity};
use crate::error::SyncResult;
use crate::types::{CollectionKind, Identity, RecordId};

/// A message pinned for the whole group
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Announcement {
    pub id: RecordId,
    pub text: String,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    pub created_by: Identity,
}

#[derive(Debug, Clone)]
pub struct AnnouncementDraft {
    pub text: String,
}

impl AnnouncementDraft {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

#[derive(Debug, Serialize)]
pub struct AnnouncementBody {
    text: String,
}

impl Entity for Announcement {
    const KIND: CollectionKind = CollectionKind::Announcements;
    type Draft = AnnouncementDraft;
    type Body = AnnouncementBody;

    fn validate(draft: AnnouncementDraft) -> SyncResult<AnnouncementBody> {
        Ok(AnnouncementBody {
            text: required_text("announcement", &draft.text)?,
        })
    }

    fn id(&self) -> RecordId {
        self.id
    }

    fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }
}
