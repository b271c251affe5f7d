//! Group polls
//!
//! A poll is created with at least two options and is only ever changed by
//! votes. Vote application lives in [`crate::vote`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{required_text, Entity};
use crate::error::{SyncError, SyncResult};
use crate::types::{CollectionKind, Identity, RecordId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollOption {
    pub text: String,
    #[serde(default)]
    pub votes: u32,
}

/// A question put to the group
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Poll {
    pub id: RecordId,
    pub question: String,
    pub options: Vec<PollOption>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    pub created_by: Identity,
    /// Identities that have voted, at most once each
    #[serde(default)]
    pub voted_by: Vec<Identity>,
}

impl Poll {
    pub fn has_voted(&self, identity: &Identity) -> bool {
        self.voted_by.contains(identity)
    }

    pub fn total_votes(&self) -> u64 {
        self.options.iter().map(|o| u64::from(o.votes)).sum()
    }

    /// Width of an option's bar relative to the leading option.
    ///
    /// `votes / max(most_votes, 1)`, so an untouched poll renders empty
    /// bars and the leader always renders full. Out-of-range indexes give 0.
    pub fn bar_fraction(&self, index: usize) -> f64 {
        let leader = self.options.iter().map(|o| o.votes).max().unwrap_or(0).max(1);
        self.options
            .get(index)
            .map(|o| f64::from(o.votes) / f64::from(leader))
            .unwrap_or(0.0)
    }
}

/// Poll form input, built up one option at a time
#[derive(Debug, Clone, Default)]
pub struct PollDraft {
    pub question: String,
    pub options: Vec<String>,
}

impl PollDraft {
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            options: Vec::new(),
        }
    }

    /// Add an option; blank text is ignored.
    pub fn push_option(&mut self, text: impl AsRef<str>) -> &mut Self {
        let text = text.as_ref().trim();
        if !text.is_empty() {
            self.options.push(text.to_string());
        }
        self
    }

    pub fn with_options<I, S>(mut self, options: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for option in options {
            self.push_option(option);
        }
        self
    }

    /// Whether the create button should be enabled
    pub fn is_ready(&self) -> bool {
        !self.question.trim().is_empty() && self.options.len() >= 2
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PollBody {
    question: String,
    options: Vec<PollOption>,
    voted_by: Vec<Identity>,
}

impl Entity for Poll {
    const KIND: CollectionKind = CollectionKind::Polls;
    type Draft = PollDraft;
    type Body = PollBody;

    fn validate(draft: PollDraft) -> SyncResult<PollBody> {
        let question = required_text("poll question", &draft.question)?;
        let options: Vec<PollOption> = draft
            .options
            .iter()
            .map(|o| o.trim())
            .filter(|o| !o.is_empty())
            .map(|text| PollOption {
                text: text.to_string(),
                votes: 0,
            })
            .collect();
        if options.len() < 2 {
            return Err(SyncError::Validation(format!(
                "a poll needs at least two options, got {}",
                options.len()
            )));
        }
        Ok(PollBody {
            question,
            options,
            voted_by: Vec::new(),
        })
    }

    fn id(&self) -> RecordId {
        self.id
    }

    fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn poll(votes: &[u32]) -> Poll {
        Poll {
            id: RecordId::new(),
            question: "Where?".into(),
            options: votes
                .iter()
                .enumerate()
                .map(|(i, v)| PollOption {
                    text: format!("option {}", i),
                    votes: *v,
                })
                .collect(),
            created_at: None,
            created_by: Identity::new("u1").unwrap(),
            voted_by: Vec::new(),
        }
    }

    #[test]
    fn test_needs_two_options() {
        let draft = PollDraft::new("Beach or Mountains?").with_options(["Beach"]);
        assert!(!draft.is_ready());
        assert!(matches!(
            Poll::validate(draft),
            Err(SyncError::Validation(_))
        ));
    }

    #[test]
    fn test_blank_options_ignored() {
        let mut draft = PollDraft::new("Beach or Mountains?");
        draft.push_option("Beach").push_option("   ").push_option("Mountains");
        assert_eq!(draft.options, vec!["Beach", "Mountains"]);
        assert!(draft.is_ready());
    }

    #[test]
    fn test_body_starts_with_zero_votes() {
        let body =
            Poll::validate(PollDraft::new("Beach or Mountains?").with_options(["Beach", "Mountains"]))
                .unwrap();
        assert_eq!(
            serde_json::to_value(&body).unwrap(),
            serde_json::json!({
                "question": "Beach or Mountains?",
                "options": [{"text": "Beach", "votes": 0}, {"text": "Mountains", "votes": 0}],
                "votedBy": []
            })
        );
    }

    #[test]
    fn test_bar_fraction() {
        let p = poll(&[0, 0]);
        assert_eq!(p.bar_fraction(0), 0.0);

        let p = poll(&[1, 4]);
        assert_eq!(p.bar_fraction(0), 0.25);
        assert_eq!(p.bar_fraction(1), 1.0);
        assert_eq!(p.bar_fraction(9), 0.0);
        assert_eq!(p.total_votes(), 5);
    }

    #[test]
    fn test_missing_voted_by_defaults_empty() {
        let json = serde_json::json!({
            "id": RecordId::new().to_string(),
            "question": "Q",
            "options": [{"text": "a"}, {"text": "b", "votes": 2}],
            "createdBy": "u1"
        });
        let parsed: Poll = serde_json::from_value(json).unwrap();
        assert!(parsed.voted_by.is_empty());
        assert_eq!(parsed.options[0].votes, 0);
    }
}
