//! Poll voting
//!
//! Each identity votes at most once per poll. A vote is one conditional
//! update of `options` and `votedBy` together, checked against the poll's
//! store revision:
//!
//! ```text
//! read poll (mirror, else store)
//!   │
//!   ├── identity in votedBy ──────────────► AlreadyVoted (no write)
//!   │
//!   └── update(expected_revision)
//!         ├── ok ─────────────────────────► Recorded
//!         └── conflict ─► re-read from store, try again
//!                         (max_vote_retries, then Conflict error)
//! ```
//!
//! Re-reading on conflict means a concurrent vote from another client is
//! folded into ours rather than overwritten.

use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::engine::SyncEngine;
use crate::error::{SyncError, SyncResult};
use crate::records::{Entry, Poll, PollOption};
use crate::types::{CollectionKind, CollectionPath, Identity, RecordId};

/// What a vote should do to a given version of a poll
#[derive(Debug, Clone, PartialEq)]
pub enum VoteDecision {
    /// Identity already counted; write nothing
    AlreadyVoted,
    /// Write these fields
    Apply {
        options: Vec<PollOption>,
        voted_by: Vec<Identity>,
    },
}

/// Decide the effect of `identity` voting for `option_index` on `poll`.
///
/// # Errors
///
/// `SyncError::Validation` if `option_index` is out of range and the
/// identity has not voted yet.
pub fn resolve_vote(
    poll: &Poll,
    option_index: usize,
    identity: &Identity,
) -> SyncResult<VoteDecision> {
    if poll.has_voted(identity) {
        return Ok(VoteDecision::AlreadyVoted);
    }
    if option_index >= poll.options.len() {
        return Err(SyncError::Validation(format!(
            "option {} does not exist; poll has {} options",
            option_index,
            poll.options.len()
        )));
    }

    let mut options = poll.options.clone();
    options[option_index].votes = options[option_index].votes.saturating_add(1);
    let mut voted_by = poll.voted_by.clone();
    voted_by.push(identity.clone());

    Ok(VoteDecision::Apply { options, voted_by })
}

/// Result of [`SyncEngine::vote`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VoteOutcome {
    /// Vote written; the poll is now at `revision`
    Recorded { revision: u64 },
    /// This identity had already voted; nothing changed
    AlreadyVoted,
}

impl SyncEngine {
    /// Vote for option `option_index` of poll `poll_id` as the current
    /// identity.
    ///
    /// Voting twice is a no-op returning `VoteOutcome::AlreadyVoted`.
    ///
    /// # Errors
    ///
    /// - `SyncError::IdentityUnavailable` before an identity is ready
    /// - `SyncError::Validation` for an out-of-range option
    /// - `SyncError::NotFound` if the poll is gone
    /// - `SyncError::Conflict` if every retry lost to a concurrent writer
    pub async fn vote(&self, poll_id: &RecordId, option_index: usize) -> SyncResult<VoteOutcome> {
        let result = self.vote_inner(poll_id, option_index).await;
        self.observe("vote", CollectionKind::Polls, result)
    }

    async fn vote_inner(&self, poll_id: &RecordId, option_index: usize) -> SyncResult<VoteOutcome> {
        let identity = self.require_identity()?;
        let path = self.path(CollectionKind::Polls);

        let mut current = match self.snapshot::<Poll>().and_then(|s| s.entry(poll_id).cloned()) {
            Some(entry) => entry,
            None => self.fetch_poll(&path, poll_id).await?,
        };

        let attempts = self.config().max_vote_retries.saturating_add(1);
        for attempt in 1..=attempts {
            let (options, voted_by) = match resolve_vote(&current.record, option_index, &identity)? {
                VoteDecision::AlreadyVoted => {
                    debug!(poll = %poll_id, %identity, "Already voted");
                    return Ok(VoteOutcome::AlreadyVoted);
                }
                VoteDecision::Apply { options, voted_by } => (options, voted_by),
            };

            let patch = vote_patch(options, voted_by)?;
            match self
                .store()
                .update(&path, poll_id, current.revision, patch)
                .await
            {
                Ok(revision) => {
                    info!(poll = %poll_id, option = option_index, %identity, revision, "Vote recorded");
                    return Ok(VoteOutcome::Recorded { revision });
                }
                Err(SyncError::Conflict(reason)) => {
                    debug!(poll = %poll_id, attempt, %reason, "Vote lost a race, re-reading poll");
                    current = self.fetch_poll(&path, poll_id).await?;
                }
                Err(e) => return Err(e),
            }
        }

        Err(SyncError::Conflict(format!(
            "vote on poll {} kept conflicting after {} attempts",
            poll_id, attempts
        )))
    }

    async fn fetch_poll(&self, path: &CollectionPath, poll_id: &RecordId) -> SyncResult<Entry<Poll>> {
        let stored = self
            .store()
            .get(path, poll_id)
            .await?
            .ok_or_else(|| SyncError::not_found(CollectionKind::Polls, poll_id))?;
        Entry::decode(&stored)
    }
}

fn vote_patch(options: Vec<PollOption>, voted_by: Vec<Identity>) -> SyncResult<Map<String, Value>> {
    let to_value = |v: serde_json::Result<Value>| v.map_err(|e| SyncError::Serialization(e.to_string()));
    let mut patch = Map::new();
    patch.insert("options".to_string(), to_value(serde_json::to_value(options))?);
    patch.insert("votedBy".to_string(), to_value(serde_json::to_value(voted_by))?);
    Ok(patch)
}
