//! # TripSync Core
//!
//! Real-time shared lists for a group trip. Every member of a session sees
//! the same checklist, expenses, announcements and polls, updated live.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │  SyncEngine (one per client per session)                     │
//! │  ├── identity: IdentityState (Connecting / Ready / ...)      │
//! │  ├── mirrors: last-known-good Snapshot + SyncStatus per kind │
//! │  ├── subscriptions: one task + one change feed each          │
//! │  └── vote: compare-and-swap on the poll's revision           │
//! └──────────────────────────────┬───────────────────────────────┘
//!                                │ SessionStore
//! ┌──────────────────────────────▼───────────────────────────────┐
//! │  LocalStore                                                  │
//! │  └── SessionDoc (Automerge) per session ──► Storage (redb)   │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Collections live at `{namespace}/public/data/{session}/{kind}`.

pub mod config;
pub mod engine;
pub mod error;
pub mod identity;
pub mod logging;
pub mod records;
pub mod session;
pub mod storage;
pub mod store;
pub mod sync;
pub mod types;
pub mod vote;

pub use config::SyncConfig;
pub use engine::SyncEngine;
pub use error::{Severity, SyncError, SyncResult};
pub use identity::{AnonymousIdentity, IdentityProvider, IdentityState, TokenIdentity};
pub use records::{
    expense_total, format_amount, Announcement, AnnouncementDraft, ChecklistDraft,
    ChecklistItem, Entity, Entry, Expense, ExpenseDraft, Poll, PollDraft, PollOption, Snapshot,
};
pub use storage::Storage;
pub use store::{ChangeFeed, LocalStore, SessionPersistence, SessionStore, StoredRecord};
pub use sync::{Mirrored, Subscription, SyncStatus};
pub use types::{CollectionKind, CollectionPath, Identity, RecordId, SessionId};
pub use vote::{resolve_vote, VoteDecision, VoteOutcome};
