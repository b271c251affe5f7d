//! Last-known-good local copy of each collection
//!
//! Every snapshot a subscription receives is also written here, so the
//! engine can answer reads and the vote resolver has a poll to start from
//! even while the store is unreachable.

use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::watch;

use super::events::SyncStatus;
use crate::records::{Announcement, ChecklistItem, Entity, Expense, Poll, Snapshot};

/// Local copy of one collection plus its feed status
pub struct Mirror<E: Entity> {
    snapshot: watch::Sender<Option<Snapshot<E>>>,
    status: watch::Sender<SyncStatus>,
    feeds: AtomicUsize,
}

impl<E: Entity> Mirror<E> {
    pub fn new() -> Self {
        Self {
            snapshot: watch::Sender::new(None),
            status: watch::Sender::new(SyncStatus::Idle),
            feeds: AtomicUsize::new(0),
        }
    }

    /// Most recent snapshot, `None` until the first load or delivery
    pub fn current(&self) -> Option<Snapshot<E>> {
        self.snapshot.borrow().clone()
    }

    pub fn publish(&self, snapshot: Snapshot<E>) {
        self.snapshot.send_replace(Some(snapshot));
    }

    pub fn status(&self) -> SyncStatus {
        self.status.borrow().clone()
    }

    pub fn set_status(&self, status: SyncStatus) {
        self.status.send_if_modified(|current| {
            if *current == status {
                false
            } else {
                *current = status;
                true
            }
        });
    }

    pub fn watch_status(&self) -> watch::Receiver<SyncStatus> {
        self.status.subscribe()
    }

    /// Number of subscription tasks feeding this mirror
    pub fn active_feeds(&self) -> usize {
        self.feeds.load(Ordering::SeqCst)
    }

    pub(crate) fn attach(&self) {
        self.feeds.fetch_add(1, Ordering::SeqCst);
    }

    /// The last feed to detach returns the collection to `Idle`.
    pub(crate) fn detach(&self) {
        if self.feeds.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.set_status(SyncStatus::Idle);
        }
    }
}

impl<E: Entity> Default for Mirror<E> {
    fn default() -> Self {
        Self::new()
    }
}

/// The four mirrors of one session
#[derive(Default)]
pub struct Mirrors {
    checklist: Mirror<ChecklistItem>,
    expenses: Mirror<Expense>,
    announcements: Mirror<Announcement>,
    polls: Mirror<Poll>,
}

impl Mirrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get<E: Mirrored>(&self) -> &Mirror<E> {
        E::mirror(self)
    }
}

/// A record kind the engine keeps a mirror for
pub trait Mirrored: Entity {
    fn mirror(mirrors: &Mirrors) -> &Mirror<Self>;
}

impl Mirrored for ChecklistItem {
    fn mirror(mirrors: &Mirrors) -> &Mirror<Self> {
        &mirrors.checklist
    }
}

impl Mirrored for Expense {
    fn mirror(mirrors: &Mirrors) -> &Mirror<Self> {
        &mirrors.expenses
    }
}

impl Mirrored for Announcement {
    fn mirror(mirrors: &Mirrors) -> &Mirror<Self> {
        &mirrors.announcements
    }
}

impl Mirrored for Poll {
    fn mirror(mirrors: &Mirrors) -> &Mirror<Self> {
        &mirrors.polls
    }
}
