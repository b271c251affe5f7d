//! Live snapshot subscriptions
//!
//! Each [`Subscription`] owns one background task holding one change feed on
//! the store. The task normalises every snapshot it receives, writes it to the
//! session mirror and hands it to the subscriber.
//!
//! ```text
//! store.watch ──► initial ──► publish ──► Live
//!      ▲              changes ──► publish
//!      │              lagged  ──► store.list ──► publish
//!      │              closed / error
//!      └── sleep(reconnect) ◄── Stale(reason), mirror kept as-is
//! ```
//!
//! Cancelling (or dropping) the subscription stops the task at its next
//! await point. Anything it was about to deliver is discarded.

use std::sync::Arc;
use std::time::Duration;

use futures::Stream;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::events::SyncStatus;
use super::mirror::{Mirrored, Mirrors};
use crate::records::Snapshot;
use crate::store::{SessionStore, StoredRecord};
use crate::types::{CollectionKind, CollectionPath};

/// A live, cancelable stream of full snapshots of one collection
///
/// Slow consumers never block the feed: if several snapshots arrive between
/// two calls to [`Subscription::next`], only the newest is returned.
pub struct Subscription<E: Mirrored> {
    kind: CollectionKind,
    rx: watch::Receiver<Option<Snapshot<E>>>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl<E: Mirrored> Subscription<E> {
    pub(crate) fn spawn(
        store: Arc<dyn SessionStore>,
        path: CollectionPath,
        mirrors: Arc<Mirrors>,
        reconnect: Duration,
    ) -> Self {
        let (tx, rx) = watch::channel(None);
        let cancel = CancellationToken::new();
        let kind = path.kind;

        mirrors.get::<E>().attach();
        let feed = Feed {
            store,
            path,
            mirrors,
            tx,
            cancel: cancel.clone(),
            reconnect,
        };
        let task = tokio::spawn(feed.run());

        Self {
            kind,
            rx,
            cancel,
            task,
        }
    }

    pub fn kind(&self) -> CollectionKind {
        self.kind
    }

    /// Wait for the next snapshot.
    ///
    /// Returns `None` once the subscription is cancelled.
    pub async fn next(&mut self) -> Option<Snapshot<E>> {
        if self.cancel.is_cancelled() {
            return None;
        }
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            changed = self.rx.changed() => match changed {
                Ok(()) if !self.cancel.is_cancelled() => self.rx.borrow_and_update().clone(),
                _ => None,
            },
        }
    }

    /// Latest snapshot already delivered, without waiting
    pub fn latest(&self) -> Option<Snapshot<E>> {
        if self.cancel.is_cancelled() {
            return None;
        }
        self.rx.borrow().clone()
    }

    /// Stop deliveries and release the store channel.
    pub fn cancel(&self) {
        if !self.cancel.is_cancelled() {
            debug!(kind = %self.kind, "Cancelling subscription");
            self.cancel.cancel();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Whether the background task has exited
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// View the subscription as a `Stream` of snapshots.
    pub fn into_stream(self) -> impl Stream<Item = Snapshot<E>> {
        futures::stream::unfold(self, |mut sub| async move {
            sub.next().await.map(|snapshot| (snapshot, sub))
        })
    }
}

impl<E: Mirrored> Drop for Subscription<E> {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// State owned by a subscription's background task
struct Feed<E: Mirrored> {
    store: Arc<dyn SessionStore>,
    path: CollectionPath,
    mirrors: Arc<Mirrors>,
    tx: watch::Sender<Option<Snapshot<E>>>,
    cancel: CancellationToken,
    reconnect: Duration,
}

impl<E: Mirrored> Feed<E> {
    async fn run(self) {
        debug!(path = %self.path, "Subscription task started");
        self.mirrors.get::<E>().set_status(SyncStatus::Connecting);

        while !self.cancel.is_cancelled() {
            let opened = tokio::select! {
                _ = self.cancel.cancelled() => break,
                opened = self.store.watch(&self.path) => opened,
            };

            match opened {
                Ok(feed) => {
                    self.publish(&feed.initial);
                    self.follow(feed.changes).await;
                }
                Err(e) => {
                    warn!(path = %self.path, error = %e, "Failed to open change feed");
                    self.mark_stale(e.to_string());
                }
            }

            if !self.pause().await {
                break;
            }
            debug!(path = %self.path, "Reopening change feed");
        }

        self.mirrors.get::<E>().detach();
        debug!(path = %self.path, "Subscription task ended");
    }

    /// Deliver changes until the feed closes or the subscription is cancelled.
    async fn follow(&self, mut changes: broadcast::Receiver<Arc<Vec<StoredRecord>>>) {
        loop {
            let received = tokio::select! {
                _ = self.cancel.cancelled() => return,
                received = changes.recv() => received,
            };

            match received {
                Ok(records) => self.publish(&records),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    debug!(path = %self.path, skipped, "Change feed lagged, re-reading collection");
                    match self.store.list(&self.path).await {
                        Ok(records) => self.publish(&records),
                        Err(e) => {
                            warn!(path = %self.path, error = %e, "Re-read after lag failed");
                            self.mark_stale(e.to_string());
                            return;
                        }
                    }
                }
                Err(broadcast::error::RecvError::Closed) => {
                    warn!(path = %self.path, "Change feed closed");
                    self.mark_stale("change feed closed".to_string());
                    return;
                }
            }
        }
    }

    fn publish(&self, records: &[StoredRecord]) {
        if self.cancel.is_cancelled() {
            return;
        }
        let snapshot = Snapshot::<E>::from_stored(records);
        debug!(path = %self.path, records = snapshot.len(), "Snapshot delivered");

        let mirror = self.mirrors.get::<E>();
        mirror.publish(snapshot.clone());
        mirror.set_status(SyncStatus::Live);
        self.tx.send_replace(Some(snapshot));
    }

    fn mark_stale(&self, reason: String) {
        if !self.cancel.is_cancelled() {
            self.mirrors.get::<E>().set_status(SyncStatus::Stale(reason));
        }
    }

    /// Sleep before reconnecting; `false` if cancelled meanwhile.
    async fn pause(&self) -> bool {
        tokio::select! {
            _ = self.cancel.cancelled() => false,
            _ = tokio::time::sleep(self.reconnect) => true,
        }
    }
}
