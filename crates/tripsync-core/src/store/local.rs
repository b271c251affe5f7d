//! In-process session store backed by Automerge documents
//!
//! `LocalStore` keeps one [`SessionDoc`] per session and, when given a
//! [`Storage`], persists each document to redb after every committed write.
//! Clones share state, so several engines on one `LocalStore` behave like
//! several clients of the same hosted store.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  LocalStore                                                 │
//! │  ├── sessions: session key → SessionDoc                     │
//! │  ├── feeds: collection path → broadcast::Sender<snapshot>   │
//! │  ├── persistence: Option<dyn SessionPersistence> (redb)     │
//! │  └── reachable: simulated connectivity                      │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Writes and feed notifications happen under the same lock, so every
//! watcher sees snapshots in commit order. A write that cannot be persisted
//! is discarded from memory as well, and watchers never see it.

use std::collections::hash_map::Entry as MapEntry;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use super::{ChangeFeed, SessionStore, StoredRecord};
use crate::error::{SyncError, SyncResult};
use crate::session::SessionDoc;
use crate::storage::Storage;
use crate::types::{CollectionPath, RecordId};

/// Snapshots buffered per watcher before it starts lagging
const FEED_CHANNEL_CAPACITY: usize = 64;

type FeedSender = broadcast::Sender<Arc<Vec<StoredRecord>>>;

/// Durable home for saved session documents
pub trait SessionPersistence: Send + Sync {
    fn load_session(&self, session_key: &str) -> SyncResult<Option<Vec<u8>>>;

    fn save_session(&self, session_key: &str, data: &[u8]) -> SyncResult<()>;
}

impl SessionPersistence for Storage {
    fn load_session(&self, session_key: &str) -> SyncResult<Option<Vec<u8>>> {
        Storage::load_session(self, session_key)
    }

    fn save_session(&self, session_key: &str, data: &[u8]) -> SyncResult<()> {
        Storage::save_session(self, session_key, data)
    }
}

struct Inner {
    sessions: Mutex<HashMap<String, SessionDoc>>,
    feeds: Mutex<HashMap<CollectionPath, FeedSender>>,
    persistence: Option<Arc<dyn SessionPersistence>>,
    reachable: AtomicBool,
}

/// Session store living in this process
#[derive(Clone)]
pub struct LocalStore {
    inner: Arc<Inner>,
}

impl LocalStore {
    /// Store that forgets everything when dropped
    pub fn in_memory() -> Self {
        Self::build(None)
    }

    /// Store that saves every session document to redb
    pub fn persistent(storage: Storage) -> Self {
        Self::with_persistence(Arc::new(storage))
    }

    /// Store that saves every session document through `persistence`
    pub fn with_persistence(persistence: Arc<dyn SessionPersistence>) -> Self {
        Self::build(Some(persistence))
    }

    fn build(persistence: Option<Arc<dyn SessionPersistence>>) -> Self {
        Self {
            inner: Arc::new(Inner {
                sessions: Mutex::new(HashMap::new()),
                feeds: Mutex::new(HashMap::new()),
                persistence,
                reachable: AtomicBool::new(true),
            }),
        }
    }

    /// Simulate losing or regaining the connection to the store.
    ///
    /// Going offline closes every open change feed and makes all calls fail
    /// with `SyncError::Connectivity` until the store is reachable again.
    pub fn set_reachable(&self, reachable: bool) {
        let was = self.inner.reachable.swap(reachable, Ordering::SeqCst);
        if was && !reachable {
            info!("Session store went offline, closing change feeds");
            self.inner.feeds.lock().clear();
        } else if !was && reachable {
            info!("Session store back online");
        }
    }

    pub fn is_reachable(&self) -> bool {
        self.inner.reachable.load(Ordering::SeqCst)
    }

    fn ensure_reachable(&self) -> SyncResult<()> {
        if self.is_reachable() {
            Ok(())
        } else {
            Err(SyncError::Connectivity("session store unreachable".into()))
        }
    }

    fn load_doc(&self, key: &str) -> SyncResult<SessionDoc> {
        match &self.inner.persistence {
            Some(persistence) => match persistence.load_session(key)? {
                Some(bytes) => {
                    debug!(session = key, bytes = bytes.len(), "Loaded session document");
                    SessionDoc::load(&bytes)
                }
                None => Ok(SessionDoc::new()),
            },
            None => Ok(SessionDoc::new()),
        }
    }

    /// Run `f` against the session's document, loading it on first use.
    ///
    /// When `f` reports a change, the document is persisted and a fresh
    /// snapshot of the collection is pushed to its watchers before the
    /// lock is released. If persisting fails the cached document is
    /// dropped, so the next call reloads the last saved state.
    fn with_doc<R>(
        &self,
        path: &CollectionPath,
        f: impl FnOnce(&mut SessionDoc) -> SyncResult<(R, bool)>,
    ) -> SyncResult<R> {
        self.ensure_reachable()?;
        let key = path.session_key();
        let mut sessions = self.inner.sessions.lock();
        let doc = match sessions.entry(key.clone()) {
            MapEntry::Occupied(e) => e.into_mut(),
            MapEntry::Vacant(v) => {
                let doc = self.load_doc(&key)?;
                v.insert(doc)
            }
        };

        let (result, changed) = f(doc)?;
        if changed {
            if let Some(persistence) = &self.inner.persistence {
                if let Err(e) = persistence.save_session(&key, &doc.save()) {
                    warn!(session = %key, error = %e, "Failed to persist session, discarding write");
                    sessions.remove(&key);
                    return Err(e);
                }
            }
            self.notify(path, doc)?;
        }
        Ok(result)
    }

    fn notify(&self, path: &CollectionPath, doc: &SessionDoc) -> SyncResult<()> {
        let mut feeds = self.inner.feeds.lock();
        let Some(tx) = feeds.get(path) else {
            return Ok(());
        };
        if tx.receiver_count() == 0 {
            debug!(%path, "Last watcher gone, dropping change feed");
            feeds.remove(path);
            return Ok(());
        }
        let snapshot = Arc::new(doc.list(path.kind)?);
        // A receiver may drop between the count and the send.
        let _ = tx.send(snapshot);
        Ok(())
    }
}

#[async_trait]
impl SessionStore for LocalStore {
    async fn add(&self, path: &CollectionPath, fields: serde_json::Value) -> SyncResult<RecordId> {
        if !fields.is_object() {
            return Err(SyncError::Serialization(
                "record fields must be a JSON object".into(),
            ));
        }
        self.with_doc(path, |doc| {
            let record = StoredRecord {
                id: RecordId::new(),
                sequence: doc.next_sequence(path.kind)?,
                revision: 1,
                fields,
            };
            doc.put(path.kind, &record)?;
            debug!(%path, id = %record.id, sequence = record.sequence, "Record added");
            Ok((record.id, true))
        })
    }

    async fn get(&self, path: &CollectionPath, id: &RecordId) -> SyncResult<Option<StoredRecord>> {
        self.with_doc(path, |doc| Ok((doc.get(path.kind, id)?, false)))
    }

    async fn list(&self, path: &CollectionPath) -> SyncResult<Vec<StoredRecord>> {
        self.with_doc(path, |doc| Ok((doc.list(path.kind)?, false)))
    }

    async fn remove(&self, path: &CollectionPath, id: &RecordId) -> SyncResult<()> {
        self.with_doc(path, |doc| {
            if doc.remove(path.kind, id)? {
                debug!(%path, %id, "Record removed");
                Ok(((), true))
            } else {
                Err(SyncError::not_found(path.kind, id))
            }
        })
    }

    async fn update(
        &self,
        path: &CollectionPath,
        id: &RecordId,
        expected_revision: u64,
        patch: serde_json::Map<String, serde_json::Value>,
    ) -> SyncResult<u64> {
        self.with_doc(path, |doc| {
            let mut record = doc
                .get(path.kind, id)?
                .ok_or_else(|| SyncError::not_found(path.kind, id))?;
            if record.revision != expected_revision {
                return Err(SyncError::Conflict(format!(
                    "{}/{} is at revision {}, expected {}",
                    path.kind, id, record.revision, expected_revision
                )));
            }
            let fields = record.fields.as_object_mut().ok_or_else(|| {
                SyncError::Serialization(format!("record {} is not an object", id))
            })?;
            for (key, value) in patch {
                fields.insert(key, value);
            }
            record.revision += 1;
            doc.put(path.kind, &record)?;
            debug!(%path, %id, revision = record.revision, "Record updated");
            Ok((record.revision, true))
        })
    }

    async fn watch(&self, path: &CollectionPath) -> SyncResult<ChangeFeed> {
        self.with_doc(path, |doc| {
            let initial = doc.list(path.kind)?;
            let mut feeds = self.inner.feeds.lock();
            // set_reachable(false) flips the flag before clearing feeds
            self.ensure_reachable()?;
            let tx = feeds
                .entry(path.clone())
                .or_insert_with(|| broadcast::channel(FEED_CHANNEL_CAPACITY).0);
            let changes = tx.subscribe();
            debug!(%path, watchers = tx.receiver_count(), "Change feed opened");
            Ok((ChangeFeed { initial, changes }, false))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CollectionKind, SessionId};
    use serde_json::json;
    use tempfile::TempDir;

    fn path(session: &str, kind: CollectionKind) -> CollectionPath {
        CollectionPath::new("test", SessionId::new(session).unwrap(), kind)
    }

    #[tokio::test]
    async fn test_add_and_list() {
        let store = LocalStore::in_memory();
        let p = path("trip", CollectionKind::Checklist);

        let a = store.add(&p, json!({"text": "a"})).await.unwrap();
        let b = store.add(&p, json!({"text": "b"})).await.unwrap();
        assert_ne!(a, b);

        let records = store.list(&p).await.unwrap();
        assert_eq!(records.iter().map(|r| r.id).collect::<Vec<_>>(), vec![a, b]);
        assert!(records.iter().all(|r| r.revision == 1));
    }

    #[tokio::test]
    async fn test_add_rejects_non_object() {
        let store = LocalStore::in_memory();
        let p = path("trip", CollectionKind::Checklist);
        assert!(store.add(&p, json!("text")).await.is_err());
    }

    #[tokio::test]
    async fn test_sessions_do_not_leak() {
        let store = LocalStore::in_memory();
        let ours = path("trip-a", CollectionKind::Expenses);
        let theirs = path("trip-b", CollectionKind::Expenses);

        store.add(&ours, json!({"name": "Fuel"})).await.unwrap();
        assert!(store.list(&theirs).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_remove_missing_is_not_found() {
        let store = LocalStore::in_memory();
        let p = path("trip", CollectionKind::Announcements);
        let id = store.add(&p, json!({"text": "hi"})).await.unwrap();

        store.remove(&p, &id).await.unwrap();
        let err = store.remove(&p, &id).await.unwrap_err();
        assert!(matches!(err, SyncError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_update_is_compare_and_swap() {
        let store = LocalStore::in_memory();
        let p = path("trip", CollectionKind::Polls);
        let id = store
            .add(&p, json!({"question": "Q", "votedBy": []}))
            .await
            .unwrap();

        let mut patch = serde_json::Map::new();
        patch.insert("votedBy".into(), json!(["u1"]));
        let rev = store.update(&p, &id, 1, patch.clone()).await.unwrap();
        assert_eq!(rev, 2);

        let stale = store.update(&p, &id, 1, patch).await.unwrap_err();
        assert!(matches!(stale, SyncError::Conflict(_)));

        let record = store.get(&p, &id).await.unwrap().unwrap();
        assert_eq!(record.fields["question"], "Q");
        assert_eq!(record.fields["votedBy"], json!(["u1"]));
    }

    #[tokio::test]
    async fn test_watch_delivers_initial_then_changes() {
        let store = LocalStore::in_memory();
        let p = path("trip", CollectionKind::Checklist);
        store.add(&p, json!({"text": "a"})).await.unwrap();

        let mut feed = store.watch(&p).await.unwrap();
        assert_eq!(feed.initial.len(), 1);

        store.add(&p, json!({"text": "b"})).await.unwrap();
        let snapshot = feed.changes.recv().await.unwrap();
        assert_eq!(snapshot.len(), 2);

        // Other collections do not wake this feed
        store
            .add(&p.sibling(CollectionKind::Expenses), json!({"name": "x"}))
            .await
            .unwrap();
        assert!(feed.changes.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_offline_closes_feeds_and_fails_calls() {
        let store = LocalStore::in_memory();
        let p = path("trip", CollectionKind::Checklist);
        let mut feed = store.watch(&p).await.unwrap();

        store.set_reachable(false);
        assert!(matches!(
            feed.changes.recv().await,
            Err(broadcast::error::RecvError::Closed)
        ));
        assert!(matches!(
            store.list(&p).await,
            Err(SyncError::Connectivity(_))
        ));

        store.set_reachable(true);
        assert!(store.list(&p).await.is_ok());
    }

    /// In-memory persistence whose saves can be made to fail
    #[derive(Default)]
    struct FlakyPersistence {
        saved: Mutex<HashMap<String, Vec<u8>>>,
        failing: AtomicBool,
    }

    impl SessionPersistence for FlakyPersistence {
        fn load_session(&self, session_key: &str) -> SyncResult<Option<Vec<u8>>> {
            Ok(self.saved.lock().get(session_key).cloned())
        }

        fn save_session(&self, session_key: &str, data: &[u8]) -> SyncResult<()> {
            if self.failing.load(Ordering::SeqCst) {
                return Err(SyncError::Io(std::io::Error::other("disk full")));
            }
            self.saved.lock().insert(session_key.to_string(), data.to_vec());
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_unpersisted_add_is_discarded() {
        let persistence = Arc::new(FlakyPersistence::default());
        let store = LocalStore::with_persistence(persistence.clone());
        let p = path("trip", CollectionKind::Checklist);
        let kept = store.add(&p, json!({"text": "Passport"})).await.unwrap();
        let mut feed = store.watch(&p).await.unwrap();

        persistence.failing.store(true, Ordering::SeqCst);
        let err = store.add(&p, json!({"text": "Sunscreen"})).await.unwrap_err();
        assert!(matches!(err, SyncError::Io(_)));

        persistence.failing.store(false, Ordering::SeqCst);
        let records = store.list(&p).await.unwrap();
        assert_eq!(records.iter().map(|r| r.id).collect::<Vec<_>>(), vec![kept]);
        assert!(feed.changes.try_recv().is_err());

        store.add(&p, json!({"text": "Towels"})).await.unwrap();
        assert_eq!(store.list(&p).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_unpersisted_update_keeps_revision() {
        let persistence = Arc::new(FlakyPersistence::default());
        let store = LocalStore::with_persistence(persistence.clone());
        let p = path("trip", CollectionKind::Polls);
        let id = store
            .add(&p, json!({"question": "Q", "votedBy": []}))
            .await
            .unwrap();

        let mut patch = serde_json::Map::new();
        patch.insert("votedBy".into(), json!(["u1"]));
        persistence.failing.store(true, Ordering::SeqCst);
        assert!(store.update(&p, &id, 1, patch.clone()).await.is_err());

        persistence.failing.store(false, Ordering::SeqCst);
        let record = store.get(&p, &id).await.unwrap().unwrap();
        assert_eq!(record.revision, 1);
        assert_eq!(record.fields["votedBy"], json!([]));
        assert_eq!(store.update(&p, &id, 1, patch).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_dropped_watchers_are_pruned() {
        let store = LocalStore::in_memory();
        let p = path("trip", CollectionKind::Checklist);

        let feed = store.watch(&p).await.unwrap();
        assert_eq!(store.inner.feeds.lock().len(), 1);
        drop(feed);

        store.add(&p, json!({"text": "a"})).await.unwrap();
        assert!(store.inner.feeds.lock().is_empty());
    }

    #[tokio::test]
    async fn test_watch_while_offline_registers_nothing() {
        let store = LocalStore::in_memory();
        let p = path("trip", CollectionKind::Checklist);

        store.set_reachable(false);
        assert!(matches!(
            store.watch(&p).await,
            Err(SyncError::Connectivity(_))
        ));
        assert!(store.inner.feeds.lock().is_empty());
    }

    #[tokio::test]
    async fn test_persistent_store_survives_restart() {
        let temp = TempDir::new().unwrap();
        let db_path = temp.path().join("store.redb");
        let p = path("trip", CollectionKind::Checklist);

        let id = {
            let store = LocalStore::persistent(Storage::new(&db_path).unwrap());
            store.add(&p, json!({"text": "Tickets"})).await.unwrap()
        };

        let store = LocalStore::persistent(Storage::new(&db_path).unwrap());
        let record = store.get(&p, &id).await.unwrap().unwrap();
        assert_eq!(record.fields["text"], "Tickets");
    }
}
