//! Main sync engine API
//!
//! The `SyncEngine` is what a front end holds for one group session. It
//! bundles the session store, configuration, client identity and the four
//! collection mirrors.
//!
//! ## Example
//!
//! ```no_run
//! use tripsync_core::{
//!     AnonymousIdentity, LocalStore, SessionId, SyncConfig, SyncEngine,
//! };
//!
//! # async fn example() -> tripsync_core::SyncResult<()> {
//! let config = SyncConfig::new(SessionId::new("goa-2025")?);
//! let engine = SyncEngine::new(LocalStore::in_memory(), config);
//! engine.bootstrap(&AnonymousIdentity::ephemeral()).await;
//!
//! let mut checklist = engine.subscribe_checklist();
//! engine.add_checklist_item("Passport").await?;
//!
//! while let Some(snapshot) = checklist.next().await {
//!     for item in snapshot.iter() {
//!         println!("- {}", item.text);
//!     }
//! }
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::config::SyncConfig;
use crate::error::{Severity, SyncError, SyncResult};
use crate::identity::{IdentityProvider, IdentityState};
use crate::records::{
    Announcement, AnnouncementDraft, ChecklistDraft, ChecklistItem, Expense, ExpenseDraft, Poll,
    PollDraft, Snapshot, Stamped,
};
use crate::store::SessionStore;
use crate::sync::{Mirrored, Mirrors, Subscription, SyncStatus};
use crate::types::{CollectionKind, CollectionPath, Identity, RecordId};

struct EngineInner {
    store: Arc<dyn SessionStore>,
    config: SyncConfig,
    identity: watch::Sender<IdentityState>,
    mirrors: Arc<Mirrors>,
}

/// Client-side engine for one group session
///
/// Cheap to clone; clones share identity and mirrors.
#[derive(Clone)]
pub struct SyncEngine {
    inner: Arc<EngineInner>,
}

impl SyncEngine {
    /// Create an engine over `store` for the session named in `config`.
    ///
    /// The engine starts without an identity; call [`SyncEngine::bootstrap`]
    /// or [`SyncEngine::set_identity`] before mutating.
    pub fn new<S: SessionStore + 'static>(store: S, config: SyncConfig) -> Self {
        Self::with_shared_store(Arc::new(store), config)
    }

    pub fn with_shared_store(store: Arc<dyn SessionStore>, config: SyncConfig) -> Self {
        info!(
            session = %config.session_id,
            namespace = %config.namespace,
            "Sync engine created"
        );
        Self {
            inner: Arc::new(EngineInner {
                store,
                config,
                identity: watch::Sender::new(IdentityState::Connecting),
                mirrors: Arc::new(Mirrors::new()),
            }),
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.inner.config
    }

    /// Path of one of this session's collections
    pub fn path(&self, kind: CollectionKind) -> CollectionPath {
        CollectionPath::new(
            self.inner.config.namespace.clone(),
            self.inner.config.session_id.clone(),
            kind,
        )
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Identity
    // ═══════════════════════════════════════════════════════════════════════

    /// Acquire an identity from `provider`, waiting at most the configured
    /// identity timeout.
    ///
    /// Never fails: a provider error or timeout leaves the engine in
    /// `IdentityState::Unavailable`, where mutations are inert.
    pub async fn bootstrap(&self, provider: &dyn IdentityProvider) -> IdentityState {
        self.inner.identity.send_replace(IdentityState::Connecting);
        let limit = self.inner.config.identity_timeout();

        let state = match tokio::time::timeout(limit, provider.get_or_create_identity()).await {
            Ok(Ok(identity)) => {
                info!(%identity, "Identity ready");
                IdentityState::Ready(identity)
            }
            Ok(Err(e)) => {
                warn!(error = %e, "Identity provider failed");
                IdentityState::Unavailable(e.to_string())
            }
            Err(_) => {
                warn!(timeout_ms = limit.as_millis() as u64, "Identity acquisition timed out");
                IdentityState::Unavailable(format!(
                    "no identity after {} ms",
                    limit.as_millis()
                ))
            }
        };

        self.inner.identity.send_replace(state.clone());
        state
    }

    /// Use a known identity directly.
    pub fn set_identity(&self, identity: Identity) {
        debug!(%identity, "Identity set");
        self.inner
            .identity
            .send_replace(IdentityState::Ready(identity));
    }

    pub fn identity_state(&self) -> IdentityState {
        self.inner.identity.borrow().clone()
    }

    pub fn watch_identity(&self) -> watch::Receiver<IdentityState> {
        self.inner.identity.subscribe()
    }

    pub fn identity(&self) -> Option<Identity> {
        self.inner.identity.borrow().identity().cloned()
    }

    pub(crate) fn require_identity(&self) -> SyncResult<Identity> {
        match &*self.inner.identity.borrow() {
            IdentityState::Ready(identity) => Ok(identity.clone()),
            IdentityState::Connecting => Err(SyncError::IdentityUnavailable(
                "still signing in".to_string(),
            )),
            IdentityState::Unavailable(reason) => {
                Err(SyncError::IdentityUnavailable(reason.clone()))
            }
        }
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Generic collection operations
    // ═══════════════════════════════════════════════════════════════════════

    /// Open a live subscription on `E`'s collection.
    ///
    /// Must be called from within a tokio runtime.
    pub fn subscribe<E: Mirrored>(&self) -> Subscription<E> {
        let path = self.path(E::KIND);
        info!(%path, "Subscribing");
        Subscription::spawn(
            self.inner.store.clone(),
            path,
            self.inner.mirrors.clone(),
            self.inner.config.reconnect_interval(),
        )
    }

    /// Validate `draft`, stamp it and write it as a new record.
    ///
    /// Returns as soon as the store accepts the write. The new record shows
    /// up through subscriptions.
    ///
    /// # Errors
    ///
    /// - `SyncError::IdentityUnavailable` before an identity is ready
    /// - `SyncError::Validation` if the draft is rejected; nothing is written
    /// - store errors otherwise
    pub async fn create<E: Mirrored>(&self, draft: E::Draft) -> SyncResult<RecordId> {
        let result = self.create_inner::<E>(draft).await;
        self.observe("create", E::KIND, result)
    }

    async fn create_inner<E: Mirrored>(&self, draft: E::Draft) -> SyncResult<RecordId> {
        let identity = self.require_identity()?;
        let body = E::validate(draft)?;
        let stamped = Stamped {
            body,
            created_at: Utc::now(),
            created_by: identity,
        };
        let fields = serde_json::to_value(&stamped)
            .map_err(|e| SyncError::Serialization(e.to_string()))?;

        let path = self.path(E::KIND);
        let id = self.inner.store.add(&path, fields).await?;
        info!(%path, %id, "Record created");
        Ok(id)
    }

    /// Delete a record.
    ///
    /// A record that is already gone yields `SyncError::NotFound`, which is
    /// classified as ignorable.
    pub async fn remove<E: Mirrored>(&self, id: &RecordId) -> SyncResult<()> {
        let path = self.path(E::KIND);
        let result = self.inner.store.remove(&path, id).await;
        if result.is_ok() {
            info!(%path, %id, "Record removed");
        }
        self.observe("remove", E::KIND, result)
    }

    /// Read the whole collection once and refresh its mirror.
    pub async fn load<E: Mirrored>(&self) -> SyncResult<Snapshot<E>> {
        let path = self.path(E::KIND);
        let result = self
            .inner
            .store
            .list(&path)
            .await
            .map(|records| Snapshot::<E>::from_stored(&records));
        if let Ok(snapshot) = &result {
            self.inner.mirrors.get::<E>().publish(snapshot.clone());
        }
        self.observe("load", E::KIND, result)
    }

    /// Last-known-good snapshot of `E`'s collection, if one has arrived
    pub fn snapshot<E: Mirrored>(&self) -> Option<Snapshot<E>> {
        self.inner.mirrors.get::<E>().current()
    }

    pub fn status<E: Mirrored>(&self) -> SyncStatus {
        self.inner.mirrors.get::<E>().status()
    }

    pub fn watch_status<E: Mirrored>(&self) -> watch::Receiver<SyncStatus> {
        self.inner.mirrors.get::<E>().watch_status()
    }

    pub(crate) fn store(&self) -> &Arc<dyn SessionStore> {
        &self.inner.store
    }

    /// Log a failed operation at the level its severity calls for.
    pub(crate) fn observe<T>(
        &self,
        operation: &'static str,
        kind: CollectionKind,
        result: SyncResult<T>,
    ) -> SyncResult<T> {
        if let Err(e) = &result {
            match e.severity() {
                Severity::Inline => debug!(operation, %kind, error = %e, "Input rejected"),
                Severity::Indicator => warn!(operation, %kind, error = %e, "Operation failed"),
                Severity::Ignored => info!(operation, %kind, error = %e, "Operation skipped"),
            }
        }
        result
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Per-collection shorthands
    // ═══════════════════════════════════════════════════════════════════════

    pub fn subscribe_checklist(&self) -> Subscription<ChecklistItem> {
        self.subscribe()
    }

    pub fn subscribe_expenses(&self) -> Subscription<Expense> {
        self.subscribe()
    }

    pub fn subscribe_announcements(&self) -> Subscription<Announcement> {
        self.subscribe()
    }

    pub fn subscribe_polls(&self) -> Subscription<Poll> {
        self.subscribe()
    }

    pub async fn add_checklist_item(&self, text: impl Into<String>) -> SyncResult<RecordId> {
        self.create::<ChecklistItem>(ChecklistDraft::new(text)).await
    }

    /// Add an expense from form input; `amount` is parsed as a decimal.
    pub async fn add_expense(
        &self,
        name: impl Into<String>,
        amount: impl Into<String>,
    ) -> SyncResult<RecordId> {
        self.create::<Expense>(ExpenseDraft::new(name, amount)).await
    }

    pub async fn post_announcement(&self, text: impl Into<String>) -> SyncResult<RecordId> {
        self.create::<Announcement>(AnnouncementDraft::new(text)).await
    }

    pub async fn create_poll(&self, draft: PollDraft) -> SyncResult<RecordId> {
        self.create::<Poll>(draft).await
    }

    pub async fn delete_checklist_item(&self, id: &RecordId) -> SyncResult<()> {
        self.remove::<ChecklistItem>(id).await
    }

    pub async fn delete_expense(&self, id: &RecordId) -> SyncResult<()> {
        self.remove::<Expense>(id).await
    }

    pub async fn delete_announcement(&self, id: &RecordId) -> SyncResult<()> {
        self.remove::<Announcement>(id).await
    }
}

impl std::fmt::Debug for SyncEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncEngine")
            .field("session", &self.inner.config.session_id)
            .field("identity", &*self.inner.identity.borrow())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::TokenIdentity;
    use crate::store::LocalStore;
    use crate::types::SessionId;
    use async_trait::async_trait;
    use std::time::Duration;

    fn engine(store: &LocalStore) -> SyncEngine {
        let config = SyncConfig::new(SessionId::new("trip").unwrap());
        SyncEngine::new(store.clone(), config)
    }

    struct NeverReady;

    #[async_trait]
    impl IdentityProvider for NeverReady {
        async fn get_or_create_identity(&self) -> SyncResult<Identity> {
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn test_engine_starts_connecting() {
        let engine = engine(&LocalStore::in_memory());
        assert_eq!(engine.identity_state(), IdentityState::Connecting);
        assert!(engine.identity().is_none());
    }

    #[tokio::test]
    async fn test_bootstrap_with_token() {
        let engine = engine(&LocalStore::in_memory());
        let state = engine.bootstrap(&TokenIdentity::new("tok")).await;
        assert_eq!(state, IdentityState::Ready(Identity::from_token("tok")));
        assert_eq!(engine.identity(), Some(Identity::from_token("tok")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_bootstrap_times_out() {
        let store = LocalStore::in_memory();
        let config = SyncConfig::new(SessionId::new("trip").unwrap())
            .with_identity_timeout(Duration::from_millis(100));
        let engine = SyncEngine::new(store, config);

        let state = engine.bootstrap(&NeverReady).await;
        assert!(matches!(state, IdentityState::Unavailable(_)));
    }

    #[tokio::test]
    async fn test_mutations_inert_without_identity() {
        let store = LocalStore::in_memory();
        let engine = engine(&store);

        let err = engine.add_checklist_item("Passport").await.unwrap_err();
        assert!(matches!(err, SyncError::IdentityUnavailable(_)));
        assert_eq!(err.severity(), Severity::Ignored);
        assert!(store.list(&engine.path(CollectionKind::Checklist)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_create_stamps_record() {
        let store = LocalStore::in_memory();
        let engine = engine(&store);
        engine.set_identity(Identity::new("u1").unwrap());

        let before = Utc::now();
        let id = engine.post_announcement("  Bus leaves at 7  ").await.unwrap();
        let snapshot = engine.load::<Announcement>().await.unwrap();

        let posted = snapshot.get(&id).unwrap();
        assert_eq!(posted.text, "Bus leaves at 7");
        assert_eq!(posted.created_by.as_str(), "u1");
        assert!(posted.created_at.unwrap() >= before);
        assert_eq!(engine.snapshot::<Announcement>().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_invalid_expense_writes_nothing() {
        let store = LocalStore::in_memory();
        let engine = engine(&store);
        engine.set_identity(Identity::new("u1").unwrap());

        let err = engine.add_expense("Dinner", "abc").await.unwrap_err();
        assert_eq!(err.severity(), Severity::Inline);
        assert!(engine.load::<Expense>().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_path_uses_configured_session() {
        let engine = engine(&LocalStore::in_memory());
        assert_eq!(
            engine.path(CollectionKind::Polls).to_string(),
            "tripsync/public/data/trip/polls"
        );
    }
}
