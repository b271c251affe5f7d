//! Client identity - who is writing
//!
//! The engine never authenticates anyone. It only needs a stable identity
//! string before it will create records or vote. Providers hand one out:
//!
//! - [`AnonymousIdentity`]: a generated `anon_…` id, remembered in redb when
//!   storage is available so the same client keeps its votes across runs.
//! - [`TokenIdentity`]: derived from an auth token supplied by the host page.

use std::fmt;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::info;

use crate::error::SyncResult;
use crate::storage::Storage;
use crate::types::Identity;

/// Source of the client's stable identity
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Return the identity for this client session, creating it if needed.
    ///
    /// Repeated calls return the same identity.
    async fn get_or_create_identity(&self) -> SyncResult<Identity>;
}

/// Anonymous sign-in
pub struct AnonymousIdentity {
    storage: Option<Storage>,
    cached: Mutex<Option<Identity>>,
}

impl AnonymousIdentity {
    /// Identity lives only as long as this provider
    pub fn ephemeral() -> Self {
        Self {
            storage: None,
            cached: Mutex::new(None),
        }
    }

    /// Identity is loaded from, or saved to, `storage`
    pub fn persistent(storage: Storage) -> Self {
        Self {
            storage: Some(storage),
            cached: Mutex::new(None),
        }
    }
}

#[async_trait]
impl IdentityProvider for AnonymousIdentity {
    async fn get_or_create_identity(&self) -> SyncResult<Identity> {
        let mut cached = self.cached.lock();
        if let Some(identity) = cached.as_ref() {
            return Ok(identity.clone());
        }

        let identity = match &self.storage {
            Some(storage) => match storage.load_identity()? {
                Some(identity) => {
                    info!(%identity, "Loaded existing identity");
                    identity
                }
                None => {
                    let identity = Identity::anonymous();
                    info!(%identity, "Generated new anonymous identity");
                    storage.save_identity(&identity)?;
                    identity
                }
            },
            None => Identity::anonymous(),
        };

        *cached = Some(identity.clone());
        Ok(identity)
    }
}

/// Sign-in with a token handed over by the host
pub struct TokenIdentity {
    identity: Identity,
}

impl TokenIdentity {
    pub fn new(token: &str) -> Self {
        Self {
            identity: Identity::from_token(token),
        }
    }
}

impl fmt::Debug for TokenIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenIdentity")
            .field("identity", &self.identity)
            .finish()
    }
}

#[async_trait]
impl IdentityProvider for TokenIdentity {
    async fn get_or_create_identity(&self) -> SyncResult<Identity> {
        Ok(self.identity.clone())
    }
}

/// Where the engine is in acquiring an identity
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentityState {
    /// Still signing in; mutations are inert
    Connecting,
    /// Mutations enabled
    Ready(Identity),
    /// Sign-in failed or timed out; mutations are inert
    Unavailable(String),
}

impl IdentityState {
    pub fn identity(&self) -> Option<&Identity> {
        match self {
            IdentityState::Ready(identity) => Some(identity),
            _ => None,
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, IdentityState::Ready(_))
    }
}

impl fmt::Display for IdentityState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IdentityState::Connecting => write!(f, "Connecting"),
            IdentityState::Ready(identity) => write!(f, "Ready ({})", identity),
            IdentityState::Unavailable(reason) => write!(f, "Unavailable: {}", reason),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_anonymous_identity_is_stable_per_provider() {
        let provider = AnonymousIdentity::ephemeral();
        let a = provider.get_or_create_identity().await.unwrap();
        let b = provider.get_or_create_identity().await.unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn test_anonymous_identity_persists() {
        let temp = TempDir::new().unwrap();
        let db_path = temp.path().join("id.redb");

        let first = {
            let provider = AnonymousIdentity::persistent(Storage::new(&db_path).unwrap());
            provider.get_or_create_identity().await.unwrap()
        };
        let provider = AnonymousIdentity::persistent(Storage::new(&db_path).unwrap());
        assert_eq!(provider.get_or_create_identity().await.unwrap(), first);
    }

    #[tokio::test]
    async fn test_token_identity() {
        let provider = TokenIdentity::new("secret-token");
        let identity = provider.get_or_create_identity().await.unwrap();
        assert_eq!(identity, Identity::from_token("secret-token"));
        assert!(!format!("{:?}", provider).contains("secret-token"));
    }

    #[test]
    fn test_identity_state_display() {
        assert_eq!(IdentityState::Connecting.to_string(), "Connecting");
        let ready = IdentityState::Ready(Identity::new("u1").unwrap());
        assert_eq!(ready.to_string(), "Ready (u1)");
        assert!(ready.is_ready());
        assert!(IdentityState::Unavailable("timed out".into()).identity().is_none());
    }
}
