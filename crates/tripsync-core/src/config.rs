//! Engine configuration
//!
//! The session id is always supplied here; there is no built-in default
//! session, so separate trip groups never collide.
//!
//! Values can come from code, from any serde source, or from the
//! environment:
//!
//! | Variable                        | Field                 |
//! |---------------------------------|-----------------------|
//! | `TRIPSYNC_SESSION_ID`           | `session_id`          |
//! | `TRIPSYNC_NAMESPACE`            | `namespace`           |
//! | `TRIPSYNC_IDENTITY_TIMEOUT_MS`  | `identity_timeout_ms` |
//! | `TRIPSYNC_RECONNECT_MS`         | `reconnect_ms`        |
//! | `TRIPSYNC_MAX_VOTE_RETRIES`     | `max_vote_retries`    |

use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{SyncError, SyncResult};
use crate::types::SessionId;

/// Default top-level namespace for collection paths
pub const DEFAULT_NAMESPACE: &str = "tripsync";

const DEFAULT_IDENTITY_TIMEOUT_MS: u64 = 10_000;
const DEFAULT_RECONNECT_MS: u64 = 2_000;
const DEFAULT_MAX_VOTE_RETRIES: u32 = 5;

/// Configuration for one [`crate::SyncEngine`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Shared session all four collections live under
    pub session_id: SessionId,
    /// First path segment; never contains `/`
    #[serde(default = "default_namespace", deserialize_with = "deserialize_namespace")]
    pub namespace: String,
    /// Upper bound on identity acquisition
    #[serde(default = "default_identity_timeout_ms")]
    pub identity_timeout_ms: u64,
    /// Pause before re-opening a dropped subscription
    #[serde(default = "default_reconnect_ms")]
    pub reconnect_ms: u64,
    /// Compare-and-swap attempts after the first failed vote write
    #[serde(default = "default_max_vote_retries")]
    pub max_vote_retries: u32,
}

fn default_namespace() -> String {
    DEFAULT_NAMESPACE.to_string()
}

fn check_namespace(namespace: String) -> SyncResult<String> {
    if namespace.trim().is_empty() || namespace.contains('/') {
        return Err(SyncError::Config(format!(
            "namespace '{}' must be a single non-empty path segment",
            namespace
        )));
    }
    Ok(namespace)
}

fn deserialize_namespace<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    let namespace = String::deserialize(deserializer)?;
    check_namespace(namespace).map_err(serde::de::Error::custom)
}

fn default_identity_timeout_ms() -> u64 {
    DEFAULT_IDENTITY_TIMEOUT_MS
}

fn default_reconnect_ms() -> u64 {
    DEFAULT_RECONNECT_MS
}

fn default_max_vote_retries() -> u32 {
    DEFAULT_MAX_VOTE_RETRIES
}

impl SyncConfig {
    pub fn new(session_id: SessionId) -> Self {
        Self {
            session_id,
            namespace: default_namespace(),
            identity_timeout_ms: DEFAULT_IDENTITY_TIMEOUT_MS,
            reconnect_ms: DEFAULT_RECONNECT_MS,
            max_vote_retries: DEFAULT_MAX_VOTE_RETRIES,
        }
    }

    /// Build from `TRIPSYNC_*` environment variables.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::Config` if `TRIPSYNC_SESSION_ID` is missing or
    /// any numeric variable does not parse.
    pub fn from_env() -> SyncResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup (environment, test map, ...).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> SyncResult<Self> {
        let session = lookup("TRIPSYNC_SESSION_ID")
            .ok_or_else(|| SyncError::Config("TRIPSYNC_SESSION_ID is not set".into()))?;
        let mut config = Self::new(SessionId::new(session)?);

        if let Some(namespace) = lookup("TRIPSYNC_NAMESPACE") {
            config = config.with_namespace(namespace)?;
        }
        if let Some(raw) = lookup("TRIPSYNC_IDENTITY_TIMEOUT_MS") {
            config.identity_timeout_ms = parse_number("TRIPSYNC_IDENTITY_TIMEOUT_MS", &raw)?;
        }
        if let Some(raw) = lookup("TRIPSYNC_RECONNECT_MS") {
            config.reconnect_ms = parse_number("TRIPSYNC_RECONNECT_MS", &raw)?;
        }
        if let Some(raw) = lookup("TRIPSYNC_MAX_VOTE_RETRIES") {
            config.max_vote_retries = parse_number("TRIPSYNC_MAX_VOTE_RETRIES", &raw)?;
        }
        Ok(config)
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> SyncResult<Self> {
        self.namespace = check_namespace(namespace.into())?;
        Ok(self)
    }

    pub fn with_identity_timeout(mut self, timeout: Duration) -> Self {
        self.identity_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_reconnect_interval(mut self, interval: Duration) -> Self {
        self.reconnect_ms = interval.as_millis() as u64;
        self
    }

    pub fn with_max_vote_retries(mut self, retries: u32) -> Self {
        self.max_vote_retries = retries;
        self
    }

    pub fn identity_timeout(&self) -> Duration {
        Duration::from_millis(self.identity_timeout_ms)
    }

    pub fn reconnect_interval(&self) -> Duration {
        Duration::from_millis(self.reconnect_ms)
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, raw: &str) -> SyncResult<T> {
    raw.trim()
        .parse()
        .map_err(|_| SyncError::Config(format!("{} must be a number, got '{}'", key, raw)))
}
