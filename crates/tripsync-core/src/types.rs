//! Core types for TripSync

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::error::SyncError;

/// Unique identifier for a stored record
///
/// Assigned by the session store. Uses ULID so ids are time-ordered
/// and never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(pub Ulid);

impl RecordId {
    /// Create a new RecordId with current timestamp
    pub fn new() -> Self {
        Self(Ulid::new())
    }

    /// Get the underlying ULID
    pub fn as_ulid(&self) -> &Ulid {
        &self.0
    }
}

impl Default for RecordId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for RecordId {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ulid::from_string(s.trim())
            .map(Self)
            .map_err(|e| SyncError::Validation(format!("invalid record id '{}': {}", s, e)))
    }
}

/// Shared session identifier
///
/// Every collection of one group trip lives under the same session id.
/// It is always supplied through configuration.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SessionId(String);

impl SessionId {
    /// Validate and wrap a session id.
    ///
    /// Rejects empty ids and ids containing `/`, which would escape the
    /// session's path segment.
    pub fn new(id: impl Into<String>) -> Result<Self, SyncError> {
        let id = id.into();
        let trimmed = id.trim();
        if trimmed.is_empty() {
            return Err(SyncError::Config("session id must not be empty".into()));
        }
        if trimmed.contains('/') {
            return Err(SyncError::Config(format!(
                "session id '{}' must not contain '/'",
                trimmed
            )));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for SessionId {
    type Error = SyncError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<SessionId> for String {
    fn from(id: SessionId) -> Self {
        id.0
    }
}

impl FromStr for SessionId {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Stable per-client identity string
///
/// Attributes created records and enforces single-vote semantics.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identity(String);

impl Identity {
    /// Wrap an identity issued by a provider.
    pub fn new(id: impl Into<String>) -> Result<Self, SyncError> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(SyncError::IdentityUnavailable(
                "provider returned an empty identity".into(),
            ));
        }
        Ok(Self(id))
    }

    /// Fresh anonymous identity (`anon_<ulid>`).
    pub fn anonymous() -> Self {
        Self(format!("anon_{}", Ulid::new().to_string().to_lowercase()))
    }

    /// Identity derived from an auth token.
    ///
    /// The same token always yields the same identity; the token itself
    /// never appears in the result.
    pub fn from_token(token: &str) -> Self {
        let digest = blake3::hash(token.as_bytes());
        Self(format!("user_{}", hex::encode(&digest.as_bytes()[..10])))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One of the four shared collections of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CollectionKind {
    Checklist,
    Expenses,
    Announcements,
    Polls,
}

impl CollectionKind {
    pub const ALL: [CollectionKind; 4] = [
        CollectionKind::Checklist,
        CollectionKind::Expenses,
        CollectionKind::Announcements,
        CollectionKind::Polls,
    ];

    /// Path segment under the session
    pub fn segment(&self) -> &'static str {
        match self {
            CollectionKind::Checklist => "checklists",
            CollectionKind::Expenses => "expenses",
            CollectionKind::Announcements => "announcements",
            CollectionKind::Polls => "polls",
        }
    }
}

impl fmt::Display for CollectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.segment())
    }
}

/// Address of one collection in the session store
///
/// Renders as `{namespace}/public/data/{session}/{kind}`, so the four
/// kinds of a session are always siblings.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CollectionPath {
    pub namespace: String,
    pub session: SessionId,
    pub kind: CollectionKind,
}

impl CollectionPath {
    pub fn new(namespace: impl Into<String>, session: SessionId, kind: CollectionKind) -> Self {
        Self {
            namespace: namespace.into(),
            session,
            kind,
        }
    }

    /// Key of the session document holding this collection
    pub fn session_key(&self) -> String {
        format!("{}/public/data/{}", self.namespace, self.session)
    }

    /// Sibling collection of the same session
    pub fn sibling(&self, kind: CollectionKind) -> Self {
        Self {
            namespace: self.namespace.clone(),
            session: self.session.clone(),
            kind,
        }
    }
}

impl fmt::Display for CollectionPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.session_key(), self.kind)
    }
}
