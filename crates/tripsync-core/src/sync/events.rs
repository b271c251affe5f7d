//! Per-collection connection status
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │  SyncStatus: one per collection kind                            │
//! │  ├── Idle: nobody has subscribed yet                            │
//! │  ├── Connecting: change feed being opened                       │
//! │  ├── Live: snapshots are flowing                                │
//! │  └── Stale: feed dropped, last snapshot still shown             │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A `Stale` collection keeps serving its last-known-good snapshot while the
//! subscription task retries in the background.

use std::fmt;

/// Status of the live feed for one collection
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SyncStatus {
    /// Not subscribed
    #[default]
    Idle,
    /// Opening the change feed
    Connecting,
    /// Receiving snapshots
    Live,
    /// Feed lost; reason is shown in the connection indicator
    Stale(String),
}

impl SyncStatus {
    pub fn is_live(&self) -> bool {
        matches!(self, SyncStatus::Live)
    }

    pub fn is_stale(&self) -> bool {
        matches!(self, SyncStatus::Stale(_))
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncStatus::Idle => write!(f, "Idle"),
            SyncStatus::Connecting => write!(f, "Connecting"),
            SyncStatus::Live => write!(f, "Live"),
            SyncStatus::Stale(reason) => write!(f, "Stale: {}", reason),
        }
    }
}
