//! Live synchronisation of the session's collections
//!
//! - [`Subscription`]: one change feed, delivering full snapshots
//! - [`Mirrors`]: last-known-good snapshot and status per collection
//! - [`SyncStatus`]: what the connection indicator shows

pub mod events;
pub mod mirror;
pub mod subscription;

pub use events::SyncStatus;
pub use mirror::{Mirror, Mirrored, Mirrors};
pub use subscription::Subscription;
