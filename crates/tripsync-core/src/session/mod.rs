//! Session documents - Automerge-backed state of one group session
//!
//! All four collections of a session live in one document, which is what
//! makes them siblings: they are saved, loaded and merged together.

pub mod doc;

pub use doc::SessionDoc;
