//! # causette-store
//!
//! Durable local cache for the Causette client, backed by SQLite.
//!
//! The cache survives process restarts and seeds the in-memory conversation
//! state before the live connection is established.  It holds exactly two
//! snapshots under stable keys: the active conversation peer and the message
//! list.  Writes are best-effort; the in-memory state never waits on them.

pub mod cache;
pub mod database;
pub mod migrations;

mod error;

pub use database::Database;
pub use error::StoreError;
