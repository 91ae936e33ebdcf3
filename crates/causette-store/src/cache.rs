//! Typed snapshot accessors over the `cache` key-value table.
//!
//! Exactly two keys exist: [`KEY_ACTIVE_PEER`] and [`KEY_MESSAGES`].  A value
//! that fails to deserialize is cleared and reported as absent, never as an
//! error: a corrupt cache must not take down a session that can simply
//! re-sync from the server.

use chrono::Utc;
use rusqlite::{params, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::warn;

use causette_shared::types::{Message, User};

use crate::database::Database;
use crate::error::Result;

/// Key under which the active conversation peer snapshot is stored.
pub const KEY_ACTIVE_PEER: &str = "active_peer";

/// Key under which the message list snapshot is stored.
pub const KEY_MESSAGES: &str = "messages";

impl Database {
    pub fn save_active_peer(&self, peer: &User) -> Result<()> {
        self.put(KEY_ACTIVE_PEER, peer)
    }

    pub fn load_active_peer(&self) -> Result<Option<User>> {
        self.load_snapshot(KEY_ACTIVE_PEER)
    }

    pub fn clear_active_peer(&self) -> Result<()> {
        self.delete(KEY_ACTIVE_PEER)
    }

    pub fn save_messages(&self, messages: &[Message]) -> Result<()> {
        self.put(KEY_MESSAGES, &messages)
    }

    pub fn load_messages(&self) -> Result<Option<Vec<Message>>> {
        self.load_snapshot(KEY_MESSAGES)
    }

    /// Remove both snapshots.
    pub fn clear(&self) -> Result<()> {
        self.delete(KEY_ACTIVE_PEER)?;
        self.delete(KEY_MESSAGES)
    }

    fn put<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        let json = serde_json::to_string(value)?;
        self.conn().execute(
            "INSERT INTO cache (key, value, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET
                 value = excluded.value,
                 updated_at = excluded.updated_at",
            params![key, json, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<String>> {
        let value = self
            .conn()
            .query_row(
                "SELECT value FROM cache WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    fn delete(&self, key: &str) -> Result<()> {
        self.conn()
            .execute("DELETE FROM cache WHERE key = ?1", params![key])?;
        Ok(())
    }

    /// Load and deserialize a snapshot.  Corrupt content is discarded and the
    /// key cleared, as if nothing had been stored.
    fn load_snapshot<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let Some(raw) = self.get(key)? else {
            return Ok(None);
        };

        match serde_json::from_str(&raw) {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                warn!(key, error = %e, "discarding corrupt cache entry");
                self.delete(key)?;
                Ok(None)
            }
        }
    }
}
