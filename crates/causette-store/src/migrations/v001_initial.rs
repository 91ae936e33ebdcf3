//! v001 -- Initial schema creation.
//!
//! Creates the single `cache` key-value table that holds the snapshots.

use rusqlite::Connection;

/// SQL executed when upgrading from version 0 to version 1.
const UP_SQL: &str = r#"
-- ----------------------------------------------------------------
-- Snapshot cache
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS cache (
    key        TEXT PRIMARY KEY NOT NULL,   -- stable snapshot key
    value      TEXT NOT NULL,               -- JSON-serialized snapshot
    updated_at TEXT NOT NULL                -- ISO-8601 / RFC-3339
);
"#;

/// Apply the initial migration.
pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
