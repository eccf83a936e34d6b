//! v001 -- Initial schema creation.
//!
//! Creates `kv_entries` (namespaced preferences such as reading progress) and
//! `page_cache` (persisted list pages).

use rusqlite::Connection;

/// SQL executed when upgrading from version 0 to version 1.
const UP_SQL: &str = r#"
-- ----------------------------------------------------------------
-- Namespaced key/value envelopes
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS kv_entries (
    key      TEXT PRIMARY KEY NOT NULL,      -- e.g. "mangawiki:progress"
    envelope TEXT NOT NULL                   -- JSON {"value": ..., "timestamp": RFC-3339}
);

-- ----------------------------------------------------------------
-- Persisted list pages
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS page_cache (
    resource_key     TEXT NOT NULL,
    page             INTEGER NOT NULL,
    filter_signature TEXT NOT NULL,
    envelope         TEXT NOT NULL,          -- JSON {"value": PageEnvelope, "timestamp": RFC-3339}

    PRIMARY KEY (resource_key, page, filter_signature)
);
"#;

/// Apply the initial migration.
pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
