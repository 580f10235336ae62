//! `SQLite` schema for the preference store.
//!
//! The store is a plain key-value table; the whole location history is one
//! row whose value is a JSON array.

/// Metadata table holding the schema version. Created before migrations run.
pub const CREATE_METADATA_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS metadata (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
)
";

/// Version 1: the preferences table.
pub const CREATE_PREFERENCES_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS preferences (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
)
";

/// Version 2: track when each key was last written.
pub const ADD_PREFERENCES_UPDATED_AT: &str = r"
ALTER TABLE preferences ADD COLUMN updated_at TEXT
";

/// Statements run unconditionally on open.
pub const BASE_STATEMENTS: &[&str] = &[CREATE_METADATA_TABLE];
