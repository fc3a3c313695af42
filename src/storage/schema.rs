//! SQL schema for the snippet store.

/// DDL statements executed at open time, in order. All are idempotent.
pub const SCHEMA_STATEMENTS: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS collections (
        name        TEXT PRIMARY KEY,
        description TEXT NOT NULL DEFAULT '',
        created_at  TEXT NOT NULL
    );",
    "CREATE TABLE IF NOT EXISTS snippets (
        checksum   TEXT PRIMARY KEY,
        code       TEXT NOT NULL,
        names      TEXT NOT NULL,
        tags       TEXT NOT NULL DEFAULT '[]',
        collection TEXT REFERENCES collections(name) ON DELETE SET NULL,
        minhash    BLOB NOT NULL,
        created_at TEXT NOT NULL
    );",
    "CREATE INDEX IF NOT EXISTS idx_snippets_collection ON snippets(collection);",
    "CREATE TABLE IF NOT EXISTS snippet_versions (
        id         INTEGER PRIMARY KEY AUTOINCREMENT,
        name       TEXT NOT NULL,
        checksum   TEXT NOT NULL,
        code       TEXT NOT NULL,
        minhash    BLOB NOT NULL,
        created_at TEXT NOT NULL
    );",
    "CREATE INDEX IF NOT EXISTS idx_versions_name ON snippet_versions(name);",
    "CREATE TABLE IF NOT EXISTS meta (
        key   TEXT PRIMARY KEY,
        value TEXT NOT NULL
    );",
];
