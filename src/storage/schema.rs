//! SQLite schema for scans, the job queue, scorecards and the worker lease
//!
//! The schema version is kept in `PRAGMA user_version`.

use rusqlite::Connection;

/// Version written by `initialize_schema`
pub const SCHEMA_VERSION: u32 = 1;

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- One row per scan request
CREATE TABLE IF NOT EXISTS scans (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    target_url TEXT NOT NULL,
    domain TEXT NOT NULL,
    status TEXT NOT NULL,
    scan_type TEXT,
    worker_type TEXT,
    is_batch INTEGER NOT NULL DEFAULT 0,
    fell_back INTEGER NOT NULL DEFAULT 0,
    worker_id TEXT,
    error_message TEXT,
    risk_score INTEGER,
    risk_level TEXT,
    grade TEXT,
    has_ai INTEGER NOT NULL DEFAULT 0,
    report_json TEXT,
    metadata_json TEXT,
    created_at TEXT NOT NULL,
    started_at TEXT,
    completed_at TEXT
);

CREATE INDEX IF NOT EXISTS idx_scans_status ON scans(status);
CREATE INDEX IF NOT EXISTS idx_scans_domain ON scans(domain);

-- Durable job queue
CREATE TABLE IF NOT EXISTS jobs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    scan_id INTEGER NOT NULL REFERENCES scans(id) ON DELETE CASCADE,
    target_url TEXT NOT NULL,
    is_batch INTEGER NOT NULL DEFAULT 0,
    status TEXT NOT NULL,
    attempts INTEGER NOT NULL DEFAULT 0,
    error TEXT,
    created_at TEXT NOT NULL,
    started_at TEXT,
    completed_at TEXT
);

CREATE INDEX IF NOT EXISTS idx_jobs_status_created ON jobs(status, created_at);

-- AI trust scorecards, one per scan
CREATE TABLE IF NOT EXISTS scorecards (
    scan_id INTEGER PRIMARY KEY REFERENCES scans(id) ON DELETE CASCADE,
    domain TEXT NOT NULL,
    has_ai INTEGER NOT NULL,
    confidence TEXT NOT NULL,
    signals_json TEXT NOT NULL,
    ai_score INTEGER,
    updated_at TEXT NOT NULL
);

-- Single-instance leases
CREATE TABLE IF NOT EXISTS instance_leases (
    name TEXT PRIMARY KEY,
    holder TEXT NOT NULL,
    acquired_at TEXT NOT NULL,
    heartbeat_at TEXT NOT NULL
);
"#;

/// Creates any missing tables and indexes, then stamps the schema version
///
/// Safe to run on every open.
pub fn initialize_schema(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;
    Ok(())
}

/// Reads the schema version stamped on a database (0 if never initialized)
pub fn schema_version(conn: &Connection) -> Result<u32, rusqlite::Error> {
    conn.pragma_query_value(None, "user_version", |row| row.get(0))
}
