//! SQLite schema definitions and version bookkeeping.

use rusqlite::{params, Connection};

use crate::error::Result;

/// Current schema version for migrations.
pub const SCHEMA_VERSION: i32 = 2;

/// Complete current-generation schema. Every statement is existence-checked
/// so re-running the batch after a partial upgrade is safe.
pub const SCHEMA: &str = r#"
-- Degree plans; the first row by creation is the current plan
CREATE TABLE IF NOT EXISTS plans (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    passing_exam_threshold REAL NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

-- Ordered buckets courses are assigned to
CREATE TABLE IF NOT EXISTS semesters (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    order_index INTEGER NOT NULL,
    created_at TEXT NOT NULL
);

-- Courses
CREATE TABLE IF NOT EXISTS courses (
    id TEXT PRIMARY KEY,
    degree_plan_id TEXT NOT NULL REFERENCES plans(id),
    code TEXT,
    name TEXT NOT NULL,
    credits REAL NOT NULL,
    semester_id TEXT NOT NULL REFERENCES semesters(id),
    notes TEXT,
    grade REAL,
    manual_status TEXT NOT NULL DEFAULT 'not_started',
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

-- Topics
CREATE TABLE IF NOT EXISTS topics (
    id TEXT PRIMARY KEY,
    course_id TEXT NOT NULL REFERENCES courses(id),
    title TEXT NOT NULL,
    description TEXT,
    status TEXT NOT NULL DEFAULT 'not_started',
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

-- Generic key/value surface (preferences, legacy config, migration flags)
CREATE TABLE IF NOT EXISTS meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);

-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER PRIMARY KEY
);

-- Advisory lease coordinating store access across instances
CREATE TABLE IF NOT EXISTS store_lease (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    holder TEXT NOT NULL,
    acquired_at TEXT NOT NULL,
    expires_at TEXT NOT NULL,
    release_requested INTEGER NOT NULL DEFAULT 0
);

-- Indexes
CREATE INDEX IF NOT EXISTS idx_courses_plan ON courses(degree_plan_id);
CREATE INDEX IF NOT EXISTS idx_courses_semester ON courses(semester_id);
CREATE INDEX IF NOT EXISTS idx_topics_course ON topics(course_id);
"#;

/// Legacy generation-1 schema: no semesters table, courses carry a free-text
/// semester label, semester count/labels live in meta. Used to seed fixtures
/// for migration tests.
#[cfg(test)]
pub(crate) const LEGACY_SCHEMA_V1: &str = r#"
CREATE TABLE IF NOT EXISTS plans (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    passing_exam_threshold REAL NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS courses (
    id TEXT PRIMARY KEY,
    degree_plan_id TEXT NOT NULL,
    code TEXT,
    name TEXT NOT NULL,
    credits REAL NOT NULL,
    semester TEXT NOT NULL,
    notes TEXT,
    grade REAL,
    manual_status TEXT NOT NULL DEFAULT 'not_started',
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS topics (
    id TEXT PRIMARY KEY,
    course_id TEXT NOT NULL,
    title TEXT NOT NULL,
    description TEXT,
    status TEXT NOT NULL DEFAULT 'not_started',
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_courses_plan ON courses(degree_plan_id);
CREATE INDEX IF NOT EXISTS idx_topics_course ON topics(course_id);
"#;

/// Check whether a table exists in the connected database.
pub(crate) fn table_exists(conn: &Connection, name: &str) -> Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
        params![name],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

/// Read the stored schema version.
///
/// A database without a plans table is empty (version 0). A populated
/// database without version bookkeeping predates the versioned schema and is
/// treated as generation 1.
pub(crate) fn stored_version(conn: &Connection) -> Result<i32> {
    if !table_exists(conn, "plans")? {
        return Ok(0);
    }
    if !table_exists(conn, "schema_version")? {
        return Ok(1);
    }
    let version: Option<i32> =
        conn.query_row("SELECT MAX(version) FROM schema_version", [], |row| {
            row.get(0)
        })?;
    Ok(version.unwrap_or(1))
}

/// Record the stored schema version. Creates the bookkeeping table when it
/// does not exist yet, which is the case mid-upgrade from generation 1.
pub(crate) fn set_stored_version(conn: &Connection, version: i32) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (version INTEGER PRIMARY KEY)",
        [],
    )?;
    conn.execute("DELETE FROM schema_version", [])?;
    conn.execute(
        "INSERT INTO schema_version (version) VALUES (?1)",
        params![version],
    )?;
    Ok(())
}
