//! Ordered, idempotent schema migrations.
//!
//! Migrations are versioned steps applied in sequence from the stored
//! version to [`SCHEMA_VERSION`]. Each step runs in its own transaction
//! together with its version bump, so a failure anywhere rolls the database
//! back to the previous generation and the next open retries cleanly.

use std::collections::HashMap;

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Transaction};
use uuid::Uuid;

use crate::error::{Result, StoreError};
use crate::schema::{self, SCHEMA, SCHEMA_VERSION};
use crate::time;

/// Meta key marking completion of the semester normalization.
pub const SEMESTERS_MIGRATED_FLAG: &str = "migration:semesters-v2";

/// Legacy meta keys describing the free-text semester layout.
const LEGACY_COUNT_KEY: &str = "semesterCount";
const LEGACY_LABELS_KEY: &str = "semesterLabels";

/// Declared semester count assumed when the legacy config is absent.
pub const DEFAULT_SEMESTER_COUNT: i64 = 8;

struct Migration {
    version: i32,
    name: &'static str,
    apply: fn(&Transaction) -> Result<()>,
}

const MIGRATIONS: &[Migration] = &[Migration {
    version: 2,
    name: "normalize-semesters",
    apply: normalize_semesters,
}];

/// Bring the database up to [`SCHEMA_VERSION`].
///
/// An empty database is created at the current version directly. A database
/// that is behind has each pending step applied in order. The full
/// existence-checked schema batch runs last, picking up collections and
/// indexes added since the recorded generation.
pub(crate) fn initialize(conn: &mut Connection) -> Result<()> {
    let version = schema::stored_version(conn)?;
    if version > SCHEMA_VERSION {
        return Err(StoreError::Connection(format!(
            "store version {version} is newer than supported version {SCHEMA_VERSION}"
        )));
    }

    if version == 0 {
        let tx = conn.transaction()?;
        tx.execute_batch(SCHEMA)?;
        schema::set_stored_version(&tx, SCHEMA_VERSION)?;
        tx.commit()?;
        tracing::info!(version = SCHEMA_VERSION, "created empty store");
        return Ok(());
    }

    for migration in MIGRATIONS.iter().filter(|m| m.version > version) {
        tracing::info!(step = migration.name, to_version = migration.version, "applying migration");
        let tx = conn.transaction()?;
        (migration.apply)(&tx)?;
        schema::set_stored_version(&tx, migration.version)?;
        tx.commit()?;
    }

    conn.execute_batch(SCHEMA)?;
    Ok(())
}

/// v1 -> v2: normalize legacy free-text semester labels on courses into
/// first-class semester rows.
///
/// The legacy generation stored a declared semester count and optional
/// custom labels in meta, and each course carried a free-text label
/// (usually the position number). This step synthesizes one semester per
/// declared position, appends extra semesters for labels outside the
/// declared range, then rebuilds the courses table with a `semester_id`
/// column, dropping the legacy one.
fn normalize_semesters(tx: &Transaction) -> Result<()> {
    // the persisted flag short-circuits a re-run even if the version row
    // was lost, since the flag commits in the same transaction as the data
    if flag_is_set(tx, SEMESTERS_MIGRATED_FLAG)? {
        return Ok(());
    }

    tx.execute(
        "CREATE TABLE IF NOT EXISTS semesters (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            order_index INTEGER NOT NULL,
            created_at TEXT NOT NULL
        )",
        [],
    )?;

    let declared_count = read_meta_i64(tx, LEGACY_COUNT_KEY)?.unwrap_or(DEFAULT_SEMESTER_COUNT);
    let labels = read_meta_string_list(tx, LEGACY_LABELS_KEY)?;
    let now = time::to_sql(&Utc::now());

    // legacy label -> synthesized semester id
    let mut by_label: HashMap<String, String> = HashMap::new();

    for position in 1..=declared_count {
        let custom = labels
            .get((position - 1) as usize)
            .map(|l| l.trim())
            .filter(|l| !l.is_empty());
        let name = match custom {
            Some(label) => label.to_string(),
            None => format!("Semester {position}"),
        };
        let id = Uuid::new_v4().to_string();
        tx.execute(
            "INSERT INTO semesters (id, name, order_index, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![id, name, position, now],
        )?;
        // courses reference a position number or its custom label
        by_label.insert(position.to_string(), id.clone());
        if let Some(label) = custom {
            by_label.entry(label.to_string()).or_insert(id);
        }
    }

    // labels on courses outside the declared range get appended semesters
    let mut next_index = declared_count;
    for label in course_labels_in_first_seen_order(tx)? {
        if by_label.contains_key(&label) {
            continue;
        }
        next_index += 1;
        let name = if label.trim().is_empty() {
            format!("Semester {next_index}")
        } else {
            label.clone()
        };
        let id = Uuid::new_v4().to_string();
        tx.execute(
            "INSERT INTO semesters (id, name, order_index, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![id, name, next_index, now],
        )?;
        by_label.insert(label, id);
    }

    // rebuild courses with semester_id, dropping the legacy column
    tx.execute(
        "CREATE TABLE courses_migrated (
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
        )",
        [],
    )?;

    let mut migrated = 0usize;
    {
        let mut read = tx.prepare(
            "SELECT id, degree_plan_id, code, name, credits, semester, notes, grade,
                    manual_status, created_at, updated_at
             FROM courses",
        )?;
        let mut write = tx.prepare(
            "INSERT INTO courses_migrated (id, degree_plan_id, code, name, credits, semester_id,
                    notes, grade, manual_status, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        )?;

        let mut rows = read.query([])?;
        while let Some(row) = rows.next()? {
            let legacy_label: String = row.get(5)?;
            let semester_id = by_label.get(&legacy_label).ok_or_else(|| {
                StoreError::Referential(format!(
                    "no semester synthesized for legacy label '{legacy_label}'"
                ))
            })?;
            write.execute(params![
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, Option<String>>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, f64>(4)?,
                semester_id,
                row.get::<_, Option<String>>(6)?,
                row.get::<_, Option<f64>>(7)?,
                row.get::<_, String>(8)?,
                row.get::<_, String>(9)?,
                row.get::<_, String>(10)?,
            ])?;
            migrated += 1;
        }
    }

    tx.execute_batch(
        "DROP TABLE courses;
         ALTER TABLE courses_migrated RENAME TO courses;
         CREATE INDEX IF NOT EXISTS idx_courses_plan ON courses(degree_plan_id);
         CREATE INDEX IF NOT EXISTS idx_courses_semester ON courses(semester_id);",
    )?;

    tx.execute(
        "INSERT OR REPLACE INTO meta (key, value) VALUES (?1, 'true')",
        params![SEMESTERS_MIGRATED_FLAG],
    )?;

    tracing::info!(
        semesters = by_label.len(),
        courses = migrated,
        "normalized legacy semester labels"
    );
    Ok(())
}

fn flag_is_set(conn: &Connection, key: &str) -> Result<bool> {
    if !schema::table_exists(conn, "meta")? {
        return Ok(false);
    }
    let value: Option<String> = conn
        .query_row(
            "SELECT value FROM meta WHERE key = ?1",
            params![key],
            |row| row.get(0),
        )
        .optional()?;
    Ok(value.is_some())
}

fn read_meta_raw(conn: &Connection, key: &str) -> Result<Option<String>> {
    if !schema::table_exists(conn, "meta")? {
        return Ok(None);
    }
    conn.query_row(
        "SELECT value FROM meta WHERE key = ?1",
        params![key],
        |row| row.get(0),
    )
    .optional()
    .map_err(Into::into)
}

fn read_meta_i64(conn: &Connection, key: &str) -> Result<Option<i64>> {
    let raw = match read_meta_raw(conn, key)? {
        Some(raw) => raw,
        None => return Ok(None),
    };
    match serde_json::from_str::<serde_json::Value>(&raw) {
        Ok(value) => Ok(value.as_i64()),
        Err(_) => {
            tracing::warn!(key, "ignoring malformed legacy meta value");
            Ok(None)
        }
    }
}

fn read_meta_string_list(conn: &Connection, key: &str) -> Result<Vec<String>> {
    let raw = match read_meta_raw(conn, key)? {
        Some(raw) => raw,
        None => return Ok(Vec::new()),
    };
    match serde_json::from_str::<Vec<String>>(&raw) {
        Ok(list) => Ok(list),
        Err(_) => {
            tracing::warn!(key, "ignoring malformed legacy meta value");
            Ok(Vec::new())
        }
    }
}

/// Distinct legacy labels from courses, preserving first-seen row order.
fn course_labels_in_first_seen_order(tx: &Transaction) -> Result<Vec<String>> {
    let mut stmt = tx.prepare("SELECT semester FROM courses ORDER BY created_at, id")?;
    let labels = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let mut seen = Vec::new();
    for label in labels {
        if !seen.contains(&label) {
            seen.push(label);
        }
    }
    Ok(seen)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::LEGACY_SCHEMA_V1;

    fn legacy_conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.pragma_update(None, "foreign_keys", true).unwrap();
        conn.execute_batch(LEGACY_SCHEMA_V1).unwrap();
        conn.execute(
            "INSERT INTO plans (id, name, passing_exam_threshold, created_at, updated_at)
             VALUES ('p1', 'My Degree', 56.0, '2023-01-01T00:00:00+00:00', '2023-01-01T00:00:00+00:00')",
            [],
        )
        .unwrap();
        conn
    }

    fn insert_legacy_course(conn: &Connection, id: &str, semester: &str, created_at: &str) {
        conn.execute(
            "INSERT INTO courses (id, degree_plan_id, name, credits, semester, created_at, updated_at)
             VALUES (?1, 'p1', 'Course', 3.0, ?2, ?3, ?3)",
            params![id, semester, created_at],
        )
        .unwrap();
    }

    fn set_meta(conn: &Connection, key: &str, value: &str) {
        conn.execute(
            "INSERT OR REPLACE INTO meta (key, value) VALUES (?1, ?2)",
            params![key, value],
        )
        .unwrap();
    }

    fn semester_names(conn: &Connection) -> Vec<(String, i64)> {
        let mut stmt = conn
            .prepare("SELECT name, order_index FROM semesters ORDER BY order_index")
            .unwrap();
        stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))
            .unwrap()
            .collect::<std::result::Result<Vec<_>, _>>()
            .unwrap()
    }

    #[test]
    fn fresh_database_is_created_at_current_version() {
        let mut conn = Connection::open_in_memory().unwrap();
        initialize(&mut conn).unwrap();
        assert_eq!(schema::stored_version(&conn).unwrap(), SCHEMA_VERSION);
        assert!(schema::table_exists(&conn, "semesters").unwrap());
    }

    #[test]
    fn legacy_labels_become_semesters_and_courses_are_rewritten() {
        let mut conn = legacy_conn();
        set_meta(&conn, LEGACY_COUNT_KEY, "3");
        set_meta(&conn, LEGACY_LABELS_KEY, r#"["", "Year One", ""]"#);
        insert_legacy_course(&conn, "c1", "1", "2023-01-01T00:00:00+00:00");
        insert_legacy_course(&conn, "c2", "2", "2023-01-02T00:00:00+00:00");
        insert_legacy_course(&conn, "c3", "Summer", "2023-01-03T00:00:00+00:00");
        insert_legacy_course(&conn, "c4", "9", "2023-01-04T00:00:00+00:00");

        initialize(&mut conn).unwrap();

        // 3 declared positions plus 2 appended extras, in order
        let names = semester_names(&conn);
        assert_eq!(
            names,
            vec![
                ("Semester 1".to_string(), 1),
                ("Year One".to_string(), 2),
                ("Semester 3".to_string(), 3),
                ("Summer".to_string(), 4),
                ("9".to_string(), 5),
            ]
        );

        // every course references a synthesized semester
        let dangling: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM courses
                 WHERE semester_id NOT IN (SELECT id FROM semesters)",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(dangling, 0);

        // the legacy column is gone
        assert!(conn
            .prepare("SELECT semester FROM courses")
            .is_err());

        assert_eq!(schema::stored_version(&conn).unwrap(), SCHEMA_VERSION);
    }

    #[test]
    fn custom_label_on_courses_maps_to_the_declared_semester() {
        let mut conn = legacy_conn();
        set_meta(&conn, LEGACY_COUNT_KEY, "2");
        set_meta(&conn, LEGACY_LABELS_KEY, r#"["", "Summer"]"#);
        insert_legacy_course(&conn, "c1", "Summer", "2023-01-01T00:00:00+00:00");

        initialize(&mut conn).unwrap();

        // no extra semester synthesized for the label of position 2
        assert_eq!(semester_names(&conn).len(), 2);
        let (course_semester, declared): (String, String) = conn
            .query_row(
                "SELECT c.semester_id, s.id FROM courses c, semesters s
                 WHERE c.id = 'c1' AND s.order_index = 2",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .unwrap();
        assert_eq!(course_semester, declared);
    }

    #[test]
    fn missing_legacy_config_defaults_to_eight_semesters() {
        let mut conn = legacy_conn();
        initialize(&mut conn).unwrap();
        assert_eq!(semester_names(&conn).len() as i64, DEFAULT_SEMESTER_COUNT);
    }

    #[test]
    fn migration_is_idempotent_across_reopens() {
        let mut conn = legacy_conn();
        set_meta(&conn, LEGACY_COUNT_KEY, "2");
        insert_legacy_course(&conn, "c1", "1", "2023-01-01T00:00:00+00:00");

        initialize(&mut conn).unwrap();
        let first = semester_names(&conn);

        initialize(&mut conn).unwrap();
        assert_eq!(semester_names(&conn), first);
    }

    #[test]
    fn completion_flag_short_circuits_even_without_a_version_row() {
        let mut conn = Connection::open_in_memory().unwrap();
        initialize(&mut conn).unwrap();
        conn.execute(
            "INSERT OR REPLACE INTO meta (key, value) VALUES (?1, 'true')",
            params![SEMESTERS_MIGRATED_FLAG],
        )
        .unwrap();
        conn.execute("DELETE FROM schema_version", []).unwrap();

        // stored version falls back to 1, but the flag prevents a second
        // normalization pass from touching the already-migrated tables
        initialize(&mut conn).unwrap();
        assert_eq!(schema::stored_version(&conn).unwrap(), SCHEMA_VERSION);
    }
}
