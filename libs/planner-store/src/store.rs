//! Repository-style access to the degree-plan store.
//!
//! [`Store`] is an explicit handle owned by the application root and passed
//! to consumers; there is no process-wide singleton. All multi-collection
//! mutations run inside a single transaction and either commit completely
//! or roll back completely.

use std::path::Path;

use chrono::Utc;
use planner_core::types::{
    Course, CourseStatus, CourseWithTopics, DegreeProgress, DegreeStats, GpaResult, MetaEntry,
    Plan, Semester, SemesterGroup, Topic, TopicStatus,
};
use planner_core::{degree_gpa, degree_progress, degree_stats, group_by_semester};
use rusqlite::{params, Connection, OptionalExtension, Transaction};
use uuid::Uuid;

use crate::error::{Result, StoreError};
use crate::{lease, migrations, schema, time};

/// Name of the default plan seeded on first run.
pub const DEFAULT_PLAN_NAME: &str = "My Degree";
/// Passing exam threshold of the default plan.
pub const DEFAULT_PASSING_THRESHOLD: f64 = 56.0;

/// Repository for plan operations.
pub trait PlanRepository {
    fn get_plan(&self, id: &str) -> Result<Option<Plan>>;
    fn get_plans(&self) -> Result<Vec<Plan>>;
    /// The first plan in the store, treated as current by consumers.
    fn current_plan(&self) -> Result<Option<Plan>>;
    fn put_plan(&self, plan: &Plan) -> Result<()>;
    /// Delete a plan together with its courses and their topics.
    fn delete_plan(&mut self, id: &str) -> Result<()>;
}

/// Repository for semester operations.
pub trait SemesterRepository {
    fn get_semester(&self, id: &str) -> Result<Option<Semester>>;
    /// All semesters ordered by `order_index`, ties by `created_at`.
    fn get_semesters(&self) -> Result<Vec<Semester>>;
    fn put_semester(&self, semester: &Semester) -> Result<()>;
    /// Delete a semester, either cascading into its courses or reassigning
    /// them to another semester first.
    fn delete_semester(&mut self, id: &str, mode: SemesterDelete<'_>) -> Result<()>;
}

/// Repository for course operations.
pub trait CourseRepository {
    fn get_course(&self, id: &str) -> Result<Option<Course>>;
    fn get_courses(&self) -> Result<Vec<Course>>;
    fn get_courses_by_plan(&self, plan_id: &str) -> Result<Vec<Course>>;
    fn get_courses_by_semester(&self, semester_id: &str) -> Result<Vec<Course>>;
    fn put_course(&self, course: &Course) -> Result<()>;
    /// Delete a course together with its topics.
    fn delete_course(&mut self, id: &str) -> Result<()>;
}

/// Repository for topic operations.
pub trait TopicRepository {
    fn get_topic(&self, id: &str) -> Result<Option<Topic>>;
    fn get_topics(&self) -> Result<Vec<Topic>>;
    fn get_topics_by_course(&self, course_id: &str) -> Result<Vec<Topic>>;
    fn put_topic(&self, topic: &Topic) -> Result<()>;
    fn delete_topic(&self, id: &str) -> Result<()>;
}

/// Repository for the generic key/value surface.
pub trait MetaRepository {
    fn get_meta(&self, key: &str) -> Result<Option<serde_json::Value>>;
    fn put_meta(&self, key: &str, value: &serde_json::Value) -> Result<()>;
    fn delete_meta(&self, key: &str) -> Result<()>;
    fn get_all_meta(&self) -> Result<Vec<MetaEntry>>;
}

/// How to handle courses still assigned to a semester being deleted.
#[derive(Debug, Clone, Copy)]
pub enum SemesterDelete<'a> {
    /// Delete the referencing courses and their topics with the semester.
    Cascade,
    /// Move the referencing courses to the given semester, then delete only
    /// the semester row.
    Reassign(&'a str),
}

/// Handle to the persistent degree-plan store.
pub struct Store {
    conn: Connection,
    holder: String,
}

impl Store {
    /// Open the store at `path`, creating and migrating as needed.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path).map_err(|err| StoreError::Connection(err.to_string()))?;
        Self::from_connection(conn)
    }

    /// Open the store at the platform data directory.
    pub fn open_default() -> Result<Self> {
        let dir = dirs::data_dir()
            .ok_or_else(|| StoreError::Connection("no platform data directory".to_string()))?
            .join("degree-planner");
        std::fs::create_dir_all(&dir).map_err(|err| StoreError::Connection(err.to_string()))?;
        Self::open(dir.join("planner.db"))
    }

    /// Open an in-memory store (for testing).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|err| StoreError::Connection(err.to_string()))?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.pragma_update(None, "foreign_keys", true)?;
        lease::ensure_table(&conn)?;
        let holder = Uuid::new_v4().to_string();
        lease::acquire(&conn, &holder, Utc::now())?;

        // the lease releases on drop if migration fails below
        let mut store = Self { conn, holder };
        migrations::initialize(&mut store.conn)?;
        Ok(store)
    }

    /// Seed first-run defaults: one plan and eight semesters. A no-op on a
    /// store that already has data.
    pub fn bootstrap(&mut self) -> Result<()> {
        if self.get_plans()?.is_empty() {
            self.put_plan(&Plan::new(DEFAULT_PLAN_NAME, DEFAULT_PASSING_THRESHOLD))?;
        }
        if self.get_semesters()?.is_empty() {
            for position in 1..=migrations::DEFAULT_SEMESTER_COUNT {
                self.put_semester(&Semester::new(&format!("Semester {position}"), position))?;
            }
        }
        Ok(())
    }

    /// Extend this instance's advisory lease.
    pub fn renew_lease(&self) -> Result<()> {
        lease::renew(&self.conn, &self.holder, Utc::now()).map(|_| ())
    }

    /// Whether another instance has asked this one to release the store,
    /// typically to run a schema upgrade. A cooperative holder closes and
    /// re-opens.
    pub fn release_requested(&self) -> Result<bool> {
        lease::release_requested(&self.conn, &self.holder)
    }

    /// Release the lease and drop the connection. Call before destructive
    /// whole-store operations performed outside this handle.
    pub fn close(self) -> Result<()> {
        lease::release(&self.conn, &self.holder)
    }

    /// Clear every collection that exists in the current schema generation.
    /// Missing stores are skipped, so the call is safe mid-upgrade.
    pub fn clear_all(&mut self) -> Result<()> {
        self.with_tx("clear all", |tx| clear_collections(tx))
    }

    /// Courses of a plan enriched with topics and effective status.
    pub fn courses_with_topics(&self, plan_id: &str) -> Result<Vec<CourseWithTopics>> {
        let courses = self.get_courses_by_plan(plan_id)?;
        let mut enriched = Vec::with_capacity(courses.len());
        for course in courses {
            let topics = self.get_topics_by_course(&course.id)?;
            enriched.push(CourseWithTopics::new(course, topics));
        }
        Ok(enriched)
    }

    /// Roadmap view: one group per semester plus a trailing group for
    /// courses whose semester no longer exists.
    pub fn semester_groups(&self, plan_id: &str) -> Result<Vec<SemesterGroup>> {
        let enriched = self.courses_with_topics(plan_id)?;
        let semesters = self.get_semesters()?;
        Ok(group_by_semester(&enriched, &semesters))
    }

    /// Credit progress across a plan's courses.
    pub fn progress(&self, plan_id: &str) -> Result<DegreeProgress> {
        Ok(degree_progress(&self.courses_with_topics(plan_id)?))
    }

    /// Weighted GPA across a plan's graded courses.
    pub fn gpa(&self, plan_id: &str) -> Result<GpaResult> {
        let courses = self.get_courses_by_plan(plan_id)?;
        Ok(degree_gpa(courses.iter()))
    }

    /// Course counts and remaining credits for dashboard summaries.
    pub fn stats(&self, plan_id: &str) -> Result<DegreeStats> {
        Ok(degree_stats(&self.courses_with_topics(plan_id)?))
    }

    /// Run `f` inside a transaction; any error rolls the whole batch back.
    pub(crate) fn with_tx<T>(
        &mut self,
        operation: &'static str,
        f: impl FnOnce(&Transaction) -> Result<T>,
    ) -> Result<T> {
        let tx = self.conn.transaction()?;
        let out = match f(&tx) {
            Ok(out) => out,
            Err(err) => {
                // dropping the transaction rolls it back
                return Err(StoreError::TransactionAbort {
                    operation,
                    source: Box::new(err),
                });
            }
        };
        tx.commit().map_err(|err| StoreError::TransactionAbort {
            operation,
            source: Box::new(err.into()),
        })?;
        Ok(out)
    }

    fn row_to_plan(row: &rusqlite::Row) -> rusqlite::Result<Plan> {
        Ok(Plan {
            id: row.get(0)?,
            name: row.get(1)?,
            passing_exam_threshold: row.get(2)?,
            created_at: time::from_sql(3, row.get::<_, String>(3)?)?,
            updated_at: time::from_sql(4, row.get::<_, String>(4)?)?,
        })
    }

    fn row_to_semester(row: &rusqlite::Row) -> rusqlite::Result<Semester> {
        Ok(Semester {
            id: row.get(0)?,
            name: row.get(1)?,
            order_index: row.get(2)?,
            created_at: time::from_sql(3, row.get::<_, String>(3)?)?,
        })
    }

    fn row_to_course(row: &rusqlite::Row) -> rusqlite::Result<Course> {
        Ok(Course {
            id: row.get(0)?,
            degree_plan_id: row.get(1)?,
            code: row.get(2)?,
            name: row.get(3)?,
            credits: row.get(4)?,
            semester_id: row.get(5)?,
            notes: row.get(6)?,
            grade: row.get(7)?,
            manual_status: CourseStatus::from_str(&row.get::<_, String>(8)?).unwrap_or_default(),
            created_at: time::from_sql(9, row.get::<_, String>(9)?)?,
            updated_at: time::from_sql(10, row.get::<_, String>(10)?)?,
        })
    }

    fn row_to_topic(row: &rusqlite::Row) -> rusqlite::Result<Topic> {
        Ok(Topic {
            id: row.get(0)?,
            course_id: row.get(1)?,
            title: row.get(2)?,
            description: row.get(3)?,
            status: TopicStatus::from_str(&row.get::<_, String>(4)?).unwrap_or_default(),
            created_at: time::from_sql(5, row.get::<_, String>(5)?)?,
            updated_at: time::from_sql(6, row.get::<_, String>(6)?)?,
        })
    }
}

impl Drop for Store {
    fn drop(&mut self) {
        let _ = lease::release(&self.conn, &self.holder);
    }
}

const PLAN_COLUMNS: &str = "id, name, passing_exam_threshold, created_at, updated_at";
const SEMESTER_COLUMNS: &str = "id, name, order_index, created_at";
const COURSE_COLUMNS: &str = "id, degree_plan_id, code, name, credits, semester_id, notes, grade, \
                              manual_status, created_at, updated_at";
const TOPIC_COLUMNS: &str = "id, course_id, title, description, status, created_at, updated_at";

impl PlanRepository for Store {
    fn get_plan(&self, id: &str) -> Result<Option<Plan>> {
        self.conn
            .query_row(
                &format!("SELECT {PLAN_COLUMNS} FROM plans WHERE id = ?1"),
                params![id],
                Self::row_to_plan,
            )
            .optional()
            .map_err(Into::into)
    }

    fn get_plans(&self) -> Result<Vec<Plan>> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {PLAN_COLUMNS} FROM plans ORDER BY created_at, id"))?;
        let plans = stmt
            .query_map([], Self::row_to_plan)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(plans)
    }

    fn current_plan(&self) -> Result<Option<Plan>> {
        Ok(self.get_plans()?.into_iter().next())
    }

    fn put_plan(&self, plan: &Plan) -> Result<()> {
        plan.validate()?;
        insert_plan(&self.conn, plan)
    }

    fn delete_plan(&mut self, id: &str) -> Result<()> {
        self.with_tx("delete plan", |tx| {
            let course_ids = ids(tx, "SELECT id FROM courses WHERE degree_plan_id = ?1", id)?;
            for course_id in &course_ids {
                tx.execute("DELETE FROM topics WHERE course_id = ?1", params![course_id])?;
            }
            tx.execute("DELETE FROM courses WHERE degree_plan_id = ?1", params![id])?;
            tx.execute("DELETE FROM plans WHERE id = ?1", params![id])?;
            Ok(())
        })
    }
}

impl SemesterRepository for Store {
    fn get_semester(&self, id: &str) -> Result<Option<Semester>> {
        self.conn
            .query_row(
                &format!("SELECT {SEMESTER_COLUMNS} FROM semesters WHERE id = ?1"),
                params![id],
                Self::row_to_semester,
            )
            .optional()
            .map_err(Into::into)
    }

    fn get_semesters(&self) -> Result<Vec<Semester>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {SEMESTER_COLUMNS} FROM semesters ORDER BY order_index, created_at, id"
        ))?;
        let semesters = stmt
            .query_map([], Self::row_to_semester)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(semesters)
    }

    fn put_semester(&self, semester: &Semester) -> Result<()> {
        semester.validate()?;
        insert_semester(&self.conn, semester)
    }

    fn delete_semester(&mut self, id: &str, mode: SemesterDelete<'_>) -> Result<()> {
        match mode {
            SemesterDelete::Reassign(target) => {
                if target == id {
                    return Err(StoreError::Validation(
                        "cannot reassign courses to the semester being deleted".to_string(),
                    ));
                }
                if self.get_semester(target)?.is_none() {
                    return Err(StoreError::Referential(format!(
                        "unknown reassignment target semester '{target}'"
                    )));
                }
                self.with_tx("delete semester", |tx| {
                    tx.execute(
                        "UPDATE courses SET semester_id = ?1, updated_at = ?2 WHERE semester_id = ?3",
                        params![target, time::to_sql(&Utc::now()), id],
                    )?;
                    tx.execute("DELETE FROM semesters WHERE id = ?1", params![id])?;
                    Ok(())
                })
            }
            SemesterDelete::Cascade => self.with_tx("delete semester", |tx| {
                let course_ids = ids(tx, "SELECT id FROM courses WHERE semester_id = ?1", id)?;
                for course_id in &course_ids {
                    tx.execute("DELETE FROM topics WHERE course_id = ?1", params![course_id])?;
                }
                tx.execute("DELETE FROM courses WHERE semester_id = ?1", params![id])?;
                tx.execute("DELETE FROM semesters WHERE id = ?1", params![id])?;
                Ok(())
            }),
        }
    }
}

impl CourseRepository for Store {
    fn get_course(&self, id: &str) -> Result<Option<Course>> {
        self.conn
            .query_row(
                &format!("SELECT {COURSE_COLUMNS} FROM courses WHERE id = ?1"),
                params![id],
                Self::row_to_course,
            )
            .optional()
            .map_err(Into::into)
    }

    fn get_courses(&self) -> Result<Vec<Course>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {COURSE_COLUMNS} FROM courses ORDER BY created_at, id"
        ))?;
        let courses = stmt
            .query_map([], Self::row_to_course)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(courses)
    }

    fn get_courses_by_plan(&self, plan_id: &str) -> Result<Vec<Course>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {COURSE_COLUMNS} FROM courses WHERE degree_plan_id = ?1 ORDER BY created_at, id"
        ))?;
        let courses = stmt
            .query_map(params![plan_id], Self::row_to_course)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(courses)
    }

    fn get_courses_by_semester(&self, semester_id: &str) -> Result<Vec<Course>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {COURSE_COLUMNS} FROM courses WHERE semester_id = ?1 ORDER BY created_at, id"
        ))?;
        let courses = stmt
            .query_map(params![semester_id], Self::row_to_course)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(courses)
    }

    fn put_course(&self, course: &Course) -> Result<()> {
        course.validate()?;
        require_exists(&self.conn, Parent::Plan, &course.degree_plan_id)?;
        require_exists(&self.conn, Parent::Semester, &course.semester_id)?;
        insert_course(&self.conn, course)
    }

    fn delete_course(&mut self, id: &str) -> Result<()> {
        self.with_tx("delete course", |tx| {
            tx.execute("DELETE FROM topics WHERE course_id = ?1", params![id])?;
            tx.execute("DELETE FROM courses WHERE id = ?1", params![id])?;
            Ok(())
        })
    }
}

impl TopicRepository for Store {
    fn get_topic(&self, id: &str) -> Result<Option<Topic>> {
        self.conn
            .query_row(
                &format!("SELECT {TOPIC_COLUMNS} FROM topics WHERE id = ?1"),
                params![id],
                Self::row_to_topic,
            )
            .optional()
            .map_err(Into::into)
    }

    fn get_topics(&self) -> Result<Vec<Topic>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {TOPIC_COLUMNS} FROM topics ORDER BY created_at, id"
        ))?;
        let topics = stmt
            .query_map([], Self::row_to_topic)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(topics)
    }

    fn get_topics_by_course(&self, course_id: &str) -> Result<Vec<Topic>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {TOPIC_COLUMNS} FROM topics WHERE course_id = ?1 ORDER BY created_at, id"
        ))?;
        let topics = stmt
            .query_map(params![course_id], Self::row_to_topic)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(topics)
    }

    fn put_topic(&self, topic: &Topic) -> Result<()> {
        topic.validate()?;
        require_exists(&self.conn, Parent::Course, &topic.course_id)?;
        insert_topic(&self.conn, topic)
    }

    fn delete_topic(&self, id: &str) -> Result<()> {
        self.conn
            .execute("DELETE FROM topics WHERE id = ?1", params![id])?;
        Ok(())
    }
}

impl MetaRepository for Store {
    fn get_meta(&self, key: &str) -> Result<Option<serde_json::Value>> {
        let raw: Option<String> = self
            .conn
            .query_row(
                "SELECT value FROM meta WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        match raw {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    fn put_meta(&self, key: &str, value: &serde_json::Value) -> Result<()> {
        insert_meta(&self.conn, key, value)
    }

    fn delete_meta(&self, key: &str) -> Result<()> {
        self.conn
            .execute("DELETE FROM meta WHERE key = ?1", params![key])?;
        Ok(())
    }

    fn get_all_meta(&self) -> Result<Vec<MetaEntry>> {
        let mut stmt = self
            .conn
            .prepare("SELECT key, value FROM meta ORDER BY key")?;
        let raw = stmt
            .query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let mut entries = Vec::with_capacity(raw.len());
        for (key, value) in raw {
            entries.push(MetaEntry {
                key,
                value: serde_json::from_str(&value)?,
            });
        }
        Ok(entries)
    }
}

#[derive(Debug, Clone, Copy)]
enum Parent {
    Plan,
    Semester,
    Course,
}

impl Parent {
    fn lookup_sql(self) -> &'static str {
        match self {
            Self::Plan => "SELECT 1 FROM plans WHERE id = ?1",
            Self::Semester => "SELECT 1 FROM semesters WHERE id = ?1",
            Self::Course => "SELECT 1 FROM courses WHERE id = ?1",
        }
    }

    fn label(self) -> &'static str {
        match self {
            Self::Plan => "plan",
            Self::Semester => "semester",
            Self::Course => "course",
        }
    }
}

/// Parent-existence check performed before inserting a child row.
fn require_exists(conn: &Connection, parent: Parent, id: &str) -> Result<()> {
    let found: Option<i64> = conn
        .query_row(parent.lookup_sql(), params![id], |row| row.get(0))
        .optional()?;
    if found.is_none() {
        return Err(StoreError::Referential(format!(
            "unknown {} '{id}'",
            parent.label()
        )));
    }
    Ok(())
}

fn ids(conn: &Connection, sql: &str, key: &str) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(sql)?;
    let ids = stmt
        .query_map(params![key], |row| row.get::<_, String>(0))?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(ids)
}

/// Delete every collection that exists, children before parents so foreign
/// keys hold mid-transaction.
pub(crate) fn clear_collections(conn: &Connection) -> Result<()> {
    for table in ["topics", "courses", "semesters", "plans", "meta"] {
        if schema::table_exists(conn, table)? {
            conn.execute(&format!("DELETE FROM {table}"), [])?;
        }
    }
    Ok(())
}

pub(crate) fn insert_plan(conn: &Connection, plan: &Plan) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO plans (id, name, passing_exam_threshold, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            plan.id,
            plan.name,
            plan.passing_exam_threshold,
            time::to_sql(&plan.created_at),
            time::to_sql(&plan.updated_at)
        ],
    )?;
    Ok(())
}

pub(crate) fn insert_semester(conn: &Connection, semester: &Semester) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO semesters (id, name, order_index, created_at)
         VALUES (?1, ?2, ?3, ?4)",
        params![
            semester.id,
            semester.name,
            semester.order_index,
            time::to_sql(&semester.created_at)
        ],
    )?;
    Ok(())
}

pub(crate) fn insert_course(conn: &Connection, course: &Course) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO courses (id, degree_plan_id, code, name, credits, semester_id,
             notes, grade, manual_status, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        params![
            course.id,
            course.degree_plan_id,
            course.code,
            course.name,
            course.credits,
            course.semester_id,
            course.notes,
            course.grade,
            course.manual_status.as_str(),
            time::to_sql(&course.created_at),
            time::to_sql(&course.updated_at)
        ],
    )?;
    Ok(())
}

pub(crate) fn insert_topic(conn: &Connection, topic: &Topic) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO topics (id, course_id, title, description, status, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            topic.id,
            topic.course_id,
            topic.title,
            topic.description,
            topic.status.as_str(),
            time::to_sql(&topic.created_at),
            time::to_sql(&topic.updated_at)
        ],
    )?;
    Ok(())
}

pub(crate) fn insert_meta(conn: &Connection, key: &str, value: &serde_json::Value) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO meta (key, value) VALUES (?1, ?2)",
        params![key, serde_json::to_string(value)?],
    )?;
    Ok(())
}
