//! SQLite-backed persistent store for the degree planner.
//!
//! Provides:
//! - Versioned schema with ordered, idempotent migrations
//! - Repository-style CRUD with cascading deletes in single transactions
//! - Referential checks at the storage boundary
//! - An advisory lease coordinating access across instances
//! - Backup export/import as a portable JSON document

pub mod backup;
pub mod error;
pub mod lease;
pub mod migrations;
pub mod schema;
pub mod store;
mod time;

pub use backup::{BackupData, BackupDocument, ImportMode, ImportSummary, BACKUP_VERSION};
pub use error::{Result, StoreError};
pub use lease::{Lease, LEASE_TTL_SECONDS};
pub use migrations::{DEFAULT_SEMESTER_COUNT, SEMESTERS_MIGRATED_FLAG};
pub use schema::SCHEMA_VERSION;
pub use store::{
    CourseRepository, MetaRepository, PlanRepository, SemesterDelete, SemesterRepository, Store,
    TopicRepository, DEFAULT_PASSING_THRESHOLD, DEFAULT_PLAN_NAME,
};
