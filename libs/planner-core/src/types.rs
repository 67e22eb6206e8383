//! Core types for the degree planner.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ValidationError;

/// Display status of a course.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CourseStatus {
    NotStarted,
    InProgress,
    Completed,
}

impl Default for CourseStatus {
    fn default() -> Self {
        Self::NotStarted
    }
}

impl CourseStatus {
    /// Get the status name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotStarted => "not_started",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
        }
    }

    /// Parse from string.
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "not_started" => Some(Self::NotStarted),
            "in_progress" => Some(Self::InProgress),
            "completed" => Some(Self::Completed),
            _ => None,
        }
    }
}

/// Progress status of a single topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TopicStatus {
    NotStarted,
    InProgress,
    Done,
}

impl Default for TopicStatus {
    fn default() -> Self {
        Self::NotStarted
    }
}

impl TopicStatus {
    /// Get the status name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotStarted => "not_started",
            Self::InProgress => "in_progress",
            Self::Done => "done",
        }
    }

    /// Parse from string.
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "not_started" => Some(Self::NotStarted),
            "in_progress" => Some(Self::InProgress),
            "done" => Some(Self::Done),
            _ => None,
        }
    }
}

/// Top-level degree program. Only the first plan in the store is treated as
/// current by consumers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Plan {
    pub id: String,
    pub name: String,
    // historical wire name, kept snake_case for backup compatibility
    #[serde(rename = "passing_exam_threshold")]
    pub passing_exam_threshold: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Plan {
    /// Create a new plan with a fresh id and timestamps.
    pub fn new(name: &str, passing_exam_threshold: f64) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            passing_exam_threshold,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::EmptyField { field: "plan name" });
        }
        if !(0.0..=100.0).contains(&self.passing_exam_threshold) {
            return Err(ValidationError::ThresholdOutOfRange {
                threshold: self.passing_exam_threshold,
            });
        }
        Ok(())
    }

    /// Bump the modification timestamp.
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// A named, ordered bucket courses are assigned to. Ordering is by
/// `order_index`, ties broken by `created_at`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Semester {
    pub id: String,
    pub name: String,
    pub order_index: i64,
    pub created_at: DateTime<Utc>,
}

impl Semester {
    /// Create a new semester with a fresh id.
    pub fn new(name: &str, order_index: i64) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            order_index,
            created_at: Utc::now(),
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::EmptyField { field: "semester name" });
        }
        Ok(())
    }
}

/// A single academic course with credits, optional grade and a semester
/// assignment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Course {
    pub id: String,
    pub degree_plan_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    pub name: String,
    pub credits: f64,
    pub semester_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default)]
    pub grade: Option<f64>,
    /// Only authoritative while the course has zero topics; retained but
    /// ignored once topics exist.
    #[serde(default)]
    pub manual_status: CourseStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Course {
    /// Create a new course with a fresh id and timestamps.
    pub fn new(degree_plan_id: &str, name: &str, credits: f64, semester_id: &str) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            degree_plan_id: degree_plan_id.to_string(),
            code: None,
            name: name.to_string(),
            credits,
            semester_id: semester_id.to_string(),
            notes: None,
            grade: None,
            manual_status: CourseStatus::default(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::EmptyField { field: "course name" });
        }
        if !(self.credits > 0.0) {
            return Err(ValidationError::NonPositiveCredits {
                credits: self.credits,
            });
        }
        if let Some(grade) = self.grade {
            if !(0.0..=100.0).contains(&grade) {
                return Err(ValidationError::GradeOutOfRange { grade });
            }
        }
        Ok(())
    }

    /// Bump the modification timestamp.
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// A sub-unit of a course used for granular progress tracking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Topic {
    pub id: String,
    pub course_id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub status: TopicStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Topic {
    /// Create a new topic with a fresh id and timestamps.
    pub fn new(course_id: &str, title: &str) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            course_id: course_id.to_string(),
            title: title.to_string(),
            description: None,
            status: TopicStatus::default(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.title.trim().is_empty() {
            return Err(ValidationError::EmptyField { field: "topic title" });
        }
        Ok(())
    }

    /// Bump the modification timestamp.
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// Generic key/value entry. Values are opaque to the core and consumed by
/// unrelated subsystems (preferences, legacy config, migration flags).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetaEntry {
    pub key: String,
    pub value: serde_json::Value,
}

/// Course enriched with its topics and computed status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseWithTopics {
    #[serde(flatten)]
    pub course: Course,
    pub topics: Vec<Topic>,
    pub effective_status: CourseStatus,
}

impl CourseWithTopics {
    /// Attach topics to a course and compute its effective status.
    pub fn new(course: Course, topics: Vec<Topic>) -> Self {
        let effective_status = crate::status::effective_status(&course, &topics);
        Self {
            course,
            topics,
            effective_status,
        }
    }
}

/// One semester bucket of the roadmap view. `semester_id` is `None` for the
/// trailing synthetic group holding courses whose semester no longer exists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SemesterGroup {
    pub semester_id: Option<String>,
    pub semester_name: String,
    pub order_index: i64,
    pub courses: Vec<CourseWithTopics>,
    pub total_credits: f64,
    pub completed_credits: f64,
}

/// High-level degree progress metrics.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DegreeProgress {
    pub total_credits: f64,
    pub completed_credits: f64,
    pub percentage: f64,
}

/// Credit-weighted grade average over graded courses.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GpaResult {
    pub gpa: Option<f64>,
    pub graded_count: usize,
    pub total_credits: f64,
}

/// Course counts and remaining credits for dashboard summaries.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DegreeStats {
    pub completed_count: usize,
    pub in_progress_count: usize,
    pub remaining_credits: f64,
}
