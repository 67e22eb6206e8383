//! Error types for planner-core.

use thiserror::Error;

/// Result type alias using ValidationError.
pub type Result<T> = std::result::Result<T, ValidationError>;

/// Errors raised when an entity fails field validation.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("{field} must not be empty")]
    EmptyField { field: &'static str },

    #[error("credits must be positive, got {credits}")]
    NonPositiveCredits { credits: f64 },

    #[error("grade {grade} is outside the 0-100 range")]
    GradeOutOfRange { grade: f64 },

    #[error("passing threshold {threshold} is outside the 0-100 range")]
    ThresholdOutOfRange { threshold: f64 },
}
