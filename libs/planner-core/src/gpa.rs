//! Degree GPA calculation.

use crate::types::{Course, GpaResult};

/// Compute the credit-weighted grade average over graded courses, rounded to
/// one decimal.
///
/// Courses without a grade are skipped entirely. If no graded course exists
/// the GPA is absent. If graded courses exist but none carries positive
/// credits, the unweighted mean of grades is used instead.
pub fn degree_gpa<'a, I>(courses: I) -> GpaResult
where
    I: IntoIterator<Item = &'a Course>,
{
    let mut total_weighted_score = 0.0;
    let mut total_credits = 0.0;
    let mut graded_count = 0usize;
    let mut simple_sum = 0.0;

    for course in courses {
        if let Some(grade) = course.grade {
            graded_count += 1;
            simple_sum += grade;

            if course.credits > 0.0 {
                total_weighted_score += grade * course.credits;
                total_credits += course.credits;
            }
        }
    }

    if graded_count == 0 {
        return GpaResult {
            gpa: None,
            graded_count: 0,
            total_credits: 0.0,
        };
    }

    if total_credits == 0.0 {
        return GpaResult {
            gpa: Some(round1(simple_sum / graded_count as f64)),
            graded_count,
            total_credits: 0.0,
        };
    }

    GpaResult {
        gpa: Some(round1(total_weighted_score / total_credits)),
        graded_count,
        total_credits,
    }
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
