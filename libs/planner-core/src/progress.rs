//! Semester grouping and degree progress aggregation.

use std::collections::HashMap;

use crate::types::{
    CourseStatus, CourseWithTopics, DegreeProgress, DegreeStats, Semester, SemesterGroup,
};

/// Name shown for the trailing group of courses whose semester is gone.
const ORPHAN_GROUP_NAME: &str = "Unassigned";

/// Group courses into semesters for roadmap rendering.
///
/// Produces one group per declared semester, ordered by `order_index` with
/// ties broken by `created_at`. A course whose `semester_id` matches no known
/// semester lands in a trailing synthetic group instead of being dropped, so
/// every course appears in exactly one group.
pub fn group_by_semester(
    courses: &[CourseWithTopics],
    semesters: &[Semester],
) -> Vec<SemesterGroup> {
    let mut ordered: Vec<&Semester> = semesters.iter().collect();
    ordered.sort_by(|a, b| {
        a.order_index
            .cmp(&b.order_index)
            .then_with(|| a.created_at.cmp(&b.created_at))
    });

    let index_of: HashMap<&str, usize> = ordered
        .iter()
        .enumerate()
        .map(|(i, s)| (s.id.as_str(), i))
        .collect();

    let mut groups: Vec<SemesterGroup> = ordered
        .iter()
        .map(|s| SemesterGroup {
            semester_id: Some(s.id.clone()),
            semester_name: s.name.clone(),
            order_index: s.order_index,
            courses: Vec::new(),
            total_credits: 0.0,
            completed_credits: 0.0,
        })
        .collect();

    let mut orphans: Vec<&CourseWithTopics> = Vec::new();
    for course in courses {
        match index_of.get(course.course.semester_id.as_str()) {
            Some(&i) => add_course(&mut groups[i], course),
            None => orphans.push(course),
        }
    }

    if !orphans.is_empty() {
        let order_index = groups.last().map(|g| g.order_index + 1).unwrap_or(1);
        let mut orphan_group = SemesterGroup {
            semester_id: None,
            semester_name: ORPHAN_GROUP_NAME.to_string(),
            order_index,
            courses: Vec::new(),
            total_credits: 0.0,
            completed_credits: 0.0,
        };
        for course in orphans {
            add_course(&mut orphan_group, course);
        }
        groups.push(orphan_group);
    }

    groups
}

fn add_course(group: &mut SemesterGroup, course: &CourseWithTopics) {
    group.total_credits += course.course.credits;
    if course.effective_status == CourseStatus::Completed {
        group.completed_credits += course.course.credits;
    }
    group.courses.push(course.clone());
}

/// Calculate high-level degree progress metrics.
pub fn degree_progress(courses: &[CourseWithTopics]) -> DegreeProgress {
    let total_credits: f64 = courses.iter().map(|c| c.course.credits).sum();
    let completed_credits: f64 = courses
        .iter()
        .filter(|c| c.effective_status == CourseStatus::Completed)
        .map(|c| c.course.credits)
        .sum();

    let percentage = if total_credits > 0.0 {
        completed_credits / total_credits * 100.0
    } else {
        0.0
    };

    DegreeProgress {
        total_credits,
        completed_credits,
        percentage,
    }
}

/// Course counts and remaining credits for dashboard summaries.
pub fn degree_stats(courses: &[CourseWithTopics]) -> DegreeStats {
    let progress = degree_progress(courses);
    DegreeStats {
        completed_count: courses
            .iter()
            .filter(|c| c.effective_status == CourseStatus::Completed)
            .count(),
        in_progress_count: courses
            .iter()
            .filter(|c| c.effective_status == CourseStatus::InProgress)
            .count(),
        remaining_credits: (progress.total_credits - progress.completed_credits).max(0.0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Course;
    use chrono::{Duration, Utc};
    use pretty_assertions::assert_eq;

    fn semester(name: &str, order_index: i64) -> Semester {
        Semester::new(name, order_index)
    }

    fn enrolled(semester_id: &str, credits: f64, status: CourseStatus) -> CourseWithTopics {
        let mut course = Course::new("p1", "course", credits, semester_id);
        course.manual_status = status;
        CourseWithTopics::new(course, Vec::new())
    }

    #[test]
    fn groups_follow_order_index_with_created_at_ties() {
        let first = semester("Winter", 1);
        let mut early = semester("Spring A", 2);
        let mut late = semester("Spring B", 2);
        early.created_at = Utc::now() - Duration::days(2);
        late.created_at = Utc::now();

        let groups = group_by_semester(&[], &[late.clone(), first.clone(), early.clone()]);
        let names: Vec<&str> = groups.iter().map(|g| g.semester_name.as_str()).collect();
        assert_eq!(names, vec!["Winter", "Spring A", "Spring B"]);
    }

    #[test]
    fn every_course_lands_in_exactly_one_group() {
        let s1 = semester("Semester 1", 1);
        let s2 = semester("Semester 2", 2);
        let courses = vec![
            enrolled(&s1.id, 3.0, CourseStatus::Completed),
            enrolled(&s2.id, 4.0, CourseStatus::NotStarted),
            enrolled("missing-semester", 2.0, CourseStatus::NotStarted),
        ];

        let groups = group_by_semester(&courses, &[s1, s2]);
        let placed: usize = groups.iter().map(|g| g.courses.len()).sum();
        assert_eq!(placed, courses.len());
    }

    #[test]
    fn dangling_courses_fall_into_trailing_orphan_group() {
        let s1 = semester("Semester 1", 1);
        let courses = vec![
            enrolled(&s1.id, 3.0, CourseStatus::NotStarted),
            enrolled("gone-a", 2.0, CourseStatus::Completed),
            enrolled("gone-b", 1.0, CourseStatus::NotStarted),
        ];

        let groups = group_by_semester(&courses, &[s1]);
        assert_eq!(groups.len(), 2);

        let orphans = groups.last().unwrap();
        assert_eq!(orphans.semester_id, None);
        assert_eq!(orphans.semester_name, "Unassigned");
        assert_eq!(orphans.courses.len(), 2);
        assert_eq!(orphans.total_credits, 3.0);
        assert_eq!(orphans.completed_credits, 2.0);
    }

    #[test]
    fn group_credits_are_aggregated() {
        let s1 = semester("Semester 1", 1);
        let courses = vec![
            enrolled(&s1.id, 3.0, CourseStatus::Completed),
            enrolled(&s1.id, 4.0, CourseStatus::InProgress),
        ];

        let groups = group_by_semester(&courses, &[s1]);
        assert_eq!(groups[0].total_credits, 7.0);
        assert_eq!(groups[0].completed_credits, 3.0);
    }

    #[test]
    fn progress_percentage() {
        let courses = vec![
            enrolled("s1", 3.0, CourseStatus::Completed),
            enrolled("s1", 4.0, CourseStatus::InProgress),
            enrolled("s1", 3.0, CourseStatus::NotStarted),
        ];

        let progress = degree_progress(&courses);
        assert_eq!(progress.total_credits, 10.0);
        assert_eq!(progress.completed_credits, 3.0);
        assert_eq!(progress.percentage, 30.0);
    }

    #[test]
    fn progress_handles_zero_credits() {
        let progress = degree_progress(&[]);
        assert_eq!(progress.percentage, 0.0);
    }

    #[test]
    fn stats_count_courses_and_remaining_credits() {
        let courses = vec![
            enrolled("s1", 3.0, CourseStatus::Completed),
            enrolled("s1", 4.0, CourseStatus::InProgress),
            enrolled("s1", 5.0, CourseStatus::NotStarted),
        ];

        let stats = degree_stats(&courses);
        assert_eq!(stats.completed_count, 1);
        assert_eq!(stats.in_progress_count, 1);
        assert_eq!(stats.remaining_credits, 9.0);
    }
}
