//! Effective course status derivation.

use crate::types::{Course, CourseStatus, Topic, TopicStatus};

/// Determine the display status of a course based on its topics.
///
/// With no topics the manual user-set status wins (default `not_started`).
/// Otherwise: every topic done means `completed`, any topic started means
/// `in_progress`, else `not_started`. Pure and order-independent in the
/// topic list.
pub fn effective_status(course: &Course, topics: &[Topic]) -> CourseStatus {
    if topics.is_empty() {
        return course.manual_status;
    }

    if topics.iter().all(|t| t.status == TopicStatus::Done) {
        return CourseStatus::Completed;
    }

    let any_started = topics
        .iter()
        .any(|t| matches!(t.status, TopicStatus::InProgress | TopicStatus::Done));
    if any_started {
        CourseStatus::InProgress
    } else {
        CourseStatus::NotStarted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn course() -> Course {
        Course::new("p1", "Calculus", 5.0, "s1")
    }

    fn topic(status: TopicStatus) -> Topic {
        let mut t = Topic::new("c1", "chapter");
        t.status = status;
        t
    }

    #[test]
    fn no_topics_falls_back_to_manual_status() {
        let mut c = course();
        assert_eq!(effective_status(&c, &[]), CourseStatus::NotStarted);

        c.manual_status = CourseStatus::Completed;
        assert_eq!(effective_status(&c, &[]), CourseStatus::Completed);
    }

    #[test]
    fn all_topics_done_means_completed() {
        let topics = vec![topic(TopicStatus::Done), topic(TopicStatus::Done)];
        assert_eq!(effective_status(&course(), &topics), CourseStatus::Completed);
    }

    #[test]
    fn any_started_topic_means_in_progress() {
        let topics = vec![topic(TopicStatus::NotStarted), topic(TopicStatus::InProgress)];
        assert_eq!(effective_status(&course(), &topics), CourseStatus::InProgress);
    }

    #[test]
    fn untouched_topics_mean_not_started() {
        let topics = vec![topic(TopicStatus::NotStarted), topic(TopicStatus::NotStarted)];
        assert_eq!(effective_status(&course(), &topics), CourseStatus::NotStarted);
    }

    #[test]
    fn manual_status_is_ignored_once_topics_exist() {
        let mut c = course();
        c.manual_status = CourseStatus::Completed;
        let topics = vec![topic(TopicStatus::NotStarted)];
        assert_eq!(effective_status(&c, &topics), CourseStatus::NotStarted);
    }

    #[test]
    fn result_is_independent_of_topic_order() {
        let a = topic(TopicStatus::Done);
        let b = topic(TopicStatus::InProgress);
        let c = topic(TopicStatus::NotStarted);

        let forward = vec![a.clone(), b.clone(), c.clone()];
        let backward = vec![c, b, a];
        assert_eq!(
            effective_status(&course(), &forward),
            effective_status(&course(), &backward)
        );
    }
}
