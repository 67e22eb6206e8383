//! Shared fixtures for store integration tests.

use planner_store::{
    CourseRepository, MetaRepository, PlanRepository, SemesterRepository, Store, TopicRepository,
};

use planner_core::types::{Course, Topic, TopicStatus};
use tempfile::TempDir;

/// Open a file-backed store inside a fresh temp directory.
///
/// The directory guard must stay alive for as long as the store is used.
pub fn temp_store() -> (TempDir, Store) {
    let dir = TempDir::new().expect("create temp dir");
    let store = Store::open(dir.path().join("planner.db")).expect("open store");
    (dir, store)
}

/// Seed a realistic data set: the bootstrap defaults plus one course with
/// topics, a grade, and a meta preference.
pub fn populate(store: &mut Store) -> Course {
    store.bootstrap().expect("bootstrap");

    let plan = store.current_plan().unwrap().expect("bootstrap plan");
    let semester = store.get_semesters().unwrap().remove(0);

    let mut course = Course::new(&plan.id, "Operating Systems", 5.0, &semester.id);
    course.code = Some("CS-350".to_string());
    course.grade = Some(91.0);
    store.put_course(&course).unwrap();

    let mut done = Topic::new(&course.id, "Scheduling");
    done.status = TopicStatus::Done;
    store.put_topic(&done).unwrap();
    store.put_topic(&Topic::new(&course.id, "File systems")).unwrap();

    store
        .put_meta("locale", &serde_json::json!("en"))
        .unwrap();

    course
}
