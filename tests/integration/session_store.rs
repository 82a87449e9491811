//! Session persistence across process boundaries: reload, corruption
//! tolerance, isolation of storage roots.

use tempfile::TempDir;

use maestro::event::{AgentEvent, AgentRole, EventKind};
use maestro::plan::TaskStatus;
use maestro::session::{history, HistoryOptions, Session, SessionStatus};

use crate::fixtures;

#[test]
fn reload_resumes_exact_state() {
    let dir = TempDir::new().unwrap();
    let session = Session::new(fixtures::diamond_plan(), dir.path());
    let id = session.id();

    for task in ["a", "b"] {
        session
            .update_progress(&AgentEvent::new(
                AgentRole::Executor,
                EventKind::Started,
                task,
                "working",
            ))
            .unwrap();
        session
            .update_progress(&AgentEvent::new(
                AgentRole::Executor,
                EventKind::Completed,
                task,
                "done",
            ))
            .unwrap();
    }
    drop(session);

    let reloaded = Session::load(dir.path(), id).unwrap();
    let state = reloaded.snapshot();
    assert_eq!(state.completed_tasks, 2);
    assert_eq!(state.task_statuses["a"], TaskStatus::Completed);
    assert_eq!(state.task_statuses["c"], TaskStatus::Pending);
    assert_eq!(state.plan.tasks.len(), 4);
    assert!((state.progress() - 50.0).abs() < f64::EPSILON);

    // Progress continues seamlessly after reload.
    reloaded
        .update_progress(&AgentEvent::new(
            AgentRole::Executor,
            EventKind::Failed,
            "c",
            "broke",
        ))
        .unwrap();
    assert_eq!(reloaded.snapshot().failed_tasks, 1);
}

#[test]
fn corrupt_neighbors_do_not_break_history() {
    let dir = TempDir::new().unwrap();
    let session = Session::new(fixtures::diamond_plan(), dir.path());
    session.set_status(SessionStatus::Completed).unwrap();

    std::fs::write(dir.path().join("broken.json"), "}{ not json").unwrap();
    std::fs::write(dir.path().join("half.json"), r#"{"version":1}"#).unwrap();

    let summaries = history(dir.path(), &HistoryOptions::default()).unwrap();
    assert_eq!(summaries.len(), 1);
    assert_eq!(summaries[0].id, session.id());
}

#[test]
fn separate_roots_never_collide() {
    let dir_a = TempDir::new().unwrap();
    let dir_b = TempDir::new().unwrap();

    let session_a = Session::new(fixtures::diamond_plan(), dir_a.path());
    session_a.save().unwrap();
    let session_b = Session::new(fixtures::diamond_plan(), dir_b.path());
    session_b.save().unwrap();

    let in_a = history(dir_a.path(), &HistoryOptions::default()).unwrap();
    let in_b = history(dir_b.path(), &HistoryOptions::default()).unwrap();
    assert_eq!(in_a.len(), 1);
    assert_eq!(in_b.len(), 1);
    assert_ne!(in_a[0].id, in_b[0].id);
}

#[test]
fn every_mutation_is_immediately_durable() {
    let dir = TempDir::new().unwrap();
    let session = Session::new(fixtures::diamond_plan(), dir.path());
    let id = session.id();

    session
        .update_progress(&AgentEvent::new(
            AgentRole::Executor,
            EventKind::Started,
            "a",
            "working",
        ))
        .unwrap();

    // A second reader sees the update without any explicit save call.
    let observer = Session::load(dir.path(), id).unwrap();
    assert_eq!(observer.snapshot().task_statuses["a"], TaskStatus::Active);
}
