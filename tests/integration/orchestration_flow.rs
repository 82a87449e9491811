//! End-to-end orchestration: launch, live event fan-out, natural exit,
//! persisted session, history.

use std::time::{Duration, Instant};

use tempfile::TempDir;

use maestro::config::Config;
use maestro::coordinator::{Coordinator, View};
use maestro::plan::TaskStatus;
use maestro::session::{history, HistoryOptions, SessionStatus};

use crate::fixtures;

fn coordinator_for(dir: &TempDir, script: &std::path::Path) -> Coordinator {
    let config = Config {
        command: Some(script.to_string_lossy().to_string()),
        ..Default::default()
    };
    Coordinator::new(&config, dir.path().join("sessions"))
}

/// Pump ticks until orchestration ends or the deadline passes.
async fn pump_until_done(coordinator: &mut Coordinator, limit: Duration) {
    let deadline = Instant::now() + limit;
    while coordinator.is_orchestrating() && Instant::now() < deadline {
        coordinator.on_tick();
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn full_run_converges_every_view() {
    let dir = TempDir::new().unwrap();
    let script = fixtures::successful_run_script(&dir);
    let mut coordinator = coordinator_for(&dir, &script);
    coordinator.set_plan(fixtures::diamond_plan());

    coordinator.launch().await.unwrap();
    assert_eq!(coordinator.view(), View::Dashboard);

    pump_until_done(&mut coordinator, Duration::from_secs(10)).await;
    assert!(!coordinator.is_orchestrating());

    // Session reached a terminal state with all tasks completed.
    let state = coordinator.session().unwrap().snapshot();
    assert_eq!(state.status, SessionStatus::Completed);
    assert_eq!(state.completed_tasks, 4);
    assert_eq!(state.failed_tasks, 0);
    assert!(state.end_time.is_some());
    for task in ["a", "b", "c", "d"] {
        assert_eq!(state.task_statuses[task], TaskStatus::Completed);
    }

    // Dashboard converged to the same truth.
    let dashboard = coordinator.dashboard().unwrap();
    assert_eq!(dashboard.completed_tasks(), 4);
    assert_eq!(dashboard.success_rate(), 100.0);
    assert!(dashboard.pending_queue().is_empty());

    // Event log holds the full stream: 4 started + 4 completed.
    assert_eq!(coordinator.event_log().unwrap().len(), 8);

    // Graph nodes all completed.
    let graph = coordinator.graph().unwrap();
    for task in ["a", "b", "c", "d"] {
        assert_eq!(graph.status_of(task), Some(TaskStatus::Completed));
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn failed_task_yields_failed_session() {
    let dir = TempDir::new().unwrap();
    let body = [
        fixtures::event_line("executor", "started", "a", "working"),
        fixtures::event_line("executor", "completed", "a", "done"),
        fixtures::event_line("executor", "started", "b", "working"),
        fixtures::event_line("executor", "failed", "b", "tool crashed"),
        "sleep 1".to_string(),
    ]
    .join("\n");
    let script = fixtures::write_script(&dir, &body);
    let mut coordinator = coordinator_for(&dir, &script);
    coordinator.set_plan(fixtures::diamond_plan());

    coordinator.launch().await.unwrap();
    pump_until_done(&mut coordinator, Duration::from_secs(10)).await;

    let state = coordinator.session().unwrap().snapshot();
    assert_eq!(state.status, SessionStatus::Failed);
    assert_eq!(state.completed_tasks, 1);
    assert_eq!(state.failed_tasks, 1);
    assert_eq!(state.task_statuses["b"], TaskStatus::Failed);
    assert!(state.completed_tasks + state.failed_tasks <= state.total_tasks);

    let dashboard = coordinator.dashboard().unwrap();
    assert_eq!(dashboard.success_rate(), 50.0);
}

#[tokio::test(flavor = "multi_thread")]
async fn run_is_visible_in_history() {
    let dir = TempDir::new().unwrap();
    let script = fixtures::successful_run_script(&dir);
    let mut coordinator = coordinator_for(&dir, &script);
    coordinator.set_plan(fixtures::diamond_plan());

    coordinator.launch().await.unwrap();
    let id = coordinator.session().unwrap().id();
    pump_until_done(&mut coordinator, Duration::from_secs(10)).await;

    let summaries = history(&dir.path().join("sessions"), &HistoryOptions::default()).unwrap();
    assert_eq!(summaries.len(), 1);
    assert_eq!(summaries[0].id, id);
    assert_eq!(summaries[0].status, SessionStatus::Completed);
    assert_eq!(summaries[0].progress, 100.0);

    let filtered = history(
        &dir.path().join("sessions"),
        &HistoryOptions {
            status: Some(SessionStatus::Cancelled),
            ..Default::default()
        },
    )
    .unwrap();
    assert!(filtered.is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn cancel_mid_run_is_recorded() {
    let dir = TempDir::new().unwrap();
    let script = fixtures::write_script(&dir, "sleep 30");
    let mut coordinator = coordinator_for(&dir, &script);
    coordinator.set_plan(fixtures::diamond_plan());

    coordinator.launch().await.unwrap();
    coordinator.cancel().await.unwrap();

    let summaries = history(&dir.path().join("sessions"), &HistoryOptions::default()).unwrap();
    assert_eq!(summaries.len(), 1);
    assert_eq!(summaries[0].status, SessionStatus::Cancelled);
}

#[tokio::test(flavor = "multi_thread")]
async fn restart_leaves_two_sessions_in_history() {
    let dir = TempDir::new().unwrap();
    let script = fixtures::write_script(&dir, "sleep 30");
    let mut coordinator = coordinator_for(&dir, &script);
    coordinator.set_plan(fixtures::diamond_plan());

    coordinator.launch().await.unwrap();
    coordinator.restart().await.unwrap();
    coordinator.shutdown().await;

    let summaries = history(&dir.path().join("sessions"), &HistoryOptions::default()).unwrap();
    assert_eq!(summaries.len(), 2);
}

#[tokio::test(flavor = "multi_thread")]
async fn unparseable_output_degrades_to_log_events() {
    let dir = TempDir::new().unwrap();
    let body = [
        "echo 'plain progress note'".to_string(),
        fixtures::event_line("executor", "completed", "a", "done"),
        "sleep 1".to_string(),
    ]
    .join("\n");
    let script = fixtures::write_script(&dir, &body);
    let mut coordinator = coordinator_for(&dir, &script);
    coordinator.set_plan(fixtures::diamond_plan());

    coordinator.launch().await.unwrap();
    pump_until_done(&mut coordinator, Duration::from_secs(10)).await;

    // Both the plain line and the structured line made it into the log.
    let log = coordinator.event_log().unwrap();
    assert_eq!(log.len(), 2);

    // And the structured event still updated the session.
    let state = coordinator.session().unwrap().snapshot();
    assert_eq!(state.completed_tasks, 1);
}
