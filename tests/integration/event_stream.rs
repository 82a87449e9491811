//! Supervisor stream behavior: parsing, ordering, backpressure, teardown.

use std::time::{Duration, Instant};

use tempfile::TempDir;

use maestro::event::EventKind;
use maestro::supervisor::{LaunchOptions, Supervisor, EVENT_QUEUE_CAPACITY};

use crate::fixtures;

async fn wait_until_stopped(sup: &Supervisor, limit: Duration) {
    let deadline = Instant::now() + limit;
    while sup.is_running() && Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn events_arrive_in_emission_order() {
    let dir = TempDir::new().unwrap();
    let body = [
        fixtures::event_line("executor", "started", "a", "one"),
        fixtures::event_line("executor", "progress", "a", "two"),
        fixtures::event_line("executor", "completed", "a", "three"),
    ]
    .join("\n");
    let script = fixtures::write_script(&dir, &body);

    let mut sup = Supervisor::new().with_command(script.to_str().unwrap());
    sup.start(&fixtures::diamond_plan(), LaunchOptions::default())
        .await
        .unwrap();
    let rx = sup.events().unwrap();

    wait_until_stopped(&sup, Duration::from_secs(5)).await;

    // The queue outlives the process; buffered events drain in order.
    let kinds: Vec<EventKind> = rx.try_iter().map(|e| e.kind).collect();
    assert_eq!(
        kinds,
        vec![EventKind::Started, EventKind::Progress, EventKind::Completed]
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn stderr_and_stdout_share_one_queue() {
    let dir = TempDir::new().unwrap();
    let body = [
        fixtures::event_line("executor", "started", "a", "stdout side"),
        format!(
            "{} >&2",
            fixtures::event_line("reviewer", "log", "", "stderr side")
        ),
    ]
    .join("\n");
    let script = fixtures::write_script(&dir, &body);

    let mut sup = Supervisor::new().with_command(script.to_str().unwrap());
    sup.start(&fixtures::diamond_plan(), LaunchOptions::default())
        .await
        .unwrap();
    let rx = sup.events().unwrap();

    wait_until_stopped(&sup, Duration::from_secs(5)).await;

    let events: Vec<_> = rx.try_iter().collect();
    assert_eq!(events.len(), 2);
    let messages: Vec<&str> = events.iter().map(|e| e.message.as_str()).collect();
    assert!(messages.contains(&"stdout side"));
    assert!(messages.contains(&"stderr side"));
}

#[tokio::test(flavor = "multi_thread")]
async fn flood_never_exceeds_queue_capacity() {
    let dir = TempDir::new().unwrap();
    let script = fixtures::write_script(
        &dir,
        "i=0\nwhile [ $i -lt 2000 ]; do\n  echo \"flood line $i\"\n  i=$((i+1))\ndone",
    );

    let mut sup = Supervisor::new().with_command(script.to_str().unwrap());
    sup.start(&fixtures::diamond_plan(), LaunchOptions::default())
        .await
        .unwrap();

    wait_until_stopped(&sup, Duration::from_secs(10)).await;
    assert!(!sup.is_running());

    let rx = sup.events().unwrap();
    let received = rx.try_iter().count();
    assert!(received > 0);
    assert!(received <= EVENT_QUEUE_CAPACITY);
}

#[tokio::test(flavor = "multi_thread")]
async fn stop_returns_within_grace_even_if_term_ignored() {
    let dir = TempDir::new().unwrap();
    let script = fixtures::write_script(&dir, "trap '' TERM\nsleep 60");

    let mut sup = Supervisor::new()
        .with_command(script.to_str().unwrap())
        .with_grace(Duration::from_millis(300));
    sup.start(&fixtures::diamond_plan(), LaunchOptions::default())
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;

    let started = Instant::now();
    sup.stop().await.unwrap();
    assert!(started.elapsed() < Duration::from_secs(2));
    assert!(!sup.is_running());
}
