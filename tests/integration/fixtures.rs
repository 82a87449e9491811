//! Shared fixtures: plans and fake orchestrator scripts.

use std::io::Write;
use std::path::PathBuf;

use tempfile::TempDir;

use maestro::plan::{Task, WorkPlan};

/// The canonical diamond: A with no deps, B and C on A, D on B and C.
pub fn diamond_plan() -> WorkPlan {
    let mut plan = WorkPlan::new("diamond", "diamond dependency plan");
    plan.tasks = vec![
        Task::new("a", "root work"),
        Task::new("b", "left branch").with_dependencies(&["a"]),
        Task::new("c", "right branch").with_dependencies(&["a"]),
        Task::new("d", "join results").with_dependencies(&["b", "c"]),
    ];
    plan
}

/// Write an executable shell script posing as the orchestrator binary.
pub fn write_script(dir: &TempDir, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.path().join("fake-agentd");
    let mut file = std::fs::File::create(&path).unwrap();
    writeln!(file, "#!/bin/sh\n{}", body).unwrap();
    drop(file);
    let mut perms = std::fs::metadata(&path).unwrap().permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&path, perms).unwrap();
    path
}

/// One JSON event line in the orchestrator's wire format.
pub fn event_line(agent: &str, kind: &str, task: &str, message: &str) -> String {
    format!(
        r#"echo '{{"agent":"{}","eventType":"{}","taskId":"{}","message":"{}"}}'"#,
        agent, kind, task, message
    )
}

/// A script that walks the diamond plan to completion, then lingers briefly
/// so every line is parsed while orchestration is still active.
pub fn successful_run_script(dir: &TempDir) -> PathBuf {
    let mut body = Vec::new();
    for task in ["a", "b", "c", "d"] {
        body.push(event_line("executor", "started", task, "working"));
        body.push(event_line("executor", "completed", task, "done"));
    }
    body.push("sleep 1".to_string());
    write_script(dir, &body.join("\n"))
}
