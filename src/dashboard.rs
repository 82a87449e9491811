//! Live dashboard over the event stream: agent panel, progress, task queue.

use chrono::Utc;

use crate::event::{AgentEvent, AgentRole, EventKind};
use crate::plan::TaskStatus;
use crate::session::{AgentState, SessionState};
use crate::util::truncate;

/// Maximum pending tasks shown in the queue preview.
const QUEUE_PREVIEW: usize = 5;

/// Read-model over the live event stream plus a session snapshot.
///
/// The dashboard folds events into its own copy of the session state via
/// the canonical update path; the persisted session is owned elsewhere.
pub struct Dashboard {
    state: SessionState,
    queue: Vec<String>,
    success_rate: f64,
}

impl Dashboard {
    /// Build from a session snapshot; the queue starts with every task
    /// still pending.
    pub fn new(state: SessionState) -> Self {
        let queue = state
            .plan
            .tasks
            .iter()
            .filter(|t| state.task_statuses.get(&t.id) == Some(&TaskStatus::Pending))
            .map(|t| t.id.clone())
            .collect();

        let mut dashboard = Self {
            state,
            queue,
            success_rate: 0.0,
        };
        dashboard.recompute_success_rate();
        dashboard
    }

    /// Fold one event into the local state, queue, and metrics.
    pub fn handle_event(&mut self, event: &AgentEvent) {
        self.state.update_progress(event);

        match event.kind {
            EventKind::Started | EventKind::Completed | EventKind::Failed => {
                self.remove_from_queue(&event.task_id);
            }
            EventKind::Progress | EventKind::Handoff | EventKind::Log => {}
        }

        if event.kind.is_terminal() {
            self.recompute_success_rate();
        }
    }

    fn remove_from_queue(&mut self, task_id: &str) {
        if let Some(pos) = self.queue.iter().position(|id| id == task_id) {
            self.queue.remove(pos);
        }
    }

    fn recompute_success_rate(&mut self) {
        let finished = self.state.completed_tasks + self.state.failed_tasks;
        self.success_rate = if finished == 0 {
            0.0
        } else {
            self.state.completed_tasks as f64 / finished as f64 * 100.0
        };
    }

    pub fn completed_tasks(&self) -> usize {
        self.state.completed_tasks
    }

    pub fn failed_tasks(&self) -> usize {
        self.state.failed_tasks
    }

    /// completed / (completed + failed) * 100; zero with nothing finished.
    pub fn success_rate(&self) -> f64 {
        self.success_rate
    }

    pub fn pending_queue(&self) -> &[String] {
        &self.queue
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Render the dashboard as plain text for the given terminal width.
    pub fn render(&self, width: usize) -> String {
        let mut out = String::new();

        out.push_str(&section_header("Agents", width));
        out.push('\n');
        for role in AgentRole::ALL {
            out.push_str("  ");
            out.push_str(&self.render_agent_line(role));
            out.push('\n');
        }

        out.push_str(&section_header("Progress", width));
        out.push('\n');
        out.push_str("  ");
        out.push_str(&self.render_progress_bar(width));
        out.push('\n');
        out.push_str(&format!(
            "  Success Rate: {}/{} ok ({:.2}%)\n",
            self.state.completed_tasks,
            self.state.completed_tasks + self.state.failed_tasks,
            self.success_rate
        ));
        out.push_str(&format!("  Elapsed: {}\n", self.render_elapsed()));

        if !self.queue.is_empty() {
            out.push_str(&section_header("Upcoming Tasks", width));
            out.push('\n');
            out.push_str(&self.render_queue(width));
        }

        out
    }

    fn render_agent_line(&self, role: AgentRole) -> String {
        let Some(agent) = self.state.agents.get(&role) else {
            return format!("[?] {:<12} (unknown)", role);
        };

        let glyph = match agent.state {
            AgentState::Active => "[●]",
            AgentState::Idle => "[◌]",
            AgentState::Error => "[✗]",
        };

        let task = match &agent.current_task {
            Some(task) if !task.is_empty() => truncate(task, 40),
            _ => format!("last: {}", agent.last_update.format("%H:%M:%S")),
        };

        format!(
            "{} {:<12} ({:<6}) {}",
            glyph,
            role.to_string(),
            agent.state.to_string(),
            task
        )
    }

    fn render_progress_bar(&self, width: usize) -> String {
        let mut bar_width = if width > 60 { (width - 30) / 2 } else { 20 };
        if bar_width < 10 {
            bar_width = 10;
        }

        let filled = if self.state.total_tasks > 0 {
            (self.state.completed_tasks * bar_width / self.state.total_tasks).min(bar_width)
        } else {
            0
        };

        let bar: String = "█".repeat(filled) + &"░".repeat(bar_width - filled);
        format!(
            "Progress: [{}] {}/{} tasks ({:.0}%)",
            bar,
            self.state.completed_tasks,
            self.state.total_tasks,
            self.state.progress()
        )
    }

    fn render_elapsed(&self) -> String {
        let end = self.state.end_time.unwrap_or_else(Utc::now);
        let elapsed = end - self.state.start_time;
        format_elapsed(elapsed)
    }

    fn render_queue(&self, width: usize) -> String {
        let mut out = String::new();
        for (i, task_id) in self.queue.iter().take(QUEUE_PREVIEW).enumerate() {
            let description = self
                .state
                .plan
                .find_task(task_id)
                .map(|t| t.description.as_str())
                .unwrap_or("");
            let line = format!("{}. {}: {}", i + 1, task_id, description);
            out.push_str("  ");
            out.push_str(&truncate(&line, width.saturating_sub(4).max(16)));
            out.push('\n');
        }
        out
    }
}

/// Section header bar: `╔═══ Title ═══╗`.
fn section_header(title: &str, width: usize) -> String {
    if width < title.len() + 4 {
        return title.to_string();
    }
    let padding = width - title.len() - 4;
    let left = padding / 2;
    let right = padding - left;
    format!("╔{} {} {}╗", "═".repeat(left), title, "═".repeat(right))
}

/// Render a duration in its coarsest non-zero unit down to seconds.
fn format_elapsed(elapsed: chrono::Duration) -> String {
    let total_seconds = elapsed.num_seconds().max(0);
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    if hours > 0 {
        format!("{}h {}m {}s", hours, minutes, seconds)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, seconds)
    } else {
        format!("{}s", seconds)
    }
}
