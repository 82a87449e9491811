//! Top-level coordinator: view state machine, orchestration lifecycle, and
//! the fan-out of incoming events to every dependent view.

use std::path::PathBuf;
use std::time::Duration;

use crossbeam_channel::Receiver;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

use crate::config::Config;
use crate::dashboard::Dashboard;
use crate::event::{AgentEvent, EventKind};
use crate::event_log::EventLog;
use crate::graph::GraphView;
use crate::plan::{TaskStatus, WorkPlan};
use crate::session::{Session, SessionStatus};
use crate::supervisor::{LaunchOptions, Supervisor, EVENT_QUEUE_CAPACITY};
use crate::{mlog, mlog_warn, Error, Result};

/// Settle delay between stop and relaunch on restart.
const RESTART_SETTLE: Duration = Duration::from_millis(100);

/// Rows consumed by header and footer chrome around the active view.
const CHROME_ROWS: usize = 2;

/// The fixed view cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum View {
    Editor,
    Dashboard,
    Graph,
    Log,
}

impl View {
    pub fn title(&self) -> &'static str {
        match self {
            View::Editor => "Plan Editor",
            View::Dashboard => "Dashboard",
            View::Graph => "Task Graph",
            View::Log => "Event Log",
        }
    }

    pub fn next(&self) -> View {
        match self {
            View::Editor => View::Dashboard,
            View::Dashboard => View::Graph,
            View::Graph => View::Log,
            View::Log => View::Editor,
        }
    }

    pub fn prev(&self) -> View {
        match self {
            View::Editor => View::Log,
            View::Dashboard => View::Editor,
            View::Graph => View::Dashboard,
            View::Log => View::Graph,
        }
    }
}

/// Side effects requested by key handling, executed by the app loop.
#[derive(Debug, PartialEq, Eq)]
pub enum Command {
    Launch,
    Restart,
    Cancel,
    Quit,
}

/// Owns the orchestration lifecycle and routes input and events to the
/// views. All view mutation happens on this single path.
pub struct Coordinator {
    storage_root: PathBuf,
    plan: Option<WorkPlan>,

    supervisor: Supervisor,
    session: Option<Session>,
    dashboard: Option<Dashboard>,
    graph: Option<GraphView>,
    event_log: Option<EventLog>,
    events: Option<Receiver<AgentEvent>>,

    view: View,
    orchestrating: bool,
    paused: bool,
    help_visible: bool,
    last_error: Option<String>,
    notice: Option<String>,

    launch_opts: LaunchOptions,
    width: u16,
    height: u16,
}

impl Coordinator {
    pub fn new(config: &Config, storage_root: PathBuf) -> Self {
        let mut launch_opts = LaunchOptions::from_config(config);
        launch_opts.storage_path = Some(storage_root.clone());
        Self {
            storage_root,
            plan: None,
            supervisor: Supervisor::from_config(config),
            session: None,
            dashboard: None,
            graph: None,
            event_log: None,
            events: None,
            view: View::Editor,
            orchestrating: false,
            paused: false,
            help_visible: false,
            last_error: None,
            notice: None,
            launch_opts,
            width: 80,
            height: 24,
        }
    }

    pub fn set_plan(&mut self, plan: WorkPlan) {
        self.plan = Some(plan);
    }

    pub fn plan(&self) -> Option<&WorkPlan> {
        self.plan.as_ref()
    }

    pub fn view(&self) -> View {
        self.view
    }

    pub fn is_orchestrating(&self) -> bool {
        self.orchestrating
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub fn dashboard(&self) -> Option<&Dashboard> {
        self.dashboard.as_ref()
    }

    pub fn graph(&self) -> Option<&GraphView> {
        self.graph.as_ref()
    }

    pub fn event_log(&self) -> Option<&EventLog> {
        self.event_log.as_ref()
    }

    pub fn resize(&mut self, width: u16, height: u16) {
        self.width = width;
        self.height = height;
        if let Some(log) = &mut self.event_log {
            log.set_visible_lines((height as usize).saturating_sub(CHROME_ROWS + 2).max(1));
        }
    }

    // --- View navigation ---

    pub fn next_view(&mut self) {
        self.view = if self.orchestrating {
            self.view.next()
        } else {
            View::Editor
        };
    }

    pub fn prev_view(&mut self) {
        self.view = if self.orchestrating {
            self.view.prev()
        } else {
            View::Editor
        };
    }

    /// Jump straight to a view; everything but the editor requires an
    /// active orchestration.
    pub fn jump_to(&mut self, view: View) {
        if view == View::Editor || self.orchestrating {
            self.view = view;
        }
    }

    // --- Lifecycle ---

    /// Validate the current plan, create a fresh session and all dependent
    /// views, and start the supervisor.
    pub async fn launch(&mut self) -> Result<()> {
        if self.orchestrating {
            return Err(Error::AlreadyRunning);
        }
        let plan = self
            .plan
            .clone()
            .ok_or_else(|| Error::Validation("no work plan to launch".to_string()))?;
        plan.validate()?;

        let session = Session::new(plan.clone(), &self.storage_root);
        session.save()?;
        mlog!("Launching orchestration, session {}", session.id().short());

        let dashboard = Dashboard::new(session.snapshot());
        let graph = GraphView::new(&plan)?;
        let mut event_log = EventLog::new();
        event_log
            .set_visible_lines((self.height as usize).saturating_sub(CHROME_ROWS + 2).max(1));

        self.supervisor.start(&plan, self.launch_opts.clone()).await?;
        self.events = self.supervisor.events();

        self.session = Some(session);
        self.dashboard = Some(dashboard);
        self.graph = Some(graph);
        self.event_log = Some(event_log);
        self.orchestrating = true;
        self.paused = false;
        self.last_error = None;
        self.view = View::Dashboard;
        Ok(())
    }

    /// Stop the supervisor and finalize the session from its counters.
    pub async fn stop(&mut self) -> Result<()> {
        if !self.orchestrating {
            return Ok(());
        }
        self.supervisor.stop().await?;
        self.finalize_session(None);
        self.orchestrating = false;
        self.paused = false;
        Ok(())
    }

    /// Force-stop and mark the session cancelled. Idempotent when idle.
    pub async fn cancel(&mut self) -> Result<()> {
        if !self.orchestrating {
            return Ok(());
        }
        self.supervisor.stop().await?;
        self.finalize_session(Some(SessionStatus::Cancelled));
        self.orchestrating = false;
        self.paused = false;
        mlog!("Orchestration cancelled");
        Ok(())
    }

    /// Full stop, a short settle delay, then a fresh launch with the same
    /// plan, recreating every dependent view against a new session.
    pub async fn restart(&mut self) -> Result<()> {
        if !self.orchestrating {
            return Err(Error::Validation("no orchestration to restart".to_string()));
        }
        self.stop().await?;
        tokio::time::sleep(RESTART_SETTLE).await;
        self.launch().await
    }

    /// Logical pause toggle: flips local and session status flags only;
    /// the subprocess itself keeps running.
    pub fn toggle_pause(&mut self) {
        if !self.orchestrating {
            return;
        }
        self.paused = !self.paused;
        let status = if self.paused {
            SessionStatus::Paused
        } else {
            SessionStatus::Running
        };
        if let Some(session) = &self.session {
            if let Err(e) = session.set_status(status) {
                mlog_warn!("Failed to persist pause state: {}", e);
            }
        }
    }

    /// Stop any active orchestration and save the session one final time.
    pub async fn shutdown(&mut self) {
        if self.orchestrating {
            if let Err(e) = self.stop().await {
                mlog_warn!("Shutdown stop failed: {}", e);
            }
        }
        if let Some(session) = &self.session {
            if let Err(e) = session.save() {
                mlog_warn!("Final session save failed: {}", e);
            }
        }
    }

    fn finalize_session(&mut self, status: Option<SessionStatus>) {
        let Some(session) = &self.session else {
            return;
        };
        let status = status.unwrap_or_else(|| {
            if session.snapshot().failed_tasks > 0 {
                SessionStatus::Failed
            } else {
                SessionStatus::Completed
            }
        });
        if let Err(e) = session.set_status(status) {
            self.last_error = Some(format!("session status update error: {}", e));
        }
    }

    // --- Event processing ---

    /// Pull up to `max` queued events and fan each one out.
    pub fn drain_events(&mut self, max: usize) {
        let Some(rx) = &self.events else {
            return;
        };
        let mut batch = Vec::new();
        for _ in 0..max {
            match rx.try_recv() {
                Ok(event) => batch.push(event),
                Err(_) => break,
            }
        }
        for event in batch {
            self.handle_event(&event);
        }
    }

    /// Fan out one event in fixed order: dashboard, event log, graph,
    /// then the session's canonical (persisted) update.
    pub fn handle_event(&mut self, event: &AgentEvent) {
        if !self.orchestrating {
            return;
        }

        if let Some(dashboard) = &mut self.dashboard {
            dashboard.handle_event(event);
        }
        if let Some(log) = &mut self.event_log {
            log.push(event);
        }
        if let Some(graph) = &mut self.graph {
            if !event.task_id.is_empty() {
                let status = match event.kind {
                    EventKind::Started | EventKind::Progress => Some(TaskStatus::Active),
                    EventKind::Completed => Some(TaskStatus::Completed),
                    EventKind::Failed => Some(TaskStatus::Failed),
                    EventKind::Handoff | EventKind::Log => None,
                };
                if let Some(status) = status {
                    graph.update_status(&event.task_id, status);
                }
            }
        }
        if let Some(session) = &self.session {
            if let Err(e) = session.update_progress(event) {
                self.last_error = Some(format!("session update error: {}", e));
            }
        }
    }

    /// Periodic housekeeping: drain the queue and notice natural exit.
    pub fn on_tick(&mut self) {
        self.drain_events(EVENT_QUEUE_CAPACITY);
        if self.orchestrating && !self.supervisor.is_running() {
            // The subprocess ended on its own; its exit closed the stream.
            self.drain_events(EVENT_QUEUE_CAPACITY);
            self.finalize_session(None);
            self.orchestrating = false;
            self.paused = false;
            mlog!("Orchestrator exited, session finalized");
        }
    }

    // --- Input ---

    pub fn handle_key(&mut self, key: KeyEvent) -> Vec<Command> {
        self.notice = None;

        // Ctrl chords are view-scoped.
        if key.modifiers.contains(KeyModifiers::CONTROL) {
            match key.code {
                KeyCode::Char('l') if self.view == View::Editor => {
                    return vec![Command::Launch];
                }
                KeyCode::Char('u') | KeyCode::Char('d') if self.view == View::Log => {
                    if let Some(log) = &mut self.event_log {
                        log.handle_key(key);
                    }
                }
                _ => {}
            }
            return Vec::new();
        }

        // Global shortcuts.
        match key.code {
            KeyCode::Char('q') => return vec![Command::Quit],
            KeyCode::Char('?') => {
                self.help_visible = !self.help_visible;
                return Vec::new();
            }
            KeyCode::Tab => {
                self.next_view();
                return Vec::new();
            }
            KeyCode::BackTab => {
                self.prev_view();
                return Vec::new();
            }
            KeyCode::Char('1') => {
                self.jump_to(View::Editor);
                return Vec::new();
            }
            KeyCode::Char('2') => {
                self.jump_to(View::Dashboard);
                return Vec::new();
            }
            KeyCode::Char('3') => {
                self.jump_to(View::Graph);
                return Vec::new();
            }
            KeyCode::Char('4') => {
                self.jump_to(View::Log);
                return Vec::new();
            }
            _ => {}
        }

        // Orchestration controls take precedence outside the editor.
        if self.view != View::Editor && self.orchestrating {
            match key.code {
                KeyCode::Char(' ') => {
                    self.toggle_pause();
                    return Vec::new();
                }
                KeyCode::Char('r') => return vec![Command::Restart],
                KeyCode::Char('x') => return vec![Command::Cancel],
                _ => {}
            }
        }

        if self.view == View::Editor {
            return Vec::new();
        }

        // Remaining keys go to the active view's own handler.
        match self.view {
            View::Editor => {}
            View::Dashboard => {}
            View::Graph => {
                if let Some(graph) = &mut self.graph {
                    graph.handle_key(key);
                }
            }
            View::Log => {
                if key.code == KeyCode::Char('e') {
                    self.export_log();
                } else if let Some(log) = &mut self.event_log {
                    log.handle_key(key);
                }
            }
        }
        Vec::new()
    }

    fn export_log(&mut self) {
        let Some(log) = &mut self.event_log else {
            return;
        };
        let name = format!(
            "log-export-{}.tsv",
            chrono::Local::now().format("%Y%m%d-%H%M%S")
        );
        let path = self.storage_root.join(name);
        match log.export(&path) {
            Ok(()) => self.notice = Some(format!("Exported to {}", path.display())),
            Err(e) => self.last_error = Some(format!("export failed: {}", e)),
        }
    }

    /// Record an error for display in the banner.
    pub fn report_error(&mut self, context: &str, err: &Error) {
        mlog_warn!("{}: {}", context, err);
        self.last_error = Some(format!("{}: {}", context, err));
    }

    // --- Rendering ---

    /// Render the full frame as text: header, optional banner, the active
    /// view, and the shortcut footer.
    pub fn render(&self) -> String {
        let width = self.width as usize;
        let height = self.height as usize;

        if width < 40 || height < 10 {
            return "Terminal too small. Minimum: 40x10".to_string();
        }
        if self.help_visible {
            return self.render_help();
        }

        let mut lines = Vec::new();
        lines.push(self.render_header());

        let mut body_height = height - CHROME_ROWS;
        if let Some(error) = &self.last_error {
            lines.push(format!("ERROR: {}", error));
            body_height = body_height.saturating_sub(1);
        } else if let Some(notice) = &self.notice {
            lines.push(notice.clone());
            body_height = body_height.saturating_sub(1);
        }

        lines.push(self.render_body(width, body_height));
        lines.push(self.render_footer());
        lines.join("\n")
    }

    fn render_header(&self) -> String {
        let paused = if self.paused { " [PAUSED]" } else { "" };
        let session_info = match &self.session {
            Some(session) => {
                let state = session.snapshot();
                format!(
                    " | Session: {} | {} | {:.1}%",
                    state.id.short(),
                    state.status,
                    state.progress()
                )
            }
            None => String::new(),
        };
        format!("MAESTRO - {}{}{}", self.view.title(), paused, session_info)
    }

    fn render_body(&self, width: usize, height: usize) -> String {
        match self.view {
            View::Editor => self.render_editor(),
            View::Dashboard => match &self.dashboard {
                Some(dashboard) => dashboard.render(width),
                None => "Dashboard not available (orchestration not started)".to_string(),
            },
            View::Graph => match &self.graph {
                Some(graph) => graph.render(width, height),
                None => "Task graph not available (orchestration not started)".to_string(),
            },
            View::Log => match &self.event_log {
                Some(log) => log.render(width, height),
                None => "Event log not available (orchestration not started)".to_string(),
            },
        }
    }

    fn render_editor(&self) -> String {
        let Some(plan) = &self.plan else {
            return "No work plan loaded.\n\nStart with --plan <file> or author one in the editor."
                .to_string();
        };

        let mut out = String::new();
        out.push_str(&format!("Plan: {}\n", plan.name));
        if !plan.description.is_empty() {
            out.push_str(&format!("  {}\n", plan.description));
        }
        out.push_str(&format!(
            "  {} tasks, max {} concurrent\n\n",
            plan.tasks.len(),
            plan.max_concurrent
        ));
        for task in &plan.tasks {
            let deps = if task.dependencies.is_empty() {
                String::new()
            } else {
                format!("  deps: {}", task.dependencies.join(", "))
            };
            out.push_str(&format!(
                "  {} ({}, {}, p{}){}\n",
                task.id, task.kind, task.agent, task.priority, deps
            ));
        }
        out.push('\n');
        match plan.validate() {
            Ok(()) => out.push_str("Plan is valid. Ctrl+L to launch."),
            Err(e) => out.push_str(&format!("Plan is invalid: {}", e)),
        }
        out
    }

    fn render_footer(&self) -> String {
        let mut shortcuts: Vec<&str> = Vec::new();
        if self.view == View::Editor {
            shortcuts.push("Ctrl+L launch");
        } else if self.orchestrating {
            shortcuts.push("Space pause/resume");
            shortcuts.push("r restart");
            shortcuts.push("x cancel");
        }
        shortcuts.push("Tab next view");
        shortcuts.push("1-4 jump");
        shortcuts.push("? help");
        shortcuts.push("q quit");
        shortcuts.join(" | ")
    }

    fn render_help(&self) -> String {
        "KEYBOARD SHORTCUTS\n\
         \n\
         Global:\n\
         \x20 q           Quit (stops orchestration if running)\n\
         \x20 ?           Toggle this help overlay\n\
         \x20 Tab         Next view (Editor > Dashboard > Graph > Log)\n\
         \x20 Shift+Tab   Previous view\n\
         \x20 1-4         Jump to view (2-4 require a running orchestration)\n\
         \n\
         Plan Editor:\n\
         \x20 Ctrl+L      Launch orchestration (if the plan is valid)\n\
         \n\
         While orchestrating:\n\
         \x20 Space       Pause/resume (logical; the process keeps running)\n\
         \x20 r           Restart (stop + fresh launch, new session)\n\
         \x20 x           Cancel (stop + mark session cancelled)\n\
         \n\
         Task Graph:\n\
         \x20 h/j/k/l     Pan    +/-  Zoom    c  Center    enter/esc  Select\n\
         \n\
         Event Log:\n\
         \x20 j/k         Scroll    g/G  Top/bottom    Ctrl+U/D  Page    e  Export\n\
         \n\
         Press ? again to close."
            .to_string()
    }
}
