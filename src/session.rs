//! Session state for one orchestration run, with crash-safe persistence.
//!
//! A [`Session`] owns the canonical progress state derived from a validated
//! plan. Every mutation persists the full state atomically (temp file +
//! rename) under an injected storage root, so tests and concurrent sessions
//! never collide and no reader ever observes a half-written file.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::event::{AgentEvent, AgentRole, EventKind};
use crate::plan::{TaskStatus, WorkPlan};
use crate::{mlog_debug, mlog_warn, Error, Result};

const SESSION_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn short(&self) -> String {
        self.0.to_string()[..8].to_string()
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for SessionId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Overall status of an orchestration session. Closed set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    #[default]
    Running,
    Paused,
    Completed,
    Failed,
    Cancelled,
}

impl SessionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionStatus::Completed | SessionStatus::Failed | SessionStatus::Cancelled
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Running => "running",
            SessionStatus::Paused => "paused",
            SessionStatus::Completed => "completed",
            SessionStatus::Failed => "failed",
            SessionStatus::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for SessionStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "running" => Ok(SessionStatus::Running),
            "paused" => Ok(SessionStatus::Paused),
            "completed" => Ok(SessionStatus::Completed),
            "failed" => Ok(SessionStatus::Failed),
            "cancelled" => Ok(SessionStatus::Cancelled),
            other => Err(Error::InvalidStatus(other.to_string())),
        }
    }
}

/// Activity state of a single agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AgentState {
    Active,
    #[default]
    Idle,
    Error,
}

impl std::fmt::Display for AgentState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AgentState::Active => write!(f, "active"),
            AgentState::Idle => write!(f, "idle"),
            AgentState::Error => write!(f, "error"),
        }
    }
}

/// Current status of one agent role.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentStatus {
    pub role: AgentRole,
    pub state: AgentState,
    #[serde(rename = "currentTask", default)]
    pub current_task: Option<String>,
    #[serde(rename = "lastUpdate")]
    pub last_update: DateTime<Utc>,
}

impl AgentStatus {
    pub fn idle(role: AgentRole) -> Self {
        Self {
            role,
            state: AgentState::Idle,
            current_task: None,
            last_update: Utc::now(),
        }
    }

    pub fn is_active(&self) -> bool {
        self.state == AgentState::Active
    }
}

/// The evolving progress state of one orchestration run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionState {
    pub id: SessionId,
    pub plan: WorkPlan,
    #[serde(rename = "startTime")]
    pub start_time: DateTime<Utc>,
    #[serde(rename = "endTime", default)]
    pub end_time: Option<DateTime<Utc>>,
    pub status: SessionStatus,
    #[serde(rename = "taskStatuses")]
    pub task_statuses: HashMap<String, TaskStatus>,
    pub agents: HashMap<AgentRole, AgentStatus>,
    #[serde(rename = "totalTasks")]
    pub total_tasks: usize,
    #[serde(rename = "completedTasks")]
    pub completed_tasks: usize,
    #[serde(rename = "failedTasks")]
    pub failed_tasks: usize,
}

impl SessionState {
    pub fn new(id: SessionId, plan: WorkPlan) -> Self {
        let task_statuses = plan
            .tasks
            .iter()
            .map(|t| (t.id.clone(), TaskStatus::Pending))
            .collect();

        let agents = AgentRole::ALL
            .iter()
            .map(|&role| (role, AgentStatus::idle(role)))
            .collect();

        let total_tasks = plan.tasks.len();

        Self {
            id,
            plan,
            start_time: Utc::now(),
            end_time: None,
            status: SessionStatus::Running,
            task_statuses,
            agents,
            total_tasks,
            completed_tasks: 0,
            failed_tasks: 0,
        }
    }

    /// Canonical update path: fold one agent event into the state.
    ///
    /// Counters only move when a known task transitions into a terminal
    /// state for the first time, preserving completed + failed <= total.
    pub fn update_progress(&mut self, event: &AgentEvent) {
        if let Some(agent) = self.agents.get_mut(&event.agent) {
            agent.last_update = Utc::now();
            match event.kind {
                EventKind::Started => {
                    agent.state = AgentState::Active;
                    agent.current_task = Some(event.task_id.clone());
                }
                EventKind::Completed => {
                    agent.state = AgentState::Idle;
                    agent.current_task = None;
                }
                EventKind::Failed => {
                    agent.state = AgentState::Error;
                }
                EventKind::Progress => {
                    agent.state = AgentState::Active;
                }
                EventKind::Handoff | EventKind::Log => {}
            }
        }

        if event.task_id.is_empty() {
            return;
        }
        if let Some(status) = self.task_statuses.get_mut(&event.task_id) {
            if status.is_terminal() {
                return;
            }
            match event.kind {
                EventKind::Started | EventKind::Progress => *status = TaskStatus::Active,
                EventKind::Completed => {
                    *status = TaskStatus::Completed;
                    self.completed_tasks += 1;
                }
                EventKind::Failed => {
                    *status = TaskStatus::Failed;
                    self.failed_tasks += 1;
                }
                EventKind::Handoff | EventKind::Log => {}
            }
        }
    }

    /// Completion percentage (0-100). Zero when the plan has no tasks.
    pub fn progress(&self) -> f64 {
        if self.total_tasks == 0 {
            return 0.0;
        }
        self.completed_tasks as f64 / self.total_tasks as f64 * 100.0
    }
}

/// On-disk envelope: one versioned document per session id.
#[derive(Debug, Serialize, Deserialize)]
struct SessionDocument {
    version: u32,
    session: SessionState,
}

/// A persisted orchestration session.
///
/// All state access serializes under one lock so overlapping auto-saves
/// from rapid events cannot interleave writes to the same temp path.
pub struct Session {
    state: Mutex<SessionState>,
    root: PathBuf,
}

impl Session {
    /// Create a fresh session for a plan, rooted at `root`.
    pub fn new(plan: WorkPlan, root: &Path) -> Self {
        let state = SessionState::new(SessionId::new(), plan);
        Self {
            state: Mutex::new(state),
            root: root.to_path_buf(),
        }
    }

    /// Load an existing session from disk by id.
    pub fn load(root: &Path, id: SessionId) -> Result<Self> {
        let path = root.join(format!("{}.json", id));
        let data = fs::read_to_string(&path)
            .map_err(|_| Error::SessionNotFound(id.to_string()))?;
        let doc: SessionDocument = serde_json::from_str(&data)?;
        Ok(Self {
            state: Mutex::new(doc.session),
            root: root.to_path_buf(),
        })
    }

    pub fn id(&self) -> SessionId {
        self.lock().id
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Clone of the current state for read-only consumers.
    pub fn snapshot(&self) -> SessionState {
        self.lock().clone()
    }

    /// Fold an event into the state and persist.
    pub fn update_progress(&self, event: &AgentEvent) -> Result<()> {
        let mut state = self.lock();
        state.update_progress(event);
        Self::save_locked(&state, &self.root)
    }

    /// Transition the session status and persist. Terminal statuses set the
    /// end time.
    pub fn set_status(&self, status: SessionStatus) -> Result<()> {
        let mut state = self.lock();
        state.status = status;
        if status.is_terminal() {
            state.end_time = Some(Utc::now());
        }
        Self::save_locked(&state, &self.root)
    }

    /// Persist the current state.
    pub fn save(&self) -> Result<()> {
        let state = self.lock();
        Self::save_locked(&state, &self.root)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SessionState> {
        // A poisoned lock means a panicking writer; the state itself is
        // still consistent because saves are whole-document.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn save_locked(state: &SessionState, root: &Path) -> Result<()> {
        if !root.exists() {
            fs::create_dir_all(root)?;
        }

        let doc = SessionDocument {
            version: SESSION_VERSION,
            session: state.clone(),
        };
        let contents = serde_json::to_string_pretty(&doc)?;

        let final_path = root.join(format!("{}.json", state.id));
        let temp_path = root.join(format!("{}.json.tmp", state.id));
        fs::write(&temp_path, &contents)?;
        if let Err(e) = fs::rename(&temp_path, &final_path) {
            let _ = fs::remove_file(&temp_path);
            return Err(e.into());
        }
        mlog_debug!("Session saved: {}", final_path.display());
        Ok(())
    }
}

/// Brief summary of a past session, for history listings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSummary {
    pub id: SessionId,
    #[serde(rename = "startTime")]
    pub start_time: DateTime<Utc>,
    #[serde(rename = "endTime", default)]
    pub end_time: Option<DateTime<Utc>>,
    pub status: SessionStatus,
    #[serde(rename = "completedTasks")]
    pub completed_tasks: usize,
    #[serde(rename = "failedTasks")]
    pub failed_tasks: usize,
    #[serde(rename = "totalTasks")]
    pub total_tasks: usize,
    pub progress: f64,
}

/// Filtering and pagination for session history.
#[derive(Debug, Clone, Default)]
pub struct HistoryOptions {
    /// Keep only sessions with this status.
    pub status: Option<SessionStatus>,
    /// Maximum results (None = no limit).
    pub limit: Option<usize>,
    /// Skip the first N results.
    pub offset: usize,
    /// Oldest first instead of most recent first.
    pub reverse: bool,
}

/// List past sessions under `root`, skipping unreadable or corrupt files.
pub fn history(root: &Path, opts: &HistoryOptions) -> Result<Vec<SessionSummary>> {
    let mut summaries = Vec::new();

    if !root.exists() {
        return Ok(summaries);
    }

    for entry in fs::read_dir(root)? {
        let Ok(entry) = entry else { continue };
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }

        let Ok(data) = fs::read_to_string(&path) else {
            mlog_warn!("Skipping unreadable session file: {}", path.display());
            continue;
        };
        let Ok(doc) = serde_json::from_str::<SessionDocument>(&data) else {
            mlog_warn!("Skipping corrupt session file: {}", path.display());
            continue;
        };

        let session = doc.session;
        if let Some(filter) = opts.status {
            if session.status != filter {
                continue;
            }
        }

        summaries.push(SessionSummary {
            id: session.id,
            start_time: session.start_time,
            end_time: session.end_time,
            status: session.status,
            completed_tasks: session.completed_tasks,
            failed_tasks: session.failed_tasks,
            total_tasks: session.total_tasks,
            progress: session.progress(),
        });
    }

    summaries.sort_by(|a, b| {
        if opts.reverse {
            a.start_time.cmp(&b.start_time)
        } else {
            b.start_time.cmp(&a.start_time)
        }
    });

    if opts.offset > 0 {
        if opts.offset >= summaries.len() {
            return Ok(Vec::new());
        }
        summaries.drain(..opts.offset);
    }
    if let Some(limit) = opts.limit {
        summaries.truncate(limit);
    }

    Ok(summaries)
}

/// Remove a session file from disk.
pub fn delete(root: &Path, id: SessionId) -> Result<()> {
    let path = root.join(format!("{}.json", id));
    match fs::remove_file(&path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(Error::SessionNotFound(id.to_string()))
        }
        Err(e) => Err(e.into()),
    }
}
