//! Agent roles and the event line protocol spoken by the orchestrator.
//!
//! The supervised subprocess emits one event per output line, JSON-encoded.
//! Lines that fail to parse degrade to a generic log event rather than
//! terminating the stream.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::Result;

/// Specialized role of an agent in orchestration.
///
/// A closed set of four roles, not an open registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AgentRole {
    /// Coordinates overall execution.
    #[default]
    Coordinator,
    /// Optimizes resource allocation.
    Optimizer,
    /// Reviews and validates work.
    Reviewer,
    /// Executes tasks.
    Executor,
}

impl AgentRole {
    /// All roles in display order.
    pub const ALL: [AgentRole; 4] = [
        AgentRole::Coordinator,
        AgentRole::Optimizer,
        AgentRole::Reviewer,
        AgentRole::Executor,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AgentRole::Coordinator => "coordinator",
            AgentRole::Optimizer => "optimizer",
            AgentRole::Reviewer => "reviewer",
            AgentRole::Executor => "executor",
        }
    }
}

impl std::fmt::Display for AgentRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Kind of orchestration event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Started,
    Progress,
    Completed,
    Failed,
    /// Agent-to-agent communication.
    Handoff,
    /// General log message.
    Log,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Started => "started",
            EventKind::Progress => "progress",
            EventKind::Completed => "completed",
            EventKind::Failed => "failed",
            EventKind::Handoff => "handoff",
            EventKind::Log => "log",
        }
    }

    /// Whether the event finishes a task (successfully or not).
    pub fn is_terminal(&self) -> bool {
        matches!(self, EventKind::Completed | EventKind::Failed)
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A real-time event from an orchestration agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentEvent {
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
    pub agent: AgentRole,
    #[serde(rename = "eventType")]
    pub kind: EventKind,
    #[serde(rename = "taskId", default)]
    pub task_id: String,
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl AgentEvent {
    pub fn new(agent: AgentRole, kind: EventKind, task_id: &str, message: &str) -> Self {
        Self {
            timestamp: Utc::now(),
            agent,
            kind,
            task_id: task_id.to_string(),
            message: message.to_string(),
            metadata: serde_json::Map::new(),
        }
    }

    /// Parse a structured event from one subprocess output line.
    pub fn parse_line(line: &str) -> Result<Self> {
        Ok(serde_json::from_str(line)?)
    }

    /// Wrap an unparseable output line into a generic log event.
    pub fn log_line(line: &str) -> Self {
        Self::new(AgentRole::Coordinator, EventKind::Log, "", line)
    }

    /// Human-readable one-line rendering.
    pub fn format(&self) -> String {
        format!(
            "[{}] {}/{}: task={} msg={:?}",
            self.timestamp.format("%H:%M:%S"),
            self.agent,
            self.kind,
            self.task_id,
            self.message
        )
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}
