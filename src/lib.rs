pub mod config;
pub mod coordinator;
pub mod dashboard;
pub mod error;
pub mod event;
pub mod event_log;
pub mod graph;
pub mod log;
pub mod plan;
pub mod session;
pub mod supervisor;
pub mod util;

// Terminal loop
pub mod app;

pub use error::{Error, Result};
pub use event::{AgentEvent, AgentRole, EventKind};
pub use plan::{Task, TaskKind, TaskStatus, WorkPlan};
pub use session::{Session, SessionId, SessionStatus};
