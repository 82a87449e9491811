//! Lifecycle supervision of the external orchestrator subprocess.
//!
//! The supervisor spawns the orchestrator binary with a serialized plan,
//! streams its stdout/stderr into parsed [`AgentEvent`]s on one shared
//! bounded queue, and tears everything down on stop, restart, or natural
//! exit. The queue hand-off is strictly non-blocking: on overflow the
//! newest event is dropped so the readers and the subprocess never stall.

use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use crate::config::{Config, DEFAULT_COMMAND};
use crate::event::AgentEvent;
use crate::plan::WorkPlan;
use crate::{mlog, mlog_debug, mlog_trace, mlog_warn, Error, Result};

/// Capacity of the shared event queue.
pub const EVENT_QUEUE_CAPACITY: usize = 256;

/// Grace period between SIGTERM and SIGKILL.
pub const DEFAULT_GRACE: Duration = Duration::from_secs(5);

/// Settle delay between stop and start during a restart.
const RESTART_SETTLE: Duration = Duration::from_millis(100);

/// Options forwarded to the orchestrator on launch.
#[derive(Debug, Clone)]
pub struct LaunchOptions {
    /// Storage path handed to the orchestrator.
    pub storage_path: Option<std::path::PathBuf>,
    /// Milliseconds between orchestrator polls.
    pub polling_interval_ms: u64,
    /// Cap on concurrently executing agents.
    pub max_concurrent: usize,
    /// Ask the orchestrator to emit dashboard events.
    pub enable_dashboard: bool,
}

impl Default for LaunchOptions {
    fn default() -> Self {
        Self {
            storage_path: None,
            polling_interval_ms: 100,
            max_concurrent: 4,
            enable_dashboard: false,
        }
    }
}

impl LaunchOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            storage_path: None,
            polling_interval_ms: config.effective_polling_interval_ms(),
            max_concurrent: config.effective_max_concurrent(),
            enable_dashboard: false,
        }
    }
}

/// Handle to the currently supervised process.
struct RunningChild {
    pid: Option<u32>,
    exited: CancellationToken,
}

/// Supervises one external orchestrator process at a time.
pub struct Supervisor {
    command: String,
    grace: Duration,
    running: Arc<AtomicBool>,
    current: Option<RunningChild>,
    events_rx: Option<Receiver<AgentEvent>>,
    last_plan: Option<WorkPlan>,
    last_opts: LaunchOptions,
}

impl Supervisor {
    pub fn new() -> Self {
        Self {
            command: DEFAULT_COMMAND.to_string(),
            grace: DEFAULT_GRACE,
            running: Arc::new(AtomicBool::new(false)),
            current: None,
            events_rx: None,
            last_plan: None,
            last_opts: LaunchOptions::default(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new().with_command(config.effective_command())
    }

    /// Override the orchestrator command (testing, non-standard installs).
    pub fn with_command(mut self, command: &str) -> Self {
        self.command = command.to_string();
        self
    }

    /// Override the SIGTERM-to-SIGKILL grace period.
    pub fn with_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Receiver for the current run's event queue.
    pub fn events(&self) -> Option<Receiver<AgentEvent>> {
        self.events_rx.clone()
    }

    /// Spawn the orchestrator with the given plan and options.
    pub async fn start(&mut self, plan: &WorkPlan, opts: LaunchOptions) -> Result<()> {
        if self.is_running() {
            return Err(Error::AlreadyRunning);
        }
        plan.validate()?;

        let binary = which::which(&self.command)
            .map_err(|_| Error::BinaryNotFound(self.command.clone()))?;
        let plan_json = plan.to_json()?;

        let mut cmd = Command::new(&binary);
        cmd.arg("run").arg("--plan").arg(&plan_json);
        if let Some(storage) = &opts.storage_path {
            cmd.arg("--storage").arg(storage);
        }
        if opts.polling_interval_ms > 0 {
            cmd.arg("--poll-interval")
                .arg(opts.polling_interval_ms.to_string());
        }
        if opts.max_concurrent > 0 {
            cmd.arg("--max-concurrent")
                .arg(opts.max_concurrent.to_string());
        }
        if opts.enable_dashboard {
            cmd.arg("--dashboard");
        }
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        mlog!("Supervisor starting {} for plan '{}'", self.command, plan.name);
        let mut child = cmd
            .spawn()
            .map_err(|e| Error::Spawn(format!("{}: {}", binary.display(), e)))?;

        let (tx, rx) = crossbeam_channel::bounded::<AgentEvent>(EVENT_QUEUE_CAPACITY);

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::Spawn("stdout pipe missing".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| Error::Spawn("stderr pipe missing".to_string()))?;
        tokio::spawn(pump_output(stdout, "stdout", tx.clone()));
        tokio::spawn(pump_output(stderr, "stderr", tx));

        let pid = child.id();
        let exited = CancellationToken::new();
        self.running.store(true, Ordering::SeqCst);

        // The waiter owns the child: it observes exit for any reason
        // (graceful, killed, or crashed), flips the running flag, and
        // cancels the token that stop() races against.
        let running = self.running.clone();
        let exited_for_waiter = exited.clone();
        tokio::spawn(async move {
            match child.wait().await {
                Ok(status) => mlog_debug!("Orchestrator exited: {}", status),
                Err(e) => mlog_warn!("Orchestrator wait error: {}", e),
            }
            running.store(false, Ordering::SeqCst);
            exited_for_waiter.cancel();
        });

        self.current = Some(RunningChild { pid, exited });
        self.events_rx = Some(rx);
        self.last_plan = Some(plan.clone());
        self.last_opts = opts;
        Ok(())
    }

    /// Gracefully shut the orchestrator down.
    ///
    /// Sends SIGTERM, waits up to the grace period for exit, then escalates
    /// to SIGKILL. Idempotent no-op when nothing is running; always returns
    /// within the grace period plus a small epsilon.
    pub async fn stop(&mut self) -> Result<()> {
        let Some(current) = self.current.take() else {
            return Ok(());
        };
        if !self.is_running() {
            return Ok(());
        }

        if let Some(pid) = current.pid {
            mlog_debug!("Supervisor sending SIGTERM to pid {}", pid);
            signal(pid, libc::SIGTERM);
        }

        if tokio::time::timeout(self.grace, current.exited.cancelled())
            .await
            .is_err()
        {
            if let Some(pid) = current.pid {
                mlog_warn!("Grace period expired, sending SIGKILL to pid {}", pid);
                signal(pid, libc::SIGKILL);
            }
            // SIGKILL is not ignorable; give the waiter a moment to observe it.
            let _ = tokio::time::timeout(
                Duration::from_millis(500),
                current.exited.cancelled(),
            )
            .await;
        }

        self.running.store(false, Ordering::SeqCst);
        Ok(())
    }

    /// Stop, settle briefly, and start again with the cached plan/options.
    pub async fn restart(&mut self) -> Result<()> {
        let plan = self
            .last_plan
            .clone()
            .ok_or_else(|| Error::Validation("no work plan to restart".to_string()))?;
        let opts = self.last_opts.clone();

        self.stop().await?;
        tokio::time::sleep(RESTART_SETTLE).await;
        self.start(&plan, opts).await
    }
}

impl Default for Supervisor {
    fn default() -> Self {
        Self::new()
    }
}

fn signal(pid: u32, sig: libc::c_int) {
    // SAFETY: plain kill(2) on a pid we spawned; failure (e.g. the process
    // is already gone) is logged and otherwise harmless.
    let ret = unsafe { libc::kill(pid as libc::pid_t, sig) };
    if ret != 0 {
        let err = std::io::Error::last_os_error();
        mlog_debug!("kill({}, {}) failed: {}", pid, sig, err);
    }
}

/// Read one output stream line by line, parse each line into an event, and
/// push it onto the shared queue without ever blocking. Lines that fail to
/// parse degrade to generic log events; on a full queue the newest event is
/// dropped.
async fn pump_output<R>(stream: R, source: &'static str, tx: Sender<AgentEvent>)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(stream).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                if line.trim().is_empty() {
                    continue;
                }
                let event = AgentEvent::parse_line(&line)
                    .unwrap_or_else(|_| AgentEvent::log_line(&line));
                if tx.try_send(event).is_err() {
                    mlog_trace!("Event queue full, dropped newest event from {}", source);
                }
            }
            Ok(None) => break,
            Err(e) => {
                mlog_warn!("Read error on {}: {}", source, e);
                break;
            }
        }
    }
    mlog_trace!("Reader for {} finished", source);
}
