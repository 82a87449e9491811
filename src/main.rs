use std::path::PathBuf;

use clap::{Parser, Subcommand};

use maestro::config::Config;
use maestro::session::{self, HistoryOptions, SessionId, SessionStatus};
use maestro::util::blocking;
use maestro::{mlog, Result, WorkPlan};

/// Maestro - multi-agent task orchestration dashboard
#[derive(Parser, Debug)]
#[command(name = "maestro")]
#[command(version, about, long_about = None)]
#[command(after_help = "ENVIRONMENT:\n    MAESTRO_DEBUG=1     Enable debug logging (alternative to --debug)")]
pub struct Cli {
    /// Enable debug logging (writes to ~/.maestro/maestro.log)
    #[arg(short = 'd', long)]
    pub debug: bool,

    /// Load a work plan document (JSON) into the editor on startup
    #[arg(short = 'p', long)]
    pub plan: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// List past orchestration sessions
    History {
        /// Filter by status (running|paused|completed|failed|cancelled)
        #[arg(long)]
        status: Option<String>,

        /// Maximum number of sessions to show
        #[arg(long)]
        limit: Option<usize>,

        /// Skip the first N sessions
        #[arg(long, default_value_t = 0)]
        offset: usize,

        /// Oldest first instead of most recent first
        #[arg(long)]
        reverse: bool,
    },

    /// Delete a stored session by id
    Delete {
        /// Session id (UUID)
        id: String,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    maestro::log::init_with_debug(cli.debug);

    match cli.command {
        Some(Command::History {
            status,
            limit,
            offset,
            reverse,
        }) => {
            return run_history(status, limit, offset, reverse);
        }
        Some(Command::Delete { id }) => {
            return run_delete(&id);
        }
        None => {}
    }

    mlog!("Maestro starting");

    let config = Config::load()?;
    let plan = match &cli.plan {
        Some(path) => {
            let data = std::fs::read_to_string(path)?;
            let plan = WorkPlan::from_json(&data)?;
            mlog!("Loaded plan '{}' from {}", plan.name, path.display());
            Some(plan)
        }
        None => None,
    };

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(maestro::app::run(config, plan))
}

fn run_history(
    status: Option<String>,
    limit: Option<usize>,
    offset: usize,
    reverse: bool,
) -> Result<()> {
    let status = status
        .as_deref()
        .map(str::parse::<SessionStatus>)
        .transpose()?;
    let opts = HistoryOptions {
        status,
        limit,
        offset,
        reverse,
    };

    let runtime = tokio::runtime::Runtime::new()?;
    let summaries = runtime.block_on(async {
        let root = Config::sessions_dir()?;
        blocking(move || session::history(&root, &opts)).await
    })?;

    if summaries.is_empty() {
        println!("No sessions found.");
        return Ok(());
    }

    println!(
        "{:<38} {:<10} {:<20} {:>9} {:>11}",
        "ID", "STATUS", "STARTED", "PROGRESS", "TASKS"
    );
    for summary in summaries {
        println!(
            "{:<38} {:<10} {:<20} {:>8.1}% {:>5}/{:<5}",
            summary.id.to_string(),
            summary.status.to_string(),
            summary.start_time.format("%Y-%m-%d %H:%M:%S").to_string(),
            summary.progress,
            summary.completed_tasks,
            summary.total_tasks,
        );
    }
    Ok(())
}

fn run_delete(id: &str) -> Result<()> {
    let id: SessionId = id
        .parse()
        .map_err(|_| maestro::Error::SessionNotFound(id.to_string()))?;
    let root = Config::sessions_dir()?;
    session::delete(&root, id)?;
    println!("Deleted session {}", id);
    Ok(())
}
