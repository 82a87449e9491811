//! Terminal event loop: raw-mode setup, keyboard/resize input, a drain-and-
//! redraw tick, and a render-to-text call per frame.

use std::io::{stdout, Stdout};
use std::time::Duration;

use crossterm::event::{Event, EventStream, KeyEventKind};
use crossterm::execute;
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use futures::StreamExt;
use ratatui::backend::CrosstermBackend;
use ratatui::widgets::Paragraph;
use ratatui::Terminal;

use crate::config::Config;
use crate::coordinator::{Command, Coordinator};
use crate::plan::WorkPlan;
use crate::{mlog_debug, Result};

/// Drain/redraw cadence.
const TICK_INTERVAL: Duration = Duration::from_millis(50);

/// Run the TUI until the user quits.
pub async fn run(config: Config, plan: Option<WorkPlan>) -> Result<()> {
    Config::ensure_dirs()?;
    let storage_root = Config::sessions_dir()?;

    let mut coordinator = Coordinator::new(&config, storage_root);
    if let Some(plan) = plan {
        coordinator.set_plan(plan);
    }

    let mut terminal = setup_terminal()?;
    let result = event_loop(&mut terminal, &mut coordinator).await;
    restore_terminal(&mut terminal)?;
    result
}

async fn event_loop(
    terminal: &mut Terminal<CrosstermBackend<Stdout>>,
    coordinator: &mut Coordinator,
) -> Result<()> {
    let size = terminal.size()?;
    coordinator.resize(size.width, size.height);

    let mut input = EventStream::new();
    let mut tick = tokio::time::interval(TICK_INTERVAL);

    loop {
        tokio::select! {
            maybe_event = input.next() => {
                match maybe_event {
                    Some(Ok(Event::Key(key))) if key.kind != KeyEventKind::Release => {
                        let commands = coordinator.handle_key(key);
                        if execute_commands(coordinator, commands).await {
                            break;
                        }
                    }
                    Some(Ok(Event::Resize(width, height))) => {
                        coordinator.resize(width, height);
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        mlog_debug!("Input stream error: {}", e);
                    }
                    None => break,
                }
            }
            _ = tick.tick() => {
                coordinator.on_tick();
            }
        }

        let text = coordinator.render();
        terminal.draw(|frame| {
            frame.render_widget(Paragraph::new(text), frame.area());
        })?;
    }

    coordinator.shutdown().await;
    Ok(())
}

/// Execute side-effect commands from key handling; true means quit.
async fn execute_commands(coordinator: &mut Coordinator, commands: Vec<Command>) -> bool {
    for command in commands {
        match command {
            Command::Launch => {
                if let Err(e) = coordinator.launch().await {
                    coordinator.report_error("launch failed", &e);
                }
            }
            Command::Restart => {
                if let Err(e) = coordinator.restart().await {
                    coordinator.report_error("restart failed", &e);
                }
            }
            Command::Cancel => {
                if let Err(e) = coordinator.cancel().await {
                    coordinator.report_error("cancel failed", &e);
                }
            }
            Command::Quit => return true,
        }
    }
    false
}

fn setup_terminal() -> Result<Terminal<CrosstermBackend<Stdout>>> {
    enable_raw_mode()?;
    execute!(stdout(), EnterAlternateScreen)?;
    Ok(Terminal::new(CrosstermBackend::new(stdout()))?)
}

fn restore_terminal(terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> Result<()> {
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    Ok(())
}
