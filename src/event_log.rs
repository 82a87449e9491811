//! Bounded, filterable scrollback of raw orchestration events.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use regex::Regex;

use crate::event::{AgentEvent, AgentRole, EventKind};
use crate::util::truncate;
use crate::Result;

/// Default ring capacity; exceeding it evicts the oldest entries first.
pub const DEFAULT_CAPACITY: usize = 10_000;

/// Severity derived from the event kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
        }
    }

    fn from_kind(kind: EventKind) -> Self {
        match kind {
            EventKind::Failed => LogLevel::Error,
            _ => LogLevel::Info,
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One line of the scrollback.
#[derive(Debug, Clone)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub agent: AgentRole,
    pub kind: EventKind,
    pub task_id: String,
    pub message: String,
    pub level: LogLevel,
}

impl LogEntry {
    fn from_event(event: &AgentEvent) -> Self {
        Self {
            timestamp: event.timestamp,
            agent: event.agent,
            kind: event.kind,
            task_id: event.task_id.clone(),
            message: event.message.clone(),
            level: LogLevel::from_kind(event.kind),
        }
    }
}

/// Append-only ring of log entries with filtering, scrolling, and export.
///
/// The active filter is the conjunction of agent equality, a minimum level,
/// and a regex over the message. Changing any filter resets the scroll
/// position to the top; appends keep the view pinned to the bottom.
pub struct EventLog {
    entries: VecDeque<LogEntry>,
    capacity: usize,

    filter_agent: Option<AgentRole>,
    filter_level: Option<LogLevel>,
    search_query: String,
    search_regex: Option<Regex>,

    offset: usize,
    visible_lines: usize,

    last_export: Option<PathBuf>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity.min(128)),
            capacity,
            filter_agent: None,
            filter_level: None,
            search_query: String::new(),
            search_regex: None,
            offset: 0,
            visible_lines: 20,
            last_export: None,
        }
    }

    /// Append an event, evicting the oldest entry once full.
    pub fn push(&mut self, event: &AgentEvent) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(LogEntry::from_event(event));
        self.scroll_to_bottom();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn filtered_len(&self) -> usize {
        self.filtered().count()
    }

    // --- Filters ---

    /// Keep only entries from one agent (None shows all).
    pub fn set_filter_agent(&mut self, agent: Option<AgentRole>) {
        self.filter_agent = agent;
        self.offset = 0;
    }

    /// Keep only entries at or above this level (None shows all).
    pub fn set_filter_level(&mut self, level: Option<LogLevel>) {
        self.filter_level = level;
        self.offset = 0;
    }

    /// Set a regex over the message; empty clears the search.
    pub fn set_search(&mut self, query: &str) -> Result<()> {
        if query.is_empty() {
            self.search_query.clear();
            self.search_regex = None;
        } else {
            self.search_regex = Some(Regex::new(query)?);
            self.search_query = query.to_string();
        }
        self.offset = 0;
        Ok(())
    }

    pub fn clear_filters(&mut self) {
        self.filter_agent = None;
        self.filter_level = None;
        self.search_query.clear();
        self.search_regex = None;
        self.offset = 0;
    }

    fn matches(&self, entry: &LogEntry) -> bool {
        if let Some(agent) = self.filter_agent {
            if entry.agent != agent {
                return false;
            }
        }
        if let Some(level) = self.filter_level {
            if entry.level < level {
                return false;
            }
        }
        if let Some(regex) = &self.search_regex {
            if !regex.is_match(&entry.message) {
                return false;
            }
        }
        true
    }

    fn filtered(&self) -> impl Iterator<Item = &LogEntry> {
        self.entries.iter().filter(|e| self.matches(e))
    }

    // --- Scrolling ---

    /// Number of rows the entry window occupies; used for clamping.
    pub fn set_visible_lines(&mut self, lines: usize) {
        self.visible_lines = lines.max(1);
        self.clamp_offset();
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    fn max_offset(&self) -> usize {
        self.filtered_len().saturating_sub(self.visible_lines)
    }

    fn clamp_offset(&mut self) {
        self.offset = self.offset.min(self.max_offset());
    }

    pub fn scroll_up(&mut self) {
        self.offset = self.offset.saturating_sub(1);
    }

    pub fn scroll_down(&mut self) {
        self.offset = (self.offset + 1).min(self.max_offset());
    }

    pub fn page_up(&mut self) {
        let page = (self.visible_lines / 2).max(1);
        self.offset = self.offset.saturating_sub(page);
    }

    pub fn page_down(&mut self) {
        let page = (self.visible_lines / 2).max(1);
        self.offset = (self.offset + page).min(self.max_offset());
    }

    pub fn scroll_to_top(&mut self) {
        self.offset = 0;
    }

    pub fn scroll_to_bottom(&mut self) {
        self.offset = self.max_offset();
    }

    pub fn handle_key(&mut self, key: KeyEvent) {
        if key.modifiers.contains(KeyModifiers::CONTROL) {
            match key.code {
                KeyCode::Char('d') => self.page_down(),
                KeyCode::Char('u') => self.page_up(),
                _ => {}
            }
            return;
        }
        match key.code {
            KeyCode::Char('j') | KeyCode::Down => self.scroll_down(),
            KeyCode::Char('k') | KeyCode::Up => self.scroll_up(),
            KeyCode::Char('g') => self.scroll_to_top(),
            KeyCode::Char('G') => self.scroll_to_bottom(),
            _ => {}
        }
    }

    // --- Export ---

    /// Write the currently filtered subset as tab-separated records.
    pub fn export(&mut self, path: &Path) -> Result<()> {
        let lines: Vec<String> = self
            .filtered()
            .map(|e| {
                format!(
                    "{}\t{}\t{}\t{}\t{}",
                    e.timestamp.to_rfc3339(),
                    e.agent,
                    e.level,
                    e.task_id,
                    e.message
                )
            })
            .collect();
        std::fs::write(path, lines.join("\n"))?;
        self.last_export = Some(path.to_path_buf());
        Ok(())
    }

    pub fn last_export(&self) -> Option<&Path> {
        self.last_export.as_deref()
    }

    // --- Rendering ---

    fn format_entry(&self, entry: &LogEntry, width: usize) -> String {
        let message = truncate(&entry.message, width.saturating_sub(40).max(20));
        format!(
            "[{}] [{:<11}] {:<5} task={} {}",
            entry.timestamp.format("%H:%M:%S"),
            entry.agent.to_string(),
            entry.level.to_string(),
            entry.task_id,
            message
        )
    }

    /// Render the header, the visible window, and a footer with counts.
    pub fn render(&self, width: usize, height: usize) -> String {
        let mut lines = Vec::new();

        let mut header = "Agent Event Log".to_string();
        if let Some(agent) = self.filter_agent {
            header.push_str(&format!(" (agent: {})", agent));
        }
        if let Some(level) = self.filter_level {
            header.push_str(&format!(" (level: {}+)", level));
        }
        if !self.search_query.is_empty() {
            header.push_str(&format!(" (search: {})", self.search_query));
        }
        lines.push(header);

        let window = height.saturating_sub(2);
        let filtered: Vec<&LogEntry> = self.filtered().collect();
        let start = self.offset.min(filtered.len());
        let end = (start + window).min(filtered.len());
        for entry in &filtered[start..end] {
            lines.push(self.format_entry(entry, width));
        }
        for _ in (end - start)..window {
            lines.push(String::new());
        }

        lines.push(format!(
            "Events: {}/{} | j/k scroll | g/G top/bottom | ctrl+u/d page | e export",
            end - start,
            filtered.len()
        ));

        lines.join("\n")
    }
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new()
    }
}
