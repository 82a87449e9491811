use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

use crate::{mlog_debug, Error, Result};

/// Default name of the external orchestrator binary supervised by maestro.
pub const DEFAULT_COMMAND: &str = "agentd";

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Override for the orchestrator binary name.
    pub command: Option<String>,
    /// Override for the session storage directory.
    pub storage_dir: Option<String>,
    /// Milliseconds between orchestrator polls.
    pub polling_interval_ms: Option<u64>,
    /// Cap on concurrently executing agents.
    pub max_concurrent: Option<usize>,
}

impl Config {
    pub fn maestro_dir() -> Result<PathBuf> {
        Ok(dirs::home_dir().ok_or(Error::NoHomeDir)?.join(".maestro"))
    }

    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::maestro_dir()?.join("maestro.toml"))
    }

    pub fn sessions_dir() -> Result<PathBuf> {
        let config = Self::load()?;
        match config.storage_dir {
            Some(dir) => Ok(expand_tilde(&dir)),
            None => Ok(Self::maestro_dir()?.join("sessions")),
        }
    }

    pub fn effective_command(&self) -> &str {
        self.command.as_deref().unwrap_or(DEFAULT_COMMAND)
    }

    pub fn effective_polling_interval_ms(&self) -> u64 {
        self.polling_interval_ms.unwrap_or(100)
    }

    pub fn effective_max_concurrent(&self) -> usize {
        self.max_concurrent.unwrap_or(4)
    }

    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        mlog_debug!("Config::load path={}", path.display());
        if !path.exists() {
            mlog_debug!("Config file not found, using defaults");
            return Ok(Self::default());
        }
        let config: Self = toml::from_str(&fs::read_to_string(&path)?)?;
        mlog_debug!(
            "Config loaded: command={:?}, storage_dir={:?}, polling={:?}, max_concurrent={:?}",
            config.command,
            config.storage_dir,
            config.polling_interval_ms,
            config.max_concurrent
        );
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let dir = Self::maestro_dir()?;
        mlog_debug!("Config::save dir={}", dir.display());
        if !dir.exists() {
            mlog_debug!("Creating maestro directory");
            fs::create_dir_all(&dir)?;
        }
        let path = Self::config_path()?;
        fs::write(&path, toml::to_string_pretty(self)?)?;
        mlog_debug!("Config saved to {}", path.display());
        Ok(())
    }

    pub fn ensure_dirs() -> Result<()> {
        let dir = Self::maestro_dir()?;
        let sessions = Self::sessions_dir()?;
        mlog_debug!(
            "Config::ensure_dirs maestro={} sessions={}",
            dir.display(),
            sessions.display()
        );
        if !dir.exists() {
            fs::create_dir_all(&dir)?;
        }
        if !sessions.exists() {
            fs::create_dir_all(&sessions)?;
        }
        Ok(())
    }
}

fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}
