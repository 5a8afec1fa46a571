use crate::NavError;
use crate::events::DEFAULT_EVENT_CAPACITY;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NavConfig {
    /// Give up on a session creation after this long. Unbounded when absent.
    #[serde(default)]
    pub session_timeout_ms: Option<u64>,

    /// Give up on an expansion after this long. Unbounded when absent.
    #[serde(default)]
    pub expand_timeout_ms: Option<u64>,

    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,

    #[serde(default)]
    pub service: Option<ServiceConfig>,
}

fn default_event_capacity() -> usize {
    DEFAULT_EVENT_CAPACITY
}

impl Default for NavConfig {
    fn default() -> Self {
        Self {
            session_timeout_ms: None,
            expand_timeout_ms: None,
            event_capacity: DEFAULT_EVENT_CAPACITY,
            service: None,
        }
    }
}

impl NavConfig {
    pub fn session_timeout(&self) -> Option<Duration> {
        self.session_timeout_ms.map(Duration::from_millis)
    }

    pub fn expand_timeout(&self) -> Option<Duration> {
        self.expand_timeout_ms.map(Duration::from_millis)
    }
}

/// How to launch the metadata discovery service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub command: String,

    #[serde(default)]
    pub args: Vec<String>,

    #[serde(default)]
    pub env: HashMap<String, String>,
}

pub struct NavConfigStore {
    path: PathBuf,
}

impl NavConfigStore {
    pub fn new() -> Result<Self, NavError> {
        let config_dir = dirs::config_dir().ok_or_else(|| {
            NavError::IoError(std::io::Error::other("Could not find config directory"))
        })?;

        let app_dir = config_dir.join("dbnav");
        fs::create_dir_all(&app_dir)?;

        Ok(Self {
            path: app_dir.join("config.json"),
        })
    }

    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn load(&self) -> Result<NavConfig, NavError> {
        if !self.path.exists() {
            return Ok(NavConfig::default());
        }

        let content = fs::read_to_string(&self.path)?;
        let config: NavConfig = serde_json::from_str(&content)
            .map_err(|e| NavError::Storage(format!("{}: {}", self.path.display(), e)))?;

        Ok(config)
    }

    pub fn save(&self, config: &NavConfig) -> Result<(), NavError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(config)?;
        fs::write(&self.path, content)?;

        log::info!("Saved config to {}", self.path.display());
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
