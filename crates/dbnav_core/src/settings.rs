use crate::NavError;
use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Key/value settings capability injected into anything that persists state.
///
/// Values are plain JSON so one store can hold unrelated collections under
/// different keys. An absent key reads as `None`.
#[async_trait]
pub trait SettingsStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Value>, NavError>;

    async fn set(&self, key: &str, value: Value) -> Result<(), NavError>;
}

/// Reads `key` and deserializes it into `T`.
pub async fn get_typed<T, S>(store: &S, key: &str) -> Result<Option<T>, NavError>
where
    T: DeserializeOwned,
    S: SettingsStore + ?Sized,
{
    match store.get(key).await? {
        Some(value) => Ok(Some(serde_json::from_value(value)?)),
        None => Ok(None),
    }
}

pub async fn set_typed<T, S>(store: &S, key: &str, value: &T) -> Result<(), NavError>
where
    T: Serialize + ?Sized,
    S: SettingsStore + ?Sized,
{
    store.set(key, serde_json::to_value(value)?).await
}

/// Settings that live for the lifetime of the process.
#[derive(Default)]
pub struct MemorySettingsStore {
    values: Mutex<HashMap<String, Value>>,
    writes: AtomicUsize,
}

impl MemorySettingsStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_value(self, key: impl Into<String>, value: Value) -> Self {
        self.values
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(key.into(), value);
        self
    }

    /// Number of `set` calls served so far.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::Relaxed)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.values
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .contains_key(key)
    }
}

#[async_trait]
impl SettingsStore for MemorySettingsStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, NavError> {
        let values = self
            .values
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Ok(values.get(key).cloned())
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), NavError> {
        self.values
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(key.to_string(), value);
        self.writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

/// Settings persisted as a single JSON object on disk.
///
/// The whole file is rewritten on every `set`. A missing file reads as an
/// empty object; a corrupted one is logged and treated the same way.
pub struct JsonFileSettingsStore {
    path: PathBuf,
}

impl JsonFileSettingsStore {
    /// Opens `settings.json` in the dbnav config directory, creating the
    /// directory if needed.
    pub fn new() -> Result<Self, NavError> {
        let config_dir = dirs::config_dir().ok_or_else(|| {
            NavError::IoError(std::io::Error::other("Could not find config directory"))
        })?;

        let app_dir = config_dir.join("dbnav");
        fs::create_dir_all(&app_dir).map_err(NavError::IoError)?;

        Ok(Self {
            path: app_dir.join("settings.json"),
        })
    }

    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_all(&self) -> Result<Map<String, Value>, NavError> {
        if !self.path.exists() {
            return Ok(Map::new());
        }

        let content = fs::read_to_string(&self.path).map_err(NavError::IoError)?;

        match serde_json::from_str::<Map<String, Value>>(&content) {
            Ok(values) => Ok(values),
            Err(e) => {
                log::warn!(
                    "Failed to parse settings file {} ({}), starting with empty settings",
                    self.path.display(),
                    e
                );
                Ok(Map::new())
            }
        }
    }
}

#[async_trait]
impl SettingsStore for JsonFileSettingsStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, NavError> {
        Ok(self.read_all()?.remove(key))
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), NavError> {
        let mut values = self.read_all()?;
        values.insert(key.to_string(), value);

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(NavError::IoError)?;
        }

        let content = serde_json::to_string_pretty(&values)?;
        fs::write(&self.path, content).map_err(NavError::IoError)?;

        Ok(())
    }
}
