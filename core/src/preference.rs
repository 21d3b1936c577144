//! User preference persistence.
//!
//! # Design
//! The server is the source of truth and a local cache keyed by
//! [`CACHE_KEY`] fronts it. `load` reads through the cache; `save` merges the
//! patch over the server's current value (not the cached one), writes it
//! back, then refreshes the cache.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::debug;

use crate::error::RequestError;

pub const CACHE_KEY: &str = "userPreference";

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CarbonTheme {
    White,
    #[default]
    G10,
    G90,
    G100,
    /// Any other theme name the server holds, passed through unchanged.
    #[serde(untagged)]
    Other(String),
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct UserPreference {
    #[serde(default)]
    pub theme: CarbonTheme,
    /// Keys this crate does not interpret, kept as received.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Error)]
pub enum PreferenceError {
    #[error(transparent)]
    Request(#[from] RequestError),
    #[error("preference cache: {0}")]
    Cache(#[from] io::Error),
    #[error("invalid preference data: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// String key/value storage that survives between loads.
pub trait PreferenceCache: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, io::Error>;
    fn set(&self, key: &str, value: &str) -> Result<(), io::Error>;
}

#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PreferenceCache for MemoryCache {
    fn get(&self, key: &str) -> Result<Option<String>, io::Error> {
        Ok(self.entries.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), io::Error> {
        self.entries.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// One `<key>.json` file per entry under a directory.
#[derive(Debug, Clone)]
pub struct FileCache {
    dir: PathBuf,
}

impl FileCache {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    fn path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

impl PreferenceCache for FileCache {
    fn get(&self, key: &str) -> Result<Option<String>, io::Error> {
        match fs::read_to_string(self.path(key)) {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), io::Error> {
        fs::create_dir_all(&self.dir)?;
        fs::write(self.path(key), value)
    }
}

/// Server side of the store.
#[async_trait]
pub trait PreferenceApi: Send + Sync {
    async fn fetch(&self) -> Result<Map<String, Value>, RequestError>;
    async fn store(&self, preferences: &UserPreference) -> Result<(), RequestError>;
}

pub struct PreferenceStore {
    api: Arc<dyn PreferenceApi>,
    cache: Arc<dyn PreferenceCache>,
}

impl PreferenceStore {
    pub fn new(api: Arc<dyn PreferenceApi>, cache: Arc<dyn PreferenceCache>) -> Self {
        Self { api, cache }
    }

    pub async fn load(&self) -> Result<UserPreference, PreferenceError> {
        if let Some(stored) = self.cache.get(CACHE_KEY)? {
            debug!("Using cached {CACHE_KEY}");
            return Ok(serde_json::from_str(&stored)?);
        }

        let loaded = self.api.fetch().await?;
        if !loaded.is_empty() {
            let preference: UserPreference = serde_json::from_value(Value::Object(loaded))?;
            self.cache.set(CACHE_KEY, &serde_json::to_string(&preference)?)?;
            return Ok(preference);
        }

        debug!("No stored {CACHE_KEY}, saving defaults");
        let initial = match serde_json::to_value(UserPreference::default())? {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        self.save(initial).await
    }

    /// Shallow-merge `patch` over the server's current value and persist it.
    pub async fn save(&self, patch: Map<String, Value>) -> Result<UserPreference, PreferenceError> {
        let mut current = self.api.fetch().await?;
        current.extend(patch);

        let updated: UserPreference = serde_json::from_value(Value::Object(current))?;
        self.api.store(&updated).await?;
        self.cache.set(CACHE_KEY, &serde_json::to_string(&updated)?)?;
        Ok(updated)
    }
}
