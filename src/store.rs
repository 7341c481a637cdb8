//! Key-value persistence for check history and incidents
//!
//! The whole tracker state lives in one JSON blob under a fixed key. Reads and
//! writes through [`HistoryStore`] never fail the caller: storage problems are
//! logged and the tracker carries on with empty or unchanged state.

use crate::check::{Incident, ServiceCheck};
use crate::errors::{Result, TrackerError};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, error, warn};

/// Default key for the tracker blob.
pub const DEFAULT_STORAGE_KEY: &str = "uptime_history";

/// Schema version written by this crate.
pub const SCHEMA_VERSION: u32 = 1;

/// Minimal string key-value storage.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
    fn remove(&self, key: &str) -> Result<()>;
}

/// Keys must be plain file stems: ASCII alphanumerics, `_`, `-` and `.`,
/// not starting with `.`.
pub fn is_valid_key(key: &str) -> bool {
    !key.is_empty()
        && !key.starts_with('.')
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
}

/// Stores each key as `<dir>/<key>.json`.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> Result<PathBuf> {
        if !is_valid_key(key) {
            return Err(TrackerError::Storage(format!("invalid storage key: {:?}", key)));
        }

        Ok(self.dir.join(format!("{}.json", key)))
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let path = self.path_for(key)?;
        match fs::read_to_string(&path) {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let path = self.path_for(key)?;
        fs::create_dir_all(&self.dir)?;

        // Write beside the target and rename so readers never see a partial blob.
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, value)?;
        fs::rename(&tmp, &path)?;

        debug!("Wrote {} bytes to {}", value.len(), path.display());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let path = self.path_for(key)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Shared in-memory store. Clones see the same map.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: Arc<Mutex<HashMap<String, String>>>,
    quota_bytes: Option<usize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject any value larger than `quota_bytes`.
    pub fn with_quota(quota_bytes: usize) -> Self {
        Self {
            entries: Arc::default(),
            quota_bytes: Some(quota_bytes),
        }
    }

    fn entries(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        if let Some(quota) = self.quota_bytes {
            if value.len() > quota {
                return Err(TrackerError::Storage(format!(
                    "quota exceeded: {} bytes > {} bytes",
                    value.len(),
                    quota
                )));
            }
        }

        self.entries().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.entries().remove(key);
        Ok(())
    }
}

/// Everything the tracker persists.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedState {
    /// Missing in blobs written before versioning existed.
    #[serde(default)]
    pub schema_version: u32,
    #[serde(default)]
    pub history: Vec<ServiceCheck>,
    #[serde(default)]
    pub incidents: Vec<Incident>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PersistedStateRef<'a> {
    schema_version: u32,
    history: &'a [ServiceCheck],
    incidents: &'a [Incident],
}

/// Loads and saves the tracker blob under one key.
pub struct HistoryStore {
    store: Box<dyn KeyValueStore>,
    key: String,
}

impl HistoryStore {
    pub fn new(store: Box<dyn KeyValueStore>, key: impl Into<String>) -> Self {
        Self {
            store,
            key: key.into(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Read the blob. Missing, unreadable or corrupt data yields empty state.
    pub fn load(&self) -> PersistedState {
        let raw = match self.store.get(&self.key) {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                debug!("No stored state under key {}", self.key);
                return PersistedState::default();
            }
            Err(e) => {
                error!("Failed to read stored state under key {}: {}", self.key, e);
                return PersistedState::default();
            }
        };

        let state: PersistedState = match serde_json::from_str(&raw) {
            Ok(state) => state,
            Err(e) => {
                error!("Failed to parse stored state under key {}: {}", self.key, e);
                return PersistedState::default();
            }
        };

        migrate(state)
    }

    /// Write the blob. Failures are logged, never returned.
    pub fn save(&self, history: &[ServiceCheck], incidents: &[Incident]) {
        let blob = PersistedStateRef {
            schema_version: SCHEMA_VERSION,
            history,
            incidents,
        };

        let json = match serde_json::to_string(&blob) {
            Ok(json) => json,
            Err(e) => {
                error!("Failed to serialize tracker state: {}", e);
                return;
            }
        };

        if let Err(e) = self.store.set(&self.key, &json) {
            error!("Failed to save tracker state under key {}: {}", self.key, e);
        }
    }
}

fn migrate(mut state: PersistedState) -> PersistedState {
    match state.schema_version {
        // Version 0 is the unversioned format; the shape is identical.
        0 => {
            debug!("Migrating stored state from schema 0 to {}", SCHEMA_VERSION);
            state.schema_version = SCHEMA_VERSION;
            state
        }
        SCHEMA_VERSION => state,
        newer => {
            warn!(
                "Stored state has schema version {} (supported: {}), ignoring it",
                newer, SCHEMA_VERSION
            );
            PersistedState::default()
        }
    }
}
