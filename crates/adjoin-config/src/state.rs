//! Persistent initialization state.
//!
//! The marker's existence is the "already joined" guard: while it is
//! present the join sequence must never run again. It is written once,
//! as the last step of a successful join, and only removed by an operator.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use adjoin_common::{paths, persist};

/// Content of the initialization marker.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InitRecord {
    pub realm: String,
    pub hostname: String,
    pub initialized_at: DateTime<Utc>,
    #[serde(default)]
    pub version: String,
}

impl InitRecord {
    pub fn new(realm: &str, hostname: &str) -> Self {
        Self {
            realm: realm.to_string(),
            hostname: hostname.to_string(),
            initialized_at: Utc::now(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Storage for the initialization marker.
pub trait StateStore: Send + Sync {
    /// Whether the marker exists.
    fn is_initialized(&self) -> Result<bool, std::io::Error>;

    /// The marker record, if present.
    fn marker(&self) -> Result<Option<InitRecord>, std::io::Error>;

    /// Persist the marker.
    fn mark_initialized(&self, record: &InitRecord) -> Result<(), std::io::Error>;

    /// Remove the marker. Returns whether one existed.
    fn clear(&self) -> Result<bool, std::io::Error>;
}

/// Marker stored as a JSON file in the state directory.
#[derive(Debug, Clone)]
pub struct FileStateStore {
    state_dir: PathBuf,
}

impl FileStateStore {
    pub fn new(state_dir: impl Into<PathBuf>) -> Self {
        Self {
            state_dir: state_dir.into(),
        }
    }

    pub fn state_dir(&self) -> &Path {
        &self.state_dir
    }

    pub fn marker_path(&self) -> PathBuf {
        paths::marker_path(&self.state_dir)
    }
}

impl StateStore for FileStateStore {
    fn is_initialized(&self) -> Result<bool, std::io::Error> {
        // Presence alone counts; an unreadable record must still block a rejoin.
        Ok(self.marker_path().try_exists()?)
    }

    fn marker(&self) -> Result<Option<InitRecord>, std::io::Error> {
        persist::read_json_if_exists(&self.marker_path())
    }

    fn mark_initialized(&self, record: &InitRecord) -> Result<(), std::io::Error> {
        persist::write_json_pretty(&self.marker_path(), record)
    }

    fn clear(&self) -> Result<bool, std::io::Error> {
        persist::remove_if_exists(&self.marker_path())
    }
}

/// In-memory marker for tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    record: Mutex<Option<InitRecord>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn initialized(record: InitRecord) -> Self {
        Self {
            record: Mutex::new(Some(record)),
        }
    }

    fn slot(&self) -> std::sync::MutexGuard<'_, Option<InitRecord>> {
        self.record.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl StateStore for MemoryStateStore {
    fn is_initialized(&self) -> Result<bool, std::io::Error> {
        Ok(self.slot().is_some())
    }

    fn marker(&self) -> Result<Option<InitRecord>, std::io::Error> {
        Ok(self.slot().clone())
    }

    fn mark_initialized(&self, record: &InitRecord) -> Result<(), std::io::Error> {
        *self.slot() = Some(record.clone());
        Ok(())
    }

    fn clear(&self) -> Result<bool, std::io::Error> {
        Ok(self.slot().take().is_some())
    }
}
