//! Persisted resource state
//!
//! Every state transition is recorded through a [`StateStore`] before and
//! after the backend call it brackets, so a crash mid-operation leaves a
//! durable record of what was last attempted. The file-backed store keeps
//! `.strata/state.json` with a backup of the previous version; writes are
//! atomic (write to temp, rename over) and serialized through one lock, so
//! concurrent records from parallel tasks never lose each other's snapshot.

use crate::error::{CoreError, Result};
use crate::resource::{Action, Properties, Resource, Status};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tokio::fs;
use tokio::sync::Mutex as AsyncMutex;

const STATE_VERSION: u32 = 1;
const STATE_DIR: &str = ".strata";
const STATE_FILE: &str = "state.json";
const STATE_BACKUP: &str = "state.json.backup";
const STATE_TMP: &str = "state.json.tmp";

/// Durable snapshot of one resource, written on every transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceRecord {
    pub name: String,
    pub type_name: String,
    pub action: Action,
    pub status: Status,
    pub resource_id: Option<String>,
    pub properties: Properties,
    pub failure_reason: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl ResourceRecord {
    pub fn from_resource(resource: &Resource) -> Self {
        Self {
            name: resource.name.clone(),
            type_name: resource.type_name.clone(),
            action: resource.state().action,
            status: resource.state().status,
            resource_id: resource.resource_id.clone(),
            properties: resource.properties.clone(),
            failure_reason: resource.failure_reason.clone(),
            updated_at: Utc::now(),
        }
    }
}

/// Persistence hook invoked on every resource state transition.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Records (upserts) one resource snapshot.
    async fn record(&self, record: &ResourceRecord) -> Result<()>;

    /// Loads all recorded snapshots.
    async fn load(&self) -> Result<Vec<ResourceRecord>>;
}

/// On-disk state layout.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StateFile {
    version: u32,
    updated_at: DateTime<Utc>,
    resources: HashMap<String, ResourceRecord>,
}

impl Default for StateFile {
    fn default() -> Self {
        Self {
            version: STATE_VERSION,
            updated_at: Utc::now(),
            resources: HashMap::new(),
        }
    }
}

/// File-backed store under `<root>/.strata/state.json`.
///
/// The current [`StateFile`] is cached behind an async lock held across the
/// whole read-modify-write of [`record`](StateStore::record); without it,
/// interleaved records would clobber each other and race on the shared temp
/// file.
pub struct FileStateStore {
    root: PathBuf,
    cached: AsyncMutex<Option<StateFile>>,
}

impl FileStateStore {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            cached: AsyncMutex::new(None),
        }
    }

    fn state_dir(&self) -> PathBuf {
        self.root.join(STATE_DIR)
    }

    fn state_path(&self) -> PathBuf {
        self.state_dir().join(STATE_FILE)
    }

    fn backup_path(&self) -> PathBuf {
        self.state_dir().join(STATE_BACKUP)
    }

    fn tmp_path(&self) -> PathBuf {
        self.state_dir().join(STATE_TMP)
    }

    async fn ensure_state_dir(&self) -> Result<()> {
        let dir = self.state_dir();
        if !dir.exists() {
            fs::create_dir_all(&dir).await?;
            tracing::debug!("Created state directory: {}", dir.display());
        }
        Ok(())
    }

    async fn read_file(&self) -> Result<StateFile> {
        let path = self.state_path();
        if !path.exists() {
            tracing::debug!("State file not found, returning empty state");
            return Ok(StateFile::default());
        }

        let content = fs::read_to_string(&path).await?;
        let state: StateFile = serde_json::from_str(&content)?;

        if state.version > STATE_VERSION {
            return Err(CoreError::StateError(format!(
                "State file version {} is newer than supported version {}",
                state.version, STATE_VERSION
            )));
        }

        Ok(state)
    }

    async fn write_file(&self, state: &StateFile) -> Result<()> {
        self.ensure_state_dir().await?;

        let path = self.state_path();
        let backup = self.backup_path();
        let tmp = self.tmp_path();

        if path.exists() {
            if backup.exists() {
                fs::remove_file(&backup).await?;
            }
            fs::copy(&path, &backup).await?;
        }

        let content = serde_json::to_string_pretty(state)?;
        fs::write(&tmp, content).await?;
        fs::rename(&tmp, &path).await?;

        tracing::debug!("Saved state with {} resources", state.resources.len());
        Ok(())
    }
}

#[async_trait]
impl StateStore for FileStateStore {
    async fn record(&self, record: &ResourceRecord) -> Result<()> {
        let mut cached = self.cached.lock().await;
        // a failed write leaves the cache empty, forcing a re-read
        let mut state = match cached.take() {
            Some(state) => state,
            None => self.read_file().await?,
        };
        state.resources.insert(record.name.clone(), record.clone());
        state.updated_at = Utc::now();
        self.write_file(&state).await?;
        *cached = Some(state);
        Ok(())
    }

    async fn load(&self) -> Result<Vec<ResourceRecord>> {
        let mut cached = self.cached.lock().await;
        let state = match cached.as_ref() {
            Some(state) => state.clone(),
            None => {
                let state = self.read_file().await?;
                *cached = Some(state.clone());
                state
            }
        };
        Ok(state.resources.into_values().collect())
    }
}

/// In-process store used by tests and embedders that manage durability
/// themselves.
#[derive(Default)]
pub struct MemoryStateStore {
    records: Mutex<HashMap<String, ResourceRecord>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn records(&self) -> std::sync::MutexGuard<'_, HashMap<String, ResourceRecord>> {
        // records stay usable even if a writer panicked mid-insert
        self.records.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Current snapshot for one resource, if any.
    pub fn get(&self, name: &str) -> Option<ResourceRecord> {
        self.records().get(name).cloned()
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn record(&self, record: &ResourceRecord) -> Result<()> {
        self.records().insert(record.name.clone(), record.clone());
        Ok(())
    }

    async fn load(&self) -> Result<Vec<ResourceRecord>> {
        Ok(self.records().values().cloned().collect())
    }
}
