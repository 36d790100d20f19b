//! Round-trips the task list through an external string-keyed blob store.
//!
//! The whole collection lives under [`TASKS_KEY`] as one JSON array. Every
//! save writes the snapshot it is handed, serialized before the write is
//! awaited, so a save that completes late can only ever carry the state that
//! was current when it was issued.

use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, anyhow};
use async_trait::async_trait;
use chrono::NaiveDate;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::error::PersistenceError;
use crate::task::{Status, Task};

pub const TASKS_KEY: &str = "hedgehog-tasks";
pub const VIEW_KEY: &str = "hedgehog-view";

/// Asynchronous get/set service keyed by string, storing a string blob.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// `Ok(None)` when nothing has been stored under `key`.
    async fn get(&self, key: &str) -> anyhow::Result<Option<String>>;

    async fn set(&self, key: &str, value: String) -> anyhow::Result<()>;
}

/// Keeps each key in `<dir>/<key>.json`.
#[derive(Debug, Clone)]
pub struct FileKeyValueStore {
    dir: PathBuf,
}

impl FileKeyValueStore {
    #[tracing::instrument(skip(dir))]
    pub fn open(dir: &Path) -> anyhow::Result<Self> {
        std::fs::create_dir_all(dir).with_context(|| format!("failed to create {}", dir.display()))?;
        info!(dir = %dir.display(), "opened file key-value store");
        Ok(Self {
            dir: dir.to_path_buf(),
        })
    }

    pub fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

#[async_trait]
impl KeyValueStore for FileKeyValueStore {
    async fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        let path = self.path_for(key);
        debug!(file = %path.display(), "reading blob");
        match tokio::fs::read_to_string(&path).await {
            Ok(raw) => Ok(Some(raw)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err).with_context(|| format!("failed reading {}", path.display())),
        }
    }

    async fn set(&self, key: &str, value: String) -> anyhow::Result<()> {
        let path = self.path_for(key);
        debug!(file = %path.display(), bytes = value.len(), "writing blob atomically");
        tokio::task::spawn_blocking(move || write_atomic(&path, &value))
            .await
            .map_err(|err| anyhow!("blob writer task failed: {err}"))?
    }
}

fn write_atomic(path: &Path, contents: &str) -> anyhow::Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut temp = NamedTempFile::new_in(dir)?;
    temp.write_all(contents.as_bytes())?;
    temp.flush()?;

    temp.persist(path)
        .map_err(|err| anyhow!("failed to persist {}: {}", path.display(), err))?;

    Ok(())
}

/// In-process store; nothing survives the process.
#[derive(Debug, Default)]
pub struct MemoryKeyValueStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryKeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, key: &str, value: impl Into<String>) {
        self.entries.lock().insert(key.to_string(), value.into());
    }

    pub fn peek(&self, key: &str) -> Option<String> {
        self.entries.lock().get(key).cloned()
    }
}

#[async_trait]
impl KeyValueStore for MemoryKeyValueStore {
    async fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        Ok(self.peek(key))
    }

    async fn set(&self, key: &str, value: String) -> anyhow::Result<()> {
        self.insert(key, value);
        Ok(())
    }
}

/// Result of reading the task blob at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    Restored(Vec<Task>),
    /// First run, or the backing store could not be read.
    NoPriorState,
}

impl LoadOutcome {
    pub fn into_tasks(self) -> Vec<Task> {
        match self {
            LoadOutcome::Restored(tasks) => tasks,
            LoadOutcome::NoPriorState => Vec::new(),
        }
    }
}

/// View preferences that outlive a single invocation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewState {
    #[serde(default)]
    pub current_view: Status,

    #[serde(default)]
    pub selected_date: Option<NaiveDate>,
}

#[derive(Debug)]
pub struct PersistenceGateway<S> {
    backend: S,
}

impl<S: KeyValueStore> PersistenceGateway<S> {
    pub fn new(backend: S) -> Self {
        Self { backend }
    }

    pub fn backend(&self) -> &S {
        &self.backend
    }

    #[tracing::instrument(skip(self))]
    pub async fn load(&self) -> Result<LoadOutcome, PersistenceError> {
        let raw = match self.backend.get(TASKS_KEY).await {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                info!(key = TASKS_KEY, "no stored tasks; starting empty");
                return Ok(LoadOutcome::NoPriorState);
            }
            Err(err) => {
                warn!(key = TASKS_KEY, error = %format!("{err:#}"), "failed to fetch stored tasks; starting empty");
                return Ok(LoadOutcome::NoPriorState);
            }
        };

        let tasks = decode_tasks(&raw)?;
        debug!(count = tasks.len(), "restored tasks");
        Ok(LoadOutcome::Restored(tasks))
    }

    #[tracing::instrument(skip(self, tasks), fields(count = tasks.len()))]
    pub async fn save(&self, tasks: &[Task]) -> Result<(), PersistenceError> {
        let payload = encode_tasks(tasks)?;
        self.backend
            .set(TASKS_KEY, payload)
            .await
            .map_err(|source| PersistenceError::PersistenceUnavailable {
                key: TASKS_KEY.to_string(),
                source,
            })?;
        debug!("saved tasks");
        Ok(())
    }

    /// Reads view preferences; anything unreadable falls back to defaults.
    #[tracing::instrument(skip(self))]
    pub async fn load_view_state(&self) -> ViewState {
        match self.backend.get(VIEW_KEY).await {
            Ok(Some(raw)) => serde_json::from_str(&raw).unwrap_or_else(|err| {
                warn!(key = VIEW_KEY, error = %err, "stored view state is unreadable; using defaults");
                ViewState::default()
            }),
            Ok(None) => ViewState::default(),
            Err(err) => {
                warn!(key = VIEW_KEY, error = %format!("{err:#}"), "failed to fetch view state; using defaults");
                ViewState::default()
            }
        }
    }

    #[tracing::instrument(skip(self))]
    pub async fn save_view_state(&self, state: &ViewState) -> Result<(), PersistenceError> {
        let payload = serde_json::to_string(state).map_err(|source| PersistenceError::Encode {
            key: VIEW_KEY.to_string(),
            source,
        })?;
        self.backend
            .set(VIEW_KEY, payload)
            .await
            .map_err(|source| PersistenceError::PersistenceUnavailable {
                key: VIEW_KEY.to_string(),
                source,
            })
    }
}

pub fn encode_tasks(tasks: &[Task]) -> Result<String, PersistenceError> {
    serde_json::to_string(tasks).map_err(|source| PersistenceError::Encode {
        key: TASKS_KEY.to_string(),
        source,
    })
}

pub fn decode_tasks(raw: &str) -> Result<Vec<Task>, PersistenceError> {
    serde_json::from_str(raw).map_err(|source| PersistenceError::CorruptState {
        key: TASKS_KEY.to_string(),
        source,
    })
}
