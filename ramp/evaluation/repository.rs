use std::{
    fmt, fs,
    path::{Path, PathBuf},
    sync::Arc,
};

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::EvalError;

/// Stable identifier of a submitted model.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModelId(String);

impl ModelId {
    /// Generates a fresh id usable as a directory name.
    #[must_use]
    pub fn generate() -> Self {
        Self(format!("m{}", Uuid::new_v4().simple()))
    }

    /// Wraps an existing id.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// String form.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ModelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lifecycle of a submitted model.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ModelState {
    /// Waiting for its first training pass.
    New,
    /// Folds are being trained.
    Training,
    /// Every fold trained and validated.
    Trained,
    /// Training failed; see the stored message.
    Error,
    /// Folds are being tested.
    Testing,
    /// Every fold produced test predictions.
    Tested,
    /// Testing failed; see the stored message.
    TestError,
}

impl ModelState {
    /// States from which a submission may be replaced.
    #[must_use]
    pub const fn accepts_resubmission(self) -> bool {
        matches!(self, Self::New | Self::Error | Self::TestError)
    }

    /// States in which every fold has validation predictions.
    #[must_use]
    pub const fn is_validated(self) -> bool {
        matches!(
            self,
            Self::Trained | Self::Testing | Self::Tested | Self::TestError
        )
    }
}

impl fmt::Display for ModelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::New => "new",
            Self::Training => "training",
            Self::Trained => "trained",
            Self::Error => "error",
            Self::Testing => "testing",
            Self::Tested => "tested",
            Self::TestError => "test_error",
        };
        f.write_str(label)
    }
}

/// A submission tracked by the evaluation core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelEntry {
    /// Identifier used for artifact addressing.
    pub id: ModelId,
    /// Submission name shown on leaderboards.
    pub name: String,
    /// Registry key of the classifier implementing the submission.
    pub reference: String,
    /// Submission time; evaluation order follows it.
    pub submitted_at: DateTime<Utc>,
    /// Current state.
    pub state: ModelState,
    /// Truncated failure message for `error` / `test_error`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ModelEntry {
    /// Creates a `new` entry stamped now.
    #[must_use]
    pub fn new(name: impl Into<String>, reference: impl Into<String>) -> Self {
        Self {
            id: ModelId::generate(),
            name: name.into(),
            reference: reference.into(),
            submitted_at: Utc::now(),
            state: ModelState::New,
            error: None,
        }
    }
}

/// Key-value repository of model entries.
pub trait ModelRepository: Send + Sync {
    /// Inserts or replaces an entry.
    fn upsert(&self, entry: ModelEntry) -> Result<(), EvalError>;

    /// Entry by id.
    fn get(&self, id: &ModelId) -> Result<ModelEntry, EvalError>;

    /// Every entry in insertion order.
    fn list(&self) -> Result<Vec<ModelEntry>, EvalError>;

    /// Updates the state and stored message of an entry.
    fn set_state(
        &self,
        id: &ModelId,
        state: ModelState,
        error: Option<String>,
    ) -> Result<(), EvalError> {
        let mut entry = self.get(id)?;
        entry.state = state;
        entry.error = error;
        self.upsert(entry)
    }

    /// Entries ordered by submission time; ties keep insertion order.
    fn list_by_submission(&self) -> Result<Vec<ModelEntry>, EvalError> {
        let mut entries = self.list()?;
        entries.sort_by_key(|entry| entry.submitted_at);
        Ok(entries)
    }

    /// Registers a submission, or resets a failed/pending one with the same name.
    fn enqueue(&self, name: &str, reference: &str) -> Result<ModelEntry, EvalError> {
        let existing = self.list()?.into_iter().find(|entry| entry.name == name);
        let entry = match existing {
            Some(mut entry) if entry.state.accepts_resubmission() => {
                entry.reference = reference.to_string();
                entry.state = ModelState::New;
                entry.error = None;
                entry.submitted_at = Utc::now();
                entry
            }
            Some(_) => return Err(EvalError::DuplicateSubmission(name.to_string())),
            None => ModelEntry::new(name, reference),
        };
        self.upsert(entry.clone())?;
        Ok(entry)
    }
}

/// In-process repository.
#[derive(Debug, Clone, Default)]
pub struct MemoryModelRepository {
    inner: Arc<RwLock<IndexMap<ModelId, ModelEntry>>>,
}

impl ModelRepository for MemoryModelRepository {
    fn upsert(&self, entry: ModelEntry) -> Result<(), EvalError> {
        self.inner.write().insert(entry.id.clone(), entry);
        Ok(())
    }

    fn get(&self, id: &ModelId) -> Result<ModelEntry, EvalError> {
        self.inner
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| EvalError::UnknownModel(id.to_string()))
    }

    fn list(&self) -> Result<Vec<ModelEntry>, EvalError> {
        Ok(self.inner.read().values().cloned().collect())
    }
}

/// Repository persisted as one JSON document, replaced atomically on every write.
#[derive(Debug)]
pub struct FsModelRepository {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FsModelRepository {
    /// Opens (lazily creates) the document at `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// Backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_all(&self) -> Result<IndexMap<ModelId, ModelEntry>, EvalError> {
        if !self.path.exists() {
            return Ok(IndexMap::new());
        }
        let raw = fs::read(&self.path)?;
        let entries: Vec<ModelEntry> = serde_json::from_slice(&raw)?;
        Ok(entries
            .into_iter()
            .map(|entry| (entry.id.clone(), entry))
            .collect())
    }

    fn write_all(&self, entries: &IndexMap<ModelId, ModelEntry>) -> Result<(), EvalError> {
        let list: Vec<&ModelEntry> = entries.values().collect();
        let data = serde_json::to_vec_pretty(&list)?;
        crate::artifacts::fs::write_atomic(&self.path, &data)
    }
}

impl ModelRepository for FsModelRepository {
    fn upsert(&self, entry: ModelEntry) -> Result<(), EvalError> {
        let _guard = self.write_lock.lock();
        let mut entries = self.read_all()?;
        entries.insert(entry.id.clone(), entry);
        self.write_all(&entries)
    }

    fn get(&self, id: &ModelId) -> Result<ModelEntry, EvalError> {
        self.read_all()?
            .swap_remove(id)
            .ok_or_else(|| EvalError::UnknownModel(id.to_string()))
    }

    fn list(&self) -> Result<Vec<ModelEntry>, EvalError> {
        Ok(self.read_all()?.into_values().collect())
    }
}
