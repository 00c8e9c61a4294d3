//! Flat key-addressed artifact storage for fold outputs and ground truth.

/// Filesystem-backed store with atomic publish.
pub mod fs;
/// In-memory store for tests and dry runs.
pub mod memory;

use std::{fmt, path::PathBuf};

use serde::{Deserialize, Serialize};

use crate::{
    error::EvalError, fold::FoldId, predictions::PredictionSet, repository::ModelId,
};

pub use fs::FsArtifactStore;
pub use memory::MemoryArtifactStore;

/// Prefix of per-fold ground-truth files.
pub const GROUND_TRUTH_VALID_PREFIX: &str = "ground_truth_valid_";
/// Name of the held-out ground-truth file.
pub const GROUND_TRUTH_TEST: &str = "ground_truth_test";

/// Kind of per-(model, fold) artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    /// Serialized trained model.
    Model,
    /// Seconds spent fitting.
    TrainTime,
    /// Seconds spent predicting the validation subset.
    ValidTime,
    /// Validation predictions.
    Valid,
    /// Held-out test predictions.
    Test,
}

impl ArtifactKind {
    /// File-name prefix for this kind.
    #[must_use]
    pub const fn prefix(self) -> &'static str {
        match self {
            Self::Model => "model",
            Self::TrainTime => "train_time",
            Self::ValidTime => "valid_time",
            Self::Valid => "valid",
            Self::Test => "test",
        }
    }
}

/// Address of one stored artifact.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ArtifactKey {
    /// Output of a model on a fold.
    Model {
        /// Owning model.
        model: ModelId,
        /// Fold the artifact belongs to.
        fold: FoldId,
        /// What the artifact holds.
        kind: ArtifactKind,
    },
    /// Labels of a fold's validation subset.
    GroundTruthValid(FoldId),
    /// Labels of the held-out test set.
    GroundTruthTest,
}

impl ArtifactKey {
    /// Key of a per-(model, fold) artifact.
    #[must_use]
    pub fn model(model: &ModelId, fold: &FoldId, kind: ArtifactKind) -> Self {
        Self::Model {
            model: model.clone(),
            fold: fold.clone(),
            kind,
        }
    }

    /// Location relative to a store root.
    #[must_use]
    pub fn relative_path(&self) -> PathBuf {
        match self {
            Self::Model { model, fold, kind } => PathBuf::from("models")
                .join(model.as_str())
                .join(format!("{}_{fold}", kind.prefix())),
            Self::GroundTruthValid(fold) => {
                PathBuf::from("ground_truth").join(format!("{GROUND_TRUTH_VALID_PREFIX}{fold}"))
            }
            Self::GroundTruthTest => PathBuf::from("ground_truth").join(GROUND_TRUTH_TEST),
        }
    }
}

impl fmt::Display for ArtifactKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.relative_path().display())
    }
}

/// Flat key to bytes store.
///
/// Writes publish atomically: a concurrent reader sees either the previous value or the
/// complete new one.
pub trait ArtifactStore: Send + Sync {
    /// Stores `bytes` under `key`, replacing any previous value.
    fn put(&self, key: &ArtifactKey, bytes: &[u8]) -> Result<(), EvalError>;

    /// Reads `key`; a missing key yields [`EvalError::CacheMiss`].
    fn get(&self, key: &ArtifactKey) -> Result<Vec<u8>, EvalError>;

    /// Whether `key` holds a value.
    fn exists(&self, key: &ArtifactKey) -> Result<bool, EvalError>;

    /// Deletes `key`; deleting a missing key is not an error.
    fn remove(&self, key: &ArtifactKey) -> Result<(), EvalError>;

    /// Folds with validation ground truth, sorted by id.
    fn ground_truth_folds(&self) -> Result<Vec<FoldId>, EvalError>;

    /// Drops every artifact of `model`.
    fn purge_model(&self, model: &ModelId) -> Result<(), EvalError>;
}

/// Typed accessors layered over the byte store.
pub trait ArtifactStoreExt: ArtifactStore {
    /// Stores a scalar (elapsed seconds) as text.
    fn put_scalar(&self, key: &ArtifactKey, value: f64) -> Result<(), EvalError> {
        self.put(key, value.to_string().as_bytes())
    }

    /// Reads a scalar stored with [`Self::put_scalar`].
    fn get_scalar(&self, key: &ArtifactKey) -> Result<f64, EvalError> {
        let bytes = self.get(key)?;
        let text = String::from_utf8_lossy(&bytes);
        text.trim()
            .parse::<f64>()
            .map_err(|err| EvalError::CorruptArtifact(format!("scalar at {key}: {err}")))
    }

    /// Stores a prediction set.
    fn put_predictions(&self, key: &ArtifactKey, set: &PredictionSet) -> Result<(), EvalError> {
        self.put(key, &set.to_bytes()?)
    }

    /// Reads a prediction set.
    fn get_predictions(&self, key: &ArtifactKey) -> Result<PredictionSet, EvalError> {
        PredictionSet::from_bytes(&self.get(key)?)
    }

    /// Reads a prediction set, mapping a cache miss to `None`.
    fn try_predictions(&self, key: &ArtifactKey) -> Result<Option<PredictionSet>, EvalError> {
        match self.get_predictions(key) {
            Ok(set) => Ok(Some(set)),
            Err(err) if err.is_cache_miss() => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Stores a label vector.
    fn put_labels(&self, key: &ArtifactKey, labels: &[String]) -> Result<(), EvalError> {
        self.put(key, &serde_json::to_vec(labels)?)
    }

    /// Reads a label vector.
    fn get_labels(&self, key: &ArtifactKey) -> Result<Vec<String>, EvalError> {
        Ok(serde_json::from_slice(&self.get(key)?)?)
    }
}

impl<T: ArtifactStore + ?Sized> ArtifactStoreExt for T {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_keys_follow_naming_convention() {
        let fold = FoldId::from_fit_indices(&[1, 2]);
        let key = ArtifactKey::model(&ModelId::new("m1"), &fold, ArtifactKind::ValidTime);
        assert_eq!(
            key.relative_path(),
            PathBuf::from("models").join("m1").join(format!("valid_time_{fold}"))
        );
        assert_eq!(
            ArtifactKey::GroundTruthValid(fold.clone()).relative_path(),
            PathBuf::from("ground_truth").join(format!("ground_truth_valid_{fold}"))
        );
    }

    #[test]
    fn typed_accessors_round_trip_through_bytes() {
        let store = MemoryArtifactStore::default();
        let fold = FoldId::from_fit_indices(&[0]);
        let key = ArtifactKey::model(&ModelId::new("m"), &fold, ArtifactKind::TrainTime);
        store.put_scalar(&key, 1.25).unwrap();
        assert!((store.get_scalar(&key).unwrap() - 1.25).abs() < f64::EPSILON);

        let missing = ArtifactKey::model(&ModelId::new("m"), &fold, ArtifactKind::Valid);
        assert!(store.try_predictions(&missing).unwrap().is_none());
    }

    #[test]
    fn unreadable_scalar_is_a_corrupt_artifact() {
        let store = MemoryArtifactStore::default();
        let fold = FoldId::from_fit_indices(&[0]);
        let key = ArtifactKey::model(&ModelId::new("m"), &fold, ArtifactKind::ValidTime);
        store.put(&key, b"not a number").unwrap();
        assert!(matches!(
            store.get_scalar(&key),
            Err(EvalError::CorruptArtifact(_))
        ));
    }
}
