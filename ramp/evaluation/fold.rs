use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::EvalError;

/// Hex length of a fold id (SHA-256).
pub const FOLD_ID_LEN: usize = 64;

/// Content hash of a fold's fit indices.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FoldId(String);

impl FoldId {
    /// Derives the id from fit indices, in the order given.
    ///
    /// Each index is hashed as a little-endian `u64`, so the id is the same on every
    /// platform and across process restarts.
    #[must_use]
    pub fn from_fit_indices(fit_indices: &[usize]) -> Self {
        let mut hasher = Sha256::new();
        for index in fit_indices {
            hasher.update((*index as u64).to_le_bytes());
        }
        Self(hex::encode(hasher.finalize()))
    }

    /// Hex string form.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FoldId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for FoldId {
    type Err = EvalError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        if value.len() == FOLD_ID_LEN && value.bytes().all(|b| b.is_ascii_hexdigit()) {
            Ok(Self(value.to_ascii_lowercase()))
        } else {
            Err(EvalError::Config(format!("malformed fold id: {value}")))
        }
    }
}

/// One cross-validation split of the training pool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fold {
    /// Hash of `fit_indices`.
    pub id: FoldId,
    /// Rows the model is fitted on.
    pub fit_indices: Vec<usize>,
    /// Rows the fitted model is validated on.
    pub validation_indices: Vec<usize>,
}

impl Fold {
    /// Builds a fold, deriving its id from the fit indices.
    #[must_use]
    pub fn new(fit_indices: Vec<usize>, validation_indices: Vec<usize>) -> Self {
        Self {
            id: FoldId::from_fit_indices(&fit_indices),
            fit_indices,
            validation_indices,
        }
    }
}

/// Turns split-provider output into identified folds.
#[must_use]
pub fn folds_from_splits(splits: Vec<(Vec<usize>, Vec<usize>)>) -> Vec<Fold> {
    splits
        .into_iter()
        .map(|(fit, validation)| Fold::new(fit, validation))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_is_deterministic() {
        let indices = vec![0, 3, 5, 8, 13];
        assert_eq!(
            FoldId::from_fit_indices(&indices),
            FoldId::from_fit_indices(&indices.clone())
        );
    }

    #[test]
    fn id_is_stable_across_restarts() {
        // Pinned values: changing the hashing scheme invalidates every cached artifact.
        assert_eq!(
            FoldId::from_fit_indices(&[0, 3, 5, 8, 13]).as_str(),
            "d7745f05b92b00f2c46ce5ce11ba049bc32cd802c9c5bd8fc24e7a3a30e71755"
        );
        assert_eq!(
            FoldId::from_fit_indices(&[]).as_str(),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn id_is_order_sensitive() {
        assert_ne!(
            FoldId::from_fit_indices(&[1, 2, 3]),
            FoldId::from_fit_indices(&[3, 2, 1])
        );
    }

    #[test]
    fn parses_round_trip_and_rejects_garbage() {
        let id = FoldId::from_fit_indices(&[4, 2]);
        let parsed: FoldId = id.as_str().parse().unwrap();
        assert_eq!(parsed, id);
        assert!("not-a-hash".parse::<FoldId>().is_err());
    }

    #[test]
    fn fold_ids_follow_fit_indices_only() {
        let folds = folds_from_splits(vec![(vec![0, 1], vec![2]), (vec![0, 1], vec![3])]);
        assert_eq!(folds[0].id, folds[1].id);
        assert_eq!(folds[1].validation_indices, vec![3]);
    }
}
