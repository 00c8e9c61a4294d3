use std::{collections::BTreeSet, fs, path::Path};

use rand::{seq::SliceRandom, Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::error::EvalError;

/// Labelled feature matrix, one row per instance.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    /// Feature rows.
    pub features: Vec<Vec<f64>>,
    /// Class label of every row.
    pub labels: Vec<String>,
}

impl Dataset {
    /// Builds a dataset, rejecting misaligned or ragged input.
    pub fn new(features: Vec<Vec<f64>>, labels: Vec<String>) -> Result<Self, EvalError> {
        let dataset = Self { features, labels };
        dataset.validate()?;
        Ok(dataset)
    }

    /// Number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    /// True when there are no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Returns the feature dimensionality.
    #[must_use]
    pub fn feature_dim(&self) -> usize {
        self.features.first().map_or(0, Vec::len)
    }

    /// Sorted distinct labels.
    #[must_use]
    pub fn label_set(&self) -> Vec<String> {
        self.labels
            .iter()
            .cloned()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Rows at `indices`, in the order given.
    pub fn subset(&self, indices: &[usize]) -> Result<Self, EvalError> {
        let mut features = Vec::with_capacity(indices.len());
        let mut labels = Vec::with_capacity(indices.len());
        for &idx in indices {
            let (Some(row), Some(label)) = (self.features.get(idx), self.labels.get(idx)) else {
                return Err(EvalError::Config(format!(
                    "index {idx} out of range for {} rows",
                    self.len()
                )));
            };
            features.push(row.clone());
            labels.push(label.clone());
        }
        Ok(Self { features, labels })
    }

    /// Shuffled split into `(train, test)`, the test part holding `test_size` of the rows.
    pub fn train_test_split(&self, test_size: f64, seed: u64) -> Result<(Self, Self), EvalError> {
        if self.len() < 2 {
            return Err(EvalError::Config(
                "need at least two rows to hold out a test set".into(),
            ));
        }
        #[allow(
            clippy::cast_possible_truncation,
            clippy::cast_sign_loss,
            clippy::cast_precision_loss
        )]
        let n_test = ((self.len() as f64) * test_size).ceil() as usize;
        let n_test = n_test.clamp(1, self.len() - 1);
        let mut order: Vec<usize> = (0..self.len()).collect();
        order.shuffle(&mut ChaCha8Rng::seed_from_u64(seed));
        let (test_idx, train_idx) = order.split_at(n_test);
        let mut train_idx = train_idx.to_vec();
        let mut test_idx = test_idx.to_vec();
        train_idx.sort_unstable();
        test_idx.sort_unstable();
        Ok((self.subset(&train_idx)?, self.subset(&test_idx)?))
    }

    /// Reads a JSON document `{ "features": [[..]], "labels": [..] }`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, EvalError> {
        let path = path.as_ref();
        let raw = fs::read(path).map_err(|err| {
            EvalError::Config(format!("reading dataset {}: {err}", path.display()))
        })?;
        let dataset: Self = serde_json::from_slice(&raw)?;
        dataset.validate()?;
        Ok(dataset)
    }

    /// Writes the dataset as JSON, creating parent directories.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), EvalError> {
        let data = serde_json::to_vec(self)?;
        crate::artifacts::fs::write_atomic(path.as_ref(), &data)
    }

    /// Seeded Gaussian-like blobs, one per class, for demos and tests.
    #[must_use]
    pub fn synthetic(count: usize, feature_dim: usize, classes: usize, seed: u64) -> Self {
        let classes = classes.max(1);
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        // Centers sit five units apart per class on every axis, plus jitter.
        #[allow(clippy::cast_precision_loss)]
        let centers: Vec<Vec<f64>> = (0..classes)
            .map(|class| {
                (0..feature_dim)
                    .map(|axis| {
                        let sign = if axis % 2 == 0 { 1.0 } else { -1.0 };
                        sign * 5.0 * class as f64 + rng.gen_range(-1.0..1.0)
                    })
                    .collect()
            })
            .collect();
        let mut features = Vec::with_capacity(count);
        let mut labels = Vec::with_capacity(count);
        for idx in 0..count {
            let class = idx % classes;
            let row = centers[class]
                .iter()
                .map(|center| center + rng.gen_range(-1.0..1.0) + rng.gen_range(-1.0..1.0))
                .collect();
            features.push(row);
            labels.push(format!("class_{class}"));
        }
        Self { features, labels }
    }

    fn validate(&self) -> Result<(), EvalError> {
        if self.features.len() != self.labels.len() {
            return Err(EvalError::Config(format!(
                "dataset has {} feature rows but {} labels",
                self.features.len(),
                self.labels.len()
            )));
        }
        let dim = self.feature_dim();
        if let Some(row) = self.features.iter().position(|row| row.len() != dim) {
            return Err(EvalError::Config(format!(
                "row {row} has {} features, expected {dim}",
                self.features[row].len()
            )));
        }
        Ok(())
    }
}

/// Per-feature standardization fitted on training rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureScaler {
    means: Vec<f64>,
    scales: Vec<f64>,
}

impl FeatureScaler {
    /// Computes means and standard deviations of `features`.
    #[must_use]
    pub fn fit(features: &[Vec<f64>]) -> Self {
        let dim = features.first().map_or(0, Vec::len);
        if features.is_empty() {
            return Self {
                means: vec![0.0; dim],
                scales: vec![1.0; dim],
            };
        }
        #[allow(clippy::cast_precision_loss)]
        let count = features.len() as f64;
        let mut means = vec![0.0; dim];
        for row in features {
            for (idx, value) in row.iter().enumerate() {
                means[idx] += value;
            }
        }
        for mean in &mut means {
            *mean /= count;
        }

        let mut scales = vec![0.0; dim];
        for row in features {
            for (idx, value) in row.iter().enumerate() {
                scales[idx] += (value - means[idx]).powi(2);
            }
        }
        for scale in &mut scales {
            *scale = (*scale / count).sqrt().max(1e-6);
        }
        Self { means, scales }
    }

    /// Standardizes one row.
    #[must_use]
    pub fn transform_row(&self, row: &[f64]) -> Vec<f64> {
        row.iter()
            .zip(self.means.iter().zip(&self.scales))
            .map(|(value, (mean, scale))| (value - mean) / scale)
            .collect()
    }

    /// Standardizes every row.
    #[must_use]
    pub fn transform(&self, features: &[Vec<f64>]) -> Vec<Vec<f64>> {
        features.iter().map(|row| self.transform_row(row)).collect()
    }
}
