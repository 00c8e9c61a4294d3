use std::{
    collections::BTreeSet,
    path::{Path, PathBuf},
};

use indexmap::IndexMap;
use rand::{seq::SliceRandom, SeedableRng};
use rand_chacha::ChaCha8Rng;

use super::dataset::Dataset;
use crate::error::EvalError;

/// A `(fit_indices, validation_indices)` pair over the training pool.
pub type Split = (Vec<usize>, Vec<usize>);

/// Source of the train/test arrays and the cross-validation folds.
pub trait SplitProvider: Send + Sync {
    /// Training pool.
    fn train_data(&self) -> Result<Dataset, EvalError>;

    /// Held-out test set.
    fn test_data(&self) -> Result<Dataset, EvalError>;

    /// Folds over the training pool, deterministic for the same `y_train`.
    fn cv(&self, y_train: &[String]) -> Result<Vec<Split>, EvalError>;

    /// Label vocabulary every prediction set is indexed by.
    fn labels(&self) -> Result<Vec<String>, EvalError> {
        let mut labels: BTreeSet<String> = self.train_data()?.labels.into_iter().collect();
        labels.extend(self.test_data()?.labels);
        Ok(labels.into_iter().collect())
    }
}

/// Repeated stratified shuffle split.
///
/// Every split draws `test_size` of each class into the validation subset. Both index
/// lists come out ascending, so the fit indices (and their fold id) are stable for a seed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StratifiedShuffleSplit {
    /// Number of folds.
    pub n_splits: usize,
    /// Validation share per class.
    pub test_size: f64,
    /// RNG seed.
    pub seed: u64,
}

impl StratifiedShuffleSplit {
    /// Creates a splitter.
    #[must_use]
    pub const fn new(n_splits: usize, test_size: f64, seed: u64) -> Self {
        Self {
            n_splits,
            test_size,
            seed,
        }
    }

    /// Generates the folds for `labels`.
    pub fn split(&self, labels: &[String]) -> Result<Vec<Split>, EvalError> {
        if self.n_splits == 0 {
            return Err(EvalError::Config("n_splits must be at least 1".into()));
        }
        let mut by_class: IndexMap<&str, Vec<usize>> = IndexMap::new();
        for (idx, label) in labels.iter().enumerate() {
            by_class.entry(label.as_str()).or_default().push(idx);
        }
        by_class.sort_keys();

        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);
        let mut splits = Vec::with_capacity(self.n_splits);
        for _ in 0..self.n_splits {
            let mut fit = Vec::with_capacity(labels.len());
            let mut validation = Vec::new();
            for members in by_class.values() {
                let mut members = members.clone();
                members.shuffle(&mut rng);
                let n_valid = self.class_validation_size(members.len());
                validation.extend_from_slice(&members[..n_valid]);
                fit.extend_from_slice(&members[n_valid..]);
            }
            if fit.is_empty() || validation.is_empty() {
                return Err(EvalError::Config(format!(
                    "cannot split {} rows into non-empty fit and validation subsets",
                    labels.len()
                )));
            }
            fit.sort_unstable();
            validation.sort_unstable();
            splits.push((fit, validation));
        }
        Ok(splits)
    }

    fn class_validation_size(&self, members: usize) -> usize {
        if members < 2 {
            return 0;
        }
        #[allow(
            clippy::cast_possible_truncation,
            clippy::cast_sign_loss,
            clippy::cast_precision_loss
        )]
        let wanted = ((members as f64) * self.test_size).round() as usize;
        wanted.clamp(1, members - 1)
    }
}

/// Provider reading `train.json` and `test.json` from a data directory.
#[derive(Debug, Clone)]
pub struct DatasetSplitProvider {
    data_dir: PathBuf,
    splitter: StratifiedShuffleSplit,
}

impl DatasetSplitProvider {
    /// Creates a provider over `data_dir`.
    #[must_use]
    pub fn new(data_dir: impl Into<PathBuf>, splitter: StratifiedShuffleSplit) -> Self {
        Self {
            data_dir: data_dir.into(),
            splitter,
        }
    }

    /// Holds out a test set from `raw` and writes `train.json` / `test.json` into `data_dir`.
    pub fn prepare(
        raw: impl AsRef<Path>,
        data_dir: impl AsRef<Path>,
        held_out_test_size: f64,
        seed: u64,
    ) -> Result<(usize, usize), EvalError> {
        let dataset = Dataset::load(raw)?;
        let (train, test) = dataset.train_test_split(held_out_test_size, seed)?;
        let data_dir = data_dir.as_ref();
        train.save(data_dir.join("train.json"))?;
        test.save(data_dir.join("test.json"))?;
        Ok((train.len(), test.len()))
    }

    /// Data directory.
    #[must_use]
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }
}

impl SplitProvider for DatasetSplitProvider {
    fn train_data(&self) -> Result<Dataset, EvalError> {
        Dataset::load(self.data_dir.join("train.json"))
    }

    fn test_data(&self) -> Result<Dataset, EvalError> {
        Dataset::load(self.data_dir.join("test.json"))
    }

    fn cv(&self, y_train: &[String]) -> Result<Vec<Split>, EvalError> {
        self.splitter.split(y_train)
    }
}

/// Provider over datasets already in memory, optionally with fixed folds.
#[derive(Debug, Clone)]
pub struct InMemorySplitProvider {
    train: Dataset,
    test: Dataset,
    splitter: StratifiedShuffleSplit,
    fixed: Option<Vec<Split>>,
}

impl InMemorySplitProvider {
    /// Creates a provider that splits with `splitter`.
    #[must_use]
    pub const fn new(train: Dataset, test: Dataset, splitter: StratifiedShuffleSplit) -> Self {
        Self {
            train,
            test,
            splitter,
            fixed: None,
        }
    }

    /// Replaces generated folds with explicit ones.
    #[must_use]
    pub fn with_splits(mut self, splits: Vec<Split>) -> Self {
        self.fixed = Some(splits);
        self
    }
}

impl SplitProvider for InMemorySplitProvider {
    fn train_data(&self) -> Result<Dataset, EvalError> {
        Ok(self.train.clone())
    }

    fn test_data(&self) -> Result<Dataset, EvalError> {
        Ok(self.test.clone())
    }

    fn cv(&self, y_train: &[String]) -> Result<Vec<Split>, EvalError> {
        match &self.fixed {
            Some(splits) => Ok(splits.clone()),
            None => self.splitter.split(y_train),
        }
    }
}
