//! Shared fixtures for unit tests.

use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    thread,
    time::Duration,
};

use anyhow::bail;

use crate::{
    data::{Dataset, InMemorySplitProvider, StratifiedShuffleSplit},
    plugins::{Classifier, MajorityClass, TrainedModel},
    predictions::PredictionSet,
};

/// 24 training rows with alternating labels and three folds of distinct fit sizes.
pub fn fixture_provider() -> InMemorySplitProvider {
    let train = Dataset::synthetic(24, 2, 2, 3);
    let test = Dataset::synthetic(10, 2, 2, 4);
    InMemorySplitProvider::new(train, test, StratifiedShuffleSplit::new(3, 0.2, 57)).with_splits(
        vec![
            ((0..16).collect(), (16..24).collect()),
            ((0..14).collect(), (14..24).collect()),
            ((0..18).collect(), (18..24).collect()),
        ],
    )
}

/// Constant-probability model: every row gets `[0.25, 0.75, 0, ...]`.
struct Constant;

impl TrainedModel for Constant {
    fn predict(&self, features: &[Vec<f64>], labels: &[String]) -> anyhow::Result<PredictionSet> {
        let row: Vec<f64> = (0..labels.len())
            .map(|idx| match idx {
                0 => 0.25,
                1 => 0.75,
                _ => 0.0,
            })
            .collect();
        Ok(PredictionSet::from_probabilities(
            labels.to_vec(),
            vec![row; features.len()],
        )?)
    }

    fn to_bytes(&self) -> anyhow::Result<Vec<u8>> {
        Ok(b"constant".to_vec())
    }
}

/// Counts `train` calls; models round-trip through bytes.
#[derive(Debug, Default)]
pub struct CountingClassifier {
    calls: AtomicUsize,
}

impl CountingClassifier {
    /// Number of fits so far.
    pub fn train_calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Classifier for CountingClassifier {
    fn train(&self, _: &[Vec<f64>], _: &[String]) -> anyhow::Result<Box<dyn TrainedModel>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(Constant))
    }

    fn load(&self, bytes: &[u8]) -> anyhow::Result<Box<dyn TrainedModel>> {
        if bytes != b"constant" {
            bail!("unexpected blob");
        }
        Ok(Box::new(Constant))
    }
}

/// Fails when asked to fit a subset of a given size, else behaves like `majority`.
#[derive(Debug)]
pub struct FailingClassifier {
    fit_size: Option<usize>,
}

impl FailingClassifier {
    /// Fails only on fit subsets of `rows` rows.
    pub const fn on_fit_size(rows: usize) -> Self {
        Self {
            fit_size: Some(rows),
        }
    }

    /// Fails on every fold.
    pub const fn always() -> Self {
        Self { fit_size: None }
    }
}

impl Classifier for FailingClassifier {
    fn train(
        &self,
        features: &[Vec<f64>],
        labels: &[String],
    ) -> anyhow::Result<Box<dyn TrainedModel>> {
        if self.fit_size.map_or(true, |rows| rows == labels.len()) {
            bail!("Traceback (most recent call last)\n---> scripted failure");
        }
        MajorityClass.train(features, labels)
    }

    fn load(&self, bytes: &[u8]) -> anyhow::Result<Box<dyn TrainedModel>> {
        MajorityClass.load(bytes)
    }
}

/// Trains fine but cannot be serialized.
#[derive(Debug, Default)]
pub struct UnserializableClassifier {
    calls: AtomicUsize,
}

impl UnserializableClassifier {
    /// Number of fits so far.
    pub fn train_calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

struct Opaque;

impl TrainedModel for Opaque {
    fn predict(&self, features: &[Vec<f64>], labels: &[String]) -> anyhow::Result<PredictionSet> {
        Constant.predict(features, labels)
    }

    fn to_bytes(&self) -> anyhow::Result<Vec<u8>> {
        bail!("model holds a live handle")
    }
}

impl Classifier for UnserializableClassifier {
    fn train(&self, _: &[Vec<f64>], _: &[String]) -> anyhow::Result<Box<dyn TrainedModel>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(Opaque))
    }

    fn load(&self, _: &[u8]) -> anyhow::Result<Box<dyn TrainedModel>> {
        bail!("nothing was ever stored")
    }
}

/// Predictions a leaderboard could not score.
#[derive(Debug, Clone, Copy)]
pub enum Malformed {
    /// Rows summing to more than one.
    Unnormalized,
    /// Probabilities over a vocabulary other than the requested one.
    ForeignLabels,
}

impl TrainedModel for Malformed {
    fn predict(&self, features: &[Vec<f64>], labels: &[String]) -> anyhow::Result<PredictionSet> {
        let (labels, row) = match self {
            Self::Unnormalized => (labels.to_vec(), vec![0.7, 0.6]),
            Self::ForeignLabels => (
                vec![labels[labels.len() - 1].clone(), "other".to_string()],
                vec![0.5, 0.5],
            ),
        };
        Ok(PredictionSet::from_probabilities(
            labels,
            vec![row; features.len()],
        )?)
    }

    fn to_bytes(&self) -> anyhow::Result<Vec<u8>> {
        Ok(format!("{self:?}").into_bytes())
    }
}

impl Classifier for Malformed {
    fn train(&self, _: &[Vec<f64>], _: &[String]) -> anyhow::Result<Box<dyn TrainedModel>> {
        Ok(Box::new(*self))
    }

    fn load(&self, _: &[u8]) -> anyhow::Result<Box<dyn TrainedModel>> {
        Ok(Box::new(*self))
    }
}

/// Counts fits running at the same time across every classifier sharing it.
#[derive(Debug, Default)]
pub struct FitGauge {
    active: AtomicUsize,
    peak: AtomicUsize,
}

impl FitGauge {
    /// Largest number of fits seen running together.
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

/// Sleeps through every fit, failing at once on one fit size.
#[derive(Debug)]
pub struct SlowClassifier {
    gauge: Arc<FitGauge>,
    failing_fit_size: Option<usize>,
}

impl SlowClassifier {
    /// Healthy on every fold.
    pub const fn healthy(gauge: Arc<FitGauge>) -> Self {
        Self {
            gauge,
            failing_fit_size: None,
        }
    }

    /// Fails on fit subsets of `rows` rows.
    pub const fn failing_on(gauge: Arc<FitGauge>, rows: usize) -> Self {
        Self {
            gauge,
            failing_fit_size: Some(rows),
        }
    }
}

impl Classifier for SlowClassifier {
    fn train(&self, _: &[Vec<f64>], labels: &[String]) -> anyhow::Result<Box<dyn TrainedModel>> {
        if self.failing_fit_size == Some(labels.len()) {
            bail!("scripted failure");
        }
        let now = self.gauge.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.gauge.peak.fetch_max(now, Ordering::SeqCst);
        thread::sleep(Duration::from_millis(150));
        self.gauge.active.fetch_sub(1, Ordering::SeqCst);
        Ok(Box::new(Constant))
    }

    fn load(&self, _: &[u8]) -> anyhow::Result<Box<dyn TrainedModel>> {
        Ok(Box::new(Constant))
    }
}

/// Prediction set over labels `a`/`b` from raw probability rows.
pub fn binary_set(rows: &[[f64; 2]]) -> PredictionSet {
    PredictionSet::from_probabilities(
        vec!["a".into(), "b".into()],
        rows.iter().map(|row| row.to_vec()).collect(),
    )
    .unwrap_or_else(|err| panic!("bad fixture: {err}"))
}

/// Owned labels.
pub fn labels(values: &[&str]) -> Vec<String> {
    values.iter().map(|value| (*value).to_string()).collect()
}
