//! Classifier capability and the registry resolving model references to it.

/// Nearest-centroid classifier.
pub mod centroid;
/// Class-prior classifier.
pub mod majority;
/// Multinomial logistic regression.
pub mod softmax;

use std::{fmt, sync::Arc};

use indexmap::IndexMap;
use parking_lot::RwLock;

use crate::{error::EvalError, predictions::PredictionSet};

pub use centroid::NearestCentroid;
pub use majority::MajorityClass;
pub use softmax::SoftmaxRegression;

/// Trainable model family, one per submission reference.
pub trait Classifier: Send + Sync {
    /// Fits on the given rows.
    fn train(&self, features: &[Vec<f64>], labels: &[String])
        -> anyhow::Result<Box<dyn TrainedModel>>;

    /// Restores a model written by [`TrainedModel::to_bytes`].
    fn load(&self, bytes: &[u8]) -> anyhow::Result<Box<dyn TrainedModel>>;
}

/// Fitted model able to predict and serialize itself.
pub trait TrainedModel: Send + Sync {
    /// Predicts every row, with probabilities indexed by `labels`.
    fn predict(&self, features: &[Vec<f64>], labels: &[String]) -> anyhow::Result<PredictionSet>;

    /// Serialized form stored as the `model` artifact.
    fn to_bytes(&self) -> anyhow::Result<Vec<u8>>;
}

/// Registry mapping model references to classifiers.
#[derive(Clone, Default)]
pub struct ModelRegistry {
    inner: Arc<RwLock<IndexMap<String, Arc<dyn Classifier>>>>,
}

impl fmt::Debug for ModelRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelRegistry")
            .field("references", &self.references())
            .finish()
    }
}

impl ModelRegistry {
    /// Registry preloaded with `majority`, `nearest_centroid` and `softmax_regression`.
    #[must_use]
    pub fn with_builtin() -> Self {
        let registry = Self::default();
        registry.register("majority", Arc::new(MajorityClass));
        registry.register("nearest_centroid", Arc::new(NearestCentroid));
        registry.register("softmax_regression", Arc::new(SoftmaxRegression::default()));
        registry
    }

    /// Registers or replaces a classifier.
    pub fn register(&self, reference: impl Into<String>, classifier: Arc<dyn Classifier>) {
        self.inner.write().insert(reference.into(), classifier);
    }

    /// Classifier registered under `reference`.
    pub fn resolve(&self, reference: &str) -> Result<Arc<dyn Classifier>, EvalError> {
        self.inner
            .read()
            .get(reference)
            .cloned()
            .ok_or_else(|| EvalError::UnknownPlugin(reference.to_string()))
    }

    /// Registered references in registration order.
    #[must_use]
    pub fn references(&self) -> Vec<String> {
        self.inner.read().keys().cloned().collect()
    }
}

/// Numerically stable softmax; `-inf` entries get zero mass.
///
/// All-`-inf` rows become uniform; `+inf` entries share the whole mass.
#[must_use]
pub fn softmax(scores: &[f64]) -> Vec<f64> {
    let max = scores.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if max.is_infinite() && max.is_sign_negative() {
        #[allow(clippy::cast_precision_loss)]
        let uniform = 1.0 / scores.len().max(1) as f64;
        return vec![uniform; scores.len()];
    }
    if max.is_infinite() {
        let is_top = |score: f64| score.is_infinite() && score.is_sign_positive();
        #[allow(clippy::cast_precision_loss)]
        let share = 1.0 / scores.iter().filter(|&&score| is_top(score)).count() as f64;
        return scores
            .iter()
            .map(|&score| if is_top(score) { share } else { 0.0 })
            .collect();
    }
    let exps: Vec<f64> = scores.iter().map(|score| (score - max).exp()).collect();
    let total: f64 = exps.iter().sum();
    exps.into_iter().map(|value| value / total).collect()
}
