use anyhow::{bail, Context};
use ndarray::{Array2, Axis};
use serde::{Deserialize, Serialize};

use super::{softmax, Classifier, TrainedModel};
use crate::{data::FeatureScaler, predictions::PredictionSet};

/// Multinomial logistic regression fitted with full-batch gradient descent.
#[derive(Debug, Clone, Copy)]
pub struct SoftmaxRegression {
    /// Step size.
    pub learning_rate: f64,
    /// Passes over the fit rows.
    pub epochs: usize,
    /// L2 penalty on the weights (bias excluded).
    pub l2: f64,
}

impl Default for SoftmaxRegression {
    fn default() -> Self {
        Self {
            learning_rate: 0.5,
            epochs: 200,
            l2: 1e-3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SoftmaxWeights {
    scaler: FeatureScaler,
    classes: Vec<String>,
    /// `(features + 1) x classes`, bias in the last row.
    weights: Array2<f64>,
}

fn design_matrix(scaler: &FeatureScaler, features: &[Vec<f64>], dim: usize) -> Array2<f64> {
    let mut design = Array2::<f64>::ones((features.len(), dim + 1));
    for (row_idx, row) in features.iter().enumerate() {
        for (col, value) in scaler.transform_row(row).into_iter().enumerate().take(dim) {
            design[[row_idx, col]] = value;
        }
    }
    design
}

fn row_softmax(logits: &mut Array2<f64>) {
    for mut row in logits.axis_iter_mut(Axis(0)) {
        let probas = softmax(&row.to_vec());
        for (cell, proba) in row.iter_mut().zip(probas) {
            *cell = proba;
        }
    }
}

impl Classifier for SoftmaxRegression {
    fn train(
        &self,
        features: &[Vec<f64>],
        labels: &[String],
    ) -> anyhow::Result<Box<dyn TrainedModel>> {
        if features.is_empty() || features.len() != labels.len() {
            bail!(
                "softmax regression needs aligned rows, got {} rows and {} labels",
                features.len(),
                labels.len()
            );
        }
        let mut classes: Vec<String> = labels.to_vec();
        classes.sort();
        classes.dedup();

        let dim = features[0].len();
        let scaler = FeatureScaler::fit(features);
        let design = design_matrix(&scaler, features, dim);
        let mut targets = Array2::<f64>::zeros((labels.len(), classes.len()));
        for (row, label) in labels.iter().enumerate() {
            if let Ok(class) = classes.binary_search(label) {
                targets[[row, class]] = 1.0;
            }
        }

        #[allow(clippy::cast_precision_loss)]
        let n = labels.len() as f64;
        let mut weights = Array2::<f64>::zeros((dim + 1, classes.len()));
        for _ in 0..self.epochs {
            let mut probas = design.dot(&weights);
            row_softmax(&mut probas);
            let residual = probas - &targets;
            let mut grad = design.t().dot(&residual) / n;
            let mut penalty = weights.clone() * self.l2;
            penalty.row_mut(dim).fill(0.0);
            grad += &penalty;
            weights.scaled_add(-self.learning_rate, &grad);
        }
        if weights.iter().any(|value| !value.is_finite()) {
            bail!("softmax regression diverged");
        }
        Ok(Box::new(SoftmaxWeights {
            scaler,
            classes,
            weights,
        }))
    }

    fn load(&self, bytes: &[u8]) -> anyhow::Result<Box<dyn TrainedModel>> {
        let model: SoftmaxWeights =
            serde_json::from_slice(bytes).context("decoding softmax weights")?;
        Ok(Box::new(model))
    }
}

impl TrainedModel for SoftmaxWeights {
    fn predict(&self, features: &[Vec<f64>], labels: &[String]) -> anyhow::Result<PredictionSet> {
        let dim = self.weights.nrows() - 1;
        let mut probas = design_matrix(&self.scaler, features, dim).dot(&self.weights);
        row_softmax(&mut probas);
        let rows = probas
            .axis_iter(Axis(0))
            .map(|row| {
                labels
                    .iter()
                    .map(|label| {
                        self.classes
                            .binary_search(label)
                            .map_or(0.0, |class| row[class])
                    })
                    .collect()
            })
            .collect();
        Ok(PredictionSet::from_probabilities(labels.to_vec(), rows)?)
    }

    fn to_bytes(&self) -> anyhow::Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }
}
