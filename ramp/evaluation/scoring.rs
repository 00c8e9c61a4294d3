use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::{error::EvalError, predictions::PredictionSet};

const PROBA_CLIP: f64 = 1e-15;

/// Pure scoring function with a fixed comparison direction.
pub trait Scorer: Send + Sync {
    /// Column name shown on leaderboards.
    fn name(&self) -> &'static str;

    /// Whether larger scores are preferred.
    fn higher_the_better(&self) -> bool;

    /// Scores `predictions` against `ground_truth`.
    fn score(&self, ground_truth: &[String], predictions: &PredictionSet)
        -> Result<f64, EvalError>;
}

/// Fraction of rows whose predicted label matches.
#[derive(Debug, Clone, Copy, Default)]
pub struct Accuracy;

/// Fraction of rows whose predicted label differs.
#[derive(Debug, Clone, Copy, Default)]
pub struct ErrorRate;

/// Mean negative log-probability of the true label.
#[derive(Debug, Clone, Copy, Default)]
pub struct NegativeLogLikelihood;

impl Scorer for Accuracy {
    fn name(&self) -> &'static str {
        "accuracy"
    }

    fn higher_the_better(&self) -> bool {
        true
    }

    fn score(&self, ground_truth: &[String], predictions: &PredictionSet) -> Result<f64, EvalError> {
        let hits = label_hits(ground_truth, predictions)?;
        Ok(ratio(hits, ground_truth.len()))
    }
}

impl Scorer for ErrorRate {
    fn name(&self) -> &'static str {
        "error"
    }

    fn higher_the_better(&self) -> bool {
        false
    }

    fn score(&self, ground_truth: &[String], predictions: &PredictionSet) -> Result<f64, EvalError> {
        let hits = label_hits(ground_truth, predictions)?;
        Ok(ratio(ground_truth.len() - hits, ground_truth.len()))
    }
}

impl Scorer for NegativeLogLikelihood {
    fn name(&self) -> &'static str {
        "nll"
    }

    fn higher_the_better(&self) -> bool {
        false
    }

    fn score(&self, ground_truth: &[String], predictions: &PredictionSet) -> Result<f64, EvalError> {
        check_aligned(ground_truth, predictions)?;
        let mut total = 0.0;
        for (truth, row) in ground_truth.iter().zip(&predictions.rows) {
            let class = label_position(predictions, truth)?;
            let proba = row.probabilities[class].clamp(PROBA_CLIP, 1.0 - PROBA_CLIP);
            total -= proba.ln();
        }
        #[allow(clippy::cast_precision_loss)]
        Ok(total / ground_truth.len() as f64)
    }
}

/// Scorer selection in configuration files.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreKind {
    /// [`Accuracy`].
    #[default]
    Accuracy,
    /// [`ErrorRate`].
    ErrorRate,
    /// [`NegativeLogLikelihood`].
    LogLoss,
}

impl ScoreKind {
    /// Instantiates the scorer.
    #[must_use]
    pub fn scorer(self) -> Arc<dyn Scorer> {
        match self {
            Self::Accuracy => Arc::new(Accuracy),
            Self::ErrorRate => Arc::new(ErrorRate),
            Self::LogLoss => Arc::new(NegativeLogLikelihood),
        }
    }
}

/// Whether `candidate` beats `current` in the scorer's direction.
#[must_use]
pub fn is_better(candidate: f64, current: f64, higher_the_better: bool) -> bool {
    if higher_the_better {
        candidate > current
    } else {
        candidate < current
    }
}

/// Whether `candidate` beats `current` by strictly more than `eps`.
#[must_use]
pub fn improves_by(candidate: f64, current: f64, eps: f64, higher_the_better: bool) -> bool {
    if higher_the_better {
        candidate > current + eps
    } else {
        candidate < current - eps
    }
}

fn check_aligned(ground_truth: &[String], predictions: &PredictionSet) -> Result<(), EvalError> {
    if ground_truth.is_empty() {
        return Err(EvalError::ScoringFailure("empty ground truth".into()));
    }
    if ground_truth.len() != predictions.len() {
        return Err(EvalError::ScoringFailure(format!(
            "{} predictions for {} ground-truth labels",
            predictions.len(),
            ground_truth.len()
        )));
    }
    Ok(())
}

fn label_position(predictions: &PredictionSet, truth: &str) -> Result<usize, EvalError> {
    predictions.label_index(truth).ok_or_else(|| {
        EvalError::ScoringFailure(format!("ground-truth label {truth} missing from predictions"))
    })
}

fn label_hits(ground_truth: &[String], predictions: &PredictionSet) -> Result<usize, EvalError> {
    check_aligned(ground_truth, predictions)?;
    let mut hits = 0;
    for (truth, predicted) in ground_truth.iter().zip(predictions.predicted_labels()) {
        label_position(predictions, truth)?;
        if truth == predicted {
            hits += 1;
        }
    }
    Ok(hits)
}

#[allow(clippy::cast_precision_loss)]
fn ratio(part: usize, whole: usize) -> f64 {
    part as f64 / whole as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(rows: Vec<Vec<f64>>) -> PredictionSet {
        PredictionSet::from_probabilities(vec!["a".into(), "b".into()], rows).unwrap()
    }

    fn truth(labels: &[&str]) -> Vec<String> {
        labels.iter().map(|label| (*label).to_string()).collect()
    }

    #[test]
    fn accuracy_and_error_are_complementary() {
        let predictions = set(vec![vec![0.9, 0.1], vec![0.2, 0.8], vec![0.7, 0.3], vec![0.6, 0.4]]);
        let gt = truth(&["a", "b", "b", "a"]);
        assert!((Accuracy.score(&gt, &predictions).unwrap() - 0.75).abs() < 1e-12);
        assert!((ErrorRate.score(&gt, &predictions).unwrap() - 0.25).abs() < 1e-12);
        assert!(Accuracy.higher_the_better());
        assert!(!ErrorRate.higher_the_better());
    }

    #[test]
    fn log_loss_uses_true_class_probability() {
        let predictions = set(vec![vec![0.5, 0.5], vec![0.0, 1.0]]);
        let score = NegativeLogLikelihood
            .score(&truth(&["a", "b"]), &predictions)
            .unwrap();
        assert!((score - (2.0_f64).ln() / 2.0).abs() < 1e-9);
    }

    #[test]
    fn mismatches_are_scoring_failures() {
        let predictions = set(vec![vec![1.0, 0.0]]);
        assert!(matches!(
            Accuracy.score(&truth(&["a", "b"]), &predictions),
            Err(EvalError::ScoringFailure(_))
        ));
        assert!(matches!(
            Accuracy.score(&truth(&["z"]), &predictions),
            Err(EvalError::ScoringFailure(_))
        ));
    }

    #[test]
    fn direction_aware_comparisons() {
        assert!(is_better(0.9, 0.8, true));
        assert!(is_better(0.1, 0.2, false));
        assert!(improves_by(0.92, 0.90, 0.01, true));
        assert!(!improves_by(0.905, 0.90, 0.01, true));
        assert!(improves_by(0.10, 0.20, 0.05, false));
        assert_eq!(ScoreKind::LogLoss.scorer().name(), "nll");
    }
}
