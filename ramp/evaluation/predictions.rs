use serde::{Deserialize, Serialize};

use crate::error::EvalError;

/// Predicted label and class-probability vector for one instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    /// Label with the highest probability.
    pub label: String,
    /// Probabilities aligned with [`PredictionSet::labels`].
    pub probabilities: Vec<f64>,
}

/// Ordered predictions for one (model, fold, split).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionSet {
    /// Label vocabulary indexing every probability vector.
    pub labels: Vec<String>,
    /// One row per instance, aligned with the scored index subset.
    pub rows: Vec<Prediction>,
}

impl PredictionSet {
    /// Builds a set from raw probability rows, choosing each row's argmax label.
    pub fn from_probabilities(
        labels: Vec<String>,
        probabilities: Vec<Vec<f64>>,
    ) -> Result<Self, EvalError> {
        if labels.is_empty() {
            return Err(EvalError::ScoringFailure(
                "prediction set needs at least one label".into(),
            ));
        }
        let mut rows = Vec::with_capacity(probabilities.len());
        for (row, probas) in probabilities.into_iter().enumerate() {
            if probas.len() != labels.len() {
                return Err(EvalError::ScoringFailure(format!(
                    "row {row} has {} probabilities for {} labels",
                    probas.len(),
                    labels.len()
                )));
            }
            let label = labels[argmax(&probas)].clone();
            rows.push(Prediction {
                label,
                probabilities: probas,
            });
        }
        Ok(Self { labels, rows })
    }

    /// Number of instances.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// True when there are no instances.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Predicted labels in instance order.
    pub fn predicted_labels(&self) -> impl Iterator<Item = &str> {
        self.rows.iter().map(|row| row.label.as_str())
    }

    /// Position of `label` in the vocabulary.
    #[must_use]
    pub fn label_index(&self, label: &str) -> Option<usize> {
        self.labels.iter().position(|candidate| candidate == label)
    }

    /// JSON encoding used by the artifact store.
    pub fn to_bytes(&self) -> Result<Vec<u8>, EvalError> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Decodes a stored set.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, EvalError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// Index of the first maximum; NaNs never win.
#[must_use]
pub fn argmax(values: &[f64]) -> usize {
    let mut best = 0;
    for (idx, value) in values.iter().enumerate() {
        if *value > values[best] || values[best].is_nan() {
            best = idx;
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels() -> Vec<String> {
        vec!["0.0".into(), "1.0".into()]
    }

    #[test]
    fn labels_follow_argmax() {
        let set =
            PredictionSet::from_probabilities(labels(), vec![vec![0.2, 0.8], vec![0.6, 0.4]])
                .unwrap();
        let predicted: Vec<_> = set.predicted_labels().collect();
        assert_eq!(predicted, vec!["1.0", "0.0"]);
    }

    #[test]
    fn ties_pick_first_label() {
        assert_eq!(argmax(&[0.5, 0.5]), 0);
        assert_eq!(argmax(&[f64::NAN, 0.1]), 1);
    }

    #[test]
    fn rejects_misaligned_rows() {
        let err = PredictionSet::from_probabilities(labels(), vec![vec![1.0]]).unwrap_err();
        assert!(matches!(err, EvalError::ScoringFailure(_)));
    }

    #[test]
    fn decodes_stored_bytes() {
        let set = PredictionSet::from_probabilities(labels(), vec![vec![0.3, 0.7]]).unwrap();
        let decoded = PredictionSet::from_bytes(&set.to_bytes().unwrap()).unwrap();
        assert_eq!(decoded.label_index("1.0"), Some(1));
        assert_eq!(decoded.len(), 1);
    }
}
