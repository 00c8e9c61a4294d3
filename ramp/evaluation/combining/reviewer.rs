use crate::{error::EvalError, predictions::PredictionSet};

const ROW_SUM_TOLERANCE: f64 = 1e-6;

/// Reviewer that validates prediction sets before they are stored or scored.
#[derive(Debug, Default, Clone, Copy)]
pub struct CombinationReviewer;

impl CombinationReviewer {
    /// Ensures every row has one finite probability per label and sums to one.
    pub fn review(&self, set: &PredictionSet) -> Result<(), EvalError> {
        let width = set.labels.len();
        for (row_idx, row) in set.rows.iter().enumerate() {
            if row.probabilities.len() != width {
                return Err(EvalError::ScoringFailure(format!(
                    "row {row_idx} has {} probabilities for {width} labels",
                    row.probabilities.len()
                )));
            }
            if row.probabilities.iter().any(|value| !value.is_finite()) {
                return Err(EvalError::ScoringFailure(format!(
                    "non-finite probabilities at row {row_idx}"
                )));
            }
            let total: f64 = row.probabilities.iter().sum();
            if (total - 1.0).abs() > ROW_SUM_TOLERANCE {
                return Err(EvalError::ScoringFailure(format!(
                    "row {row_idx} sums to {total}"
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::binary_set;

    #[test]
    fn rejects_non_finite_and_unnormalized_rows() {
        let reviewer = CombinationReviewer;
        assert!(reviewer.review(&binary_set(&[[0.4, 0.6]])).is_ok());
        assert!(reviewer.review(&binary_set(&[[f64::NAN, 0.6]])).is_err());
        assert!(reviewer.review(&binary_set(&[[0.9, 0.6]])).is_err());
    }
}
