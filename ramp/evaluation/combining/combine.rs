use ndarray::Array2;

use super::reviewer::CombinationReviewer;
use crate::{error::EvalError, predictions::PredictionSet};

/// Averages the probabilities of `sets[i]` for every `i` in `selection`.
///
/// `selection` is a multiset: an index listed twice weighs twice. The label of each
/// combined row is the argmax of the averaged probabilities.
pub fn combine(sets: &[PredictionSet], selection: &[usize]) -> Result<PredictionSet, EvalError> {
    let Some(&first) = selection.first() else {
        return Err(EvalError::ScoringFailure(
            "cannot combine an empty selection".into(),
        ));
    };
    let reference = sets.get(first).ok_or_else(|| out_of_range(first, sets.len()))?;
    let shape = (reference.len(), reference.labels.len());
    let mut total = Array2::<f64>::zeros(shape);
    for &idx in selection {
        let set = sets.get(idx).ok_or_else(|| out_of_range(idx, sets.len()))?;
        if set.labels != reference.labels || set.len() != reference.len() {
            return Err(EvalError::ScoringFailure(format!(
                "prediction set {idx} is not aligned with set {first}"
            )));
        }
        total += &to_matrix(set, shape)?;
    }
    #[allow(clippy::cast_precision_loss)]
    let averaged = total / selection.len() as f64;
    let rows = averaged.outer_iter().map(|row| row.to_vec()).collect();
    let combined = PredictionSet::from_probabilities(reference.labels.clone(), rows)?;
    CombinationReviewer.review(&combined)?;
    Ok(combined)
}

/// Averages every set with weight one.
pub fn combine_all(sets: &[PredictionSet]) -> Result<PredictionSet, EvalError> {
    let selection: Vec<usize> = (0..sets.len()).collect();
    combine(sets, &selection)
}

fn to_matrix(set: &PredictionSet, shape: (usize, usize)) -> Result<Array2<f64>, EvalError> {
    let flat: Vec<f64> = set
        .rows
        .iter()
        .flat_map(|row| row.probabilities.iter().copied())
        .collect();
    Array2::from_shape_vec(shape, flat)
        .map_err(|err| EvalError::ScoringFailure(format!("ragged probability rows: {err}")))
}

fn out_of_range(idx: usize, len: usize) -> EvalError {
    EvalError::ScoringFailure(format!("selection index {idx} out of range for {len} sets"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::binary_set;

    #[test]
    fn repeated_selection_weighs_more() {
        let sets = vec![
            binary_set(&[[0.9, 0.1], [0.2, 0.8]]),
            binary_set(&[[0.3, 0.7], [0.6, 0.4]]),
        ];
        let even = combine(&sets, &[0, 1]).unwrap();
        assert!((even.rows[0].probabilities[0] - 0.6).abs() < 1e-12);
        assert_eq!(even.rows[0].label, "a");

        let weighted = combine(&sets, &[1, 1, 0]).unwrap();
        assert!((weighted.rows[0].probabilities[0] - 0.5).abs() < 1e-12);
        assert!((weighted.rows[1].probabilities[1] - 0.533_333_333_333).abs() < 1e-9);
        assert_eq!(weighted.rows[1].label, "b");
    }

    #[test]
    fn combining_one_set_is_identity() {
        let sets = vec![binary_set(&[[0.25, 0.75]])];
        assert_eq!(combine_all(&sets).unwrap(), sets[0]);
    }

    #[test]
    fn rejects_empty_or_misaligned_input() {
        let sets = vec![binary_set(&[[0.5, 0.5]]), binary_set(&[[0.5, 0.5], [0.1, 0.9]])];
        assert!(matches!(combine(&sets, &[]), Err(EvalError::ScoringFailure(_))));
        assert!(matches!(combine(&sets, &[0, 1]), Err(EvalError::ScoringFailure(_))));
        assert!(matches!(combine(&sets, &[5]), Err(EvalError::ScoringFailure(_))));
    }
}
