use std::cmp::Ordering;

use serde::Serialize;

use super::combine::combine;
use crate::{
    error::EvalError,
    predictions::PredictionSet,
    scoring::{improves_by, is_better, Scorer},
};

/// Tuning of the forward selection.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GreedyConfig {
    /// Required improvement, divided by the ground-truth length.
    pub tolerance: f64,
    /// Optional cap on accepted additions.
    pub max_iterations: Option<usize>,
}

impl Default for GreedyConfig {
    fn default() -> Self {
        Self {
            tolerance: 0.01,
            max_iterations: None,
        }
    }
}

impl GreedyConfig {
    /// Improvement threshold for a ground truth of `len` labels.
    #[must_use]
    pub fn eps(&self, len: usize) -> f64 {
        #[allow(clippy::cast_precision_loss)]
        let len = len.max(1) as f64;
        self.tolerance / len
    }
}

/// Outcome of greedy selection on one fold.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Selection {
    /// Accepted candidates in order, with repeats.
    pub selected: Vec<usize>,
    /// Candidate with the best single-model score.
    pub best_single: usize,
    /// Score of every candidate alone.
    pub single_scores: Vec<f64>,
    /// Combined score after each acceptance, starting with the best single score.
    pub trajectory: Vec<f64>,
}

impl Selection {
    /// Combined score of the final ensemble.
    #[must_use]
    pub fn final_score(&self) -> f64 {
        self.trajectory.last().copied().unwrap_or(f64::NAN)
    }
}

/// Caruana-style forward selection with replacement.
pub struct GreedyCombiner<'a> {
    scorer: &'a dyn Scorer,
    config: GreedyConfig,
}

impl<'a> GreedyCombiner<'a> {
    /// Creates a combiner scoring with `scorer`.
    #[must_use]
    pub const fn new(scorer: &'a dyn Scorer, config: GreedyConfig) -> Self {
        Self { scorer, config }
    }

    /// Selects from `candidates`, validated against `ground_truth`.
    pub fn select(
        &self,
        candidates: &[PredictionSet],
        ground_truth: &[String],
    ) -> Result<Selection, EvalError> {
        let eps = self.config.eps(ground_truth.len());
        self.select_by(candidates.len(), eps, |selection| {
            let combined = combine(candidates, selection)?;
            self.scorer.score(ground_truth, &combined)
        })
    }

    /// Selection over `universe` candidates, scoring each multiset with `evaluate`.
    ///
    /// The combined prediction is rebuilt from the full multiset on every evaluation.
    pub fn select_by<F>(
        &self,
        universe: usize,
        eps: f64,
        mut evaluate: F,
    ) -> Result<Selection, EvalError>
    where
        F: FnMut(&[usize]) -> Result<f64, EvalError>,
    {
        if universe == 0 {
            return Err(EvalError::ScoringFailure(
                "greedy selection needs at least one candidate".into(),
            ));
        }
        let higher = self.scorer.higher_the_better();
        let single_scores = (0..universe)
            .map(|idx| evaluate(&[idx]))
            .collect::<Result<Vec<_>, _>>()?;
        let best_single = best_index(&single_scores, higher);

        let mut selected = vec![best_single];
        let mut current = single_scores[best_single];
        let mut trajectory = vec![current];
        let mut trial = selected.clone();
        while self
            .config
            .max_iterations
            .map_or(true, |cap| selected.len() <= cap)
        {
            let mut scores = Vec::with_capacity(universe);
            for candidate in 0..universe {
                trial.clear();
                trial.extend_from_slice(&selected);
                trial.push(candidate);
                scores.push(evaluate(&trial)?);
            }
            let best = best_index(&scores, higher);
            if !improves_by(scores[best], current, eps, higher) {
                break;
            }
            selected.push(best);
            current = scores[best];
            trajectory.push(current);
        }
        Ok(Selection {
            selected,
            best_single,
            single_scores,
            trajectory,
        })
    }
}

/// First index holding the best score in the scorer's direction.
fn best_index(scores: &[f64], higher_the_better: bool) -> usize {
    let mut best = 0;
    for (idx, score) in scores.iter().enumerate().skip(1) {
        if is_better(*score, scores[best], higher_the_better)
            || (scores[best].is_nan() && !score.is_nan())
        {
            best = idx;
        }
    }
    best
}

/// Multiplicity of each candidate in `selected`.
#[must_use]
pub fn histogram(selected: &[usize], universe: usize) -> Vec<usize> {
    let mut counts = vec![0; universe];
    for &idx in selected {
        if let Some(count) = counts.get_mut(idx) {
            *count += 1;
        }
    }
    counts
}

/// Sorts indices by count descending, ties in index order.
#[must_use]
pub fn rank_by_count(counts: &[usize]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..counts.len()).collect();
    order.sort_by(|a, b| match counts[*b].cmp(&counts[*a]) {
        Ordering::Equal => a.cmp(b),
        other => other,
    });
    order
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        scoring::{Accuracy, ErrorRate},
        testing::{binary_set, labels},
    };

    const A: usize = 0;
    const B: usize = 1;
    const C: usize = 2;

    fn scripted(selection: &[usize]) -> Result<f64, EvalError> {
        let mut sorted = selection.to_vec();
        sorted.sort_unstable();
        Ok(match sorted.as_slice() {
            [A] | [A, A] => 0.90,
            [B] => 0.80,
            [C] => 0.85,
            [A, B] => 0.88,
            [A, C] => 0.92,
            _ => 0.91,
        })
    }

    #[test]
    fn three_model_scenario_selects_a_then_c() {
        let combiner = GreedyCombiner::new(&Accuracy, GreedyConfig::default());
        let eps = GreedyConfig::default().eps(100);
        let selection = combiner.select_by(3, eps, scripted).unwrap();
        assert_eq!(selection.best_single, A);
        assert_eq!(selection.selected, vec![A, C]);
        assert_eq!(histogram(&selection.selected, 3), vec![1, 0, 1]);
        assert!((selection.final_score() - 0.92).abs() < 1e-12);
    }

    #[test]
    fn accepted_scores_never_get_worse() {
        let combiner = GreedyCombiner::new(&ErrorRate, GreedyConfig::default());
        let mut calls = 0usize;
        let selection = combiner
            .select_by(4, 0.001, |selection| {
                calls += 1;
                // Error shrinks with ensemble size until it plateaus at 0.1.
                #[allow(clippy::cast_precision_loss)]
                let size = selection.len() as f64;
                Ok((0.5 / size).max(0.1) + if selection[0] == 2 { 0.0 } else { 0.01 })
            })
            .unwrap();
        assert_eq!(selection.best_single, 2);
        assert!(selection
            .trajectory
            .windows(2)
            .all(|pair| pair[1] < pair[0] - 0.001));
        assert!(selection.selected.len() <= 4 * 3);
        assert!(calls > 4);
    }

    #[test]
    fn iteration_cap_bounds_the_ensemble() {
        let config = GreedyConfig {
            tolerance: 0.0,
            max_iterations: Some(2),
        };
        let combiner = GreedyCombiner::new(&Accuracy, config);
        #[allow(clippy::cast_precision_loss)]
        let selection = combiner
            .select_by(2, 0.0, |selection| Ok(selection.len() as f64))
            .unwrap();
        assert_eq!(selection.selected.len(), 3);
    }

    #[test]
    fn selects_from_real_predictions() {
        let gt = labels(&["a", "b", "a", "b"]);
        let candidates = vec![
            binary_set(&[[0.9, 0.1], [0.6, 0.4], [0.8, 0.2], [0.4, 0.6]]),
            binary_set(&[[0.1, 0.9], [0.1, 0.9], [0.45, 0.55], [0.2, 0.8]]),
            binary_set(&[[0.4, 0.6], [0.1, 0.9], [0.3, 0.7], [0.1, 0.9]]),
        ];
        let combiner = GreedyCombiner::new(&Accuracy, GreedyConfig::default());
        let selection = combiner.select(&candidates, &gt).unwrap();
        assert_eq!(selection.best_single, 0);
        assert_eq!(selection.single_scores, vec![0.75, 0.5, 0.5]);
        assert_eq!(selection.selected, vec![0, 1]);
        assert!((selection.final_score() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn ranks_counts_descending_with_stable_ties() {
        assert_eq!(rank_by_count(&[1, 3, 1, 0, 3]), vec![1, 4, 0, 2, 3]);
    }
}
