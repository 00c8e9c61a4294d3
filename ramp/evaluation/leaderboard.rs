use std::fmt;

use serde::Serialize;
use serde_json::json;
use shared_logging::LogLevel;

use crate::{
    artifacts::{ArtifactKey, ArtifactKind, ArtifactStore, ArtifactStoreExt},
    combining::{combine_all, histogram, rank_by_count, GreedyCombiner, GreedyConfig},
    error::EvalError,
    fold::FoldId,
    predictions::PredictionSet,
    repository::{ModelEntry, ModelId},
    scoring::Scorer,
    telemetry::{trace, EvaluationTelemetry},
};

/// Classical leaderboard row.
#[derive(Debug, Clone, Serialize)]
pub struct ClassicalEntry {
    /// Model id.
    pub model: ModelId,
    /// Submission name.
    pub name: String,
    /// Mean validation score over folds.
    pub score: f64,
    /// Mean test score over folds, when requested and available.
    pub test_score: Option<f64>,
}

/// Models ranked by mean validation score.
#[derive(Debug, Clone, Serialize)]
pub struct ClassicalLeaderboard {
    /// Scorer name.
    pub score_name: String,
    /// Sort direction.
    pub higher_the_better: bool,
    /// Whether test scores were requested.
    pub with_test: bool,
    /// Ranked rows.
    pub entries: Vec<ClassicalEntry>,
}

/// Combination leaderboard row.
#[derive(Debug, Clone, Serialize)]
pub struct CombinationEntry {
    /// Model id.
    pub model: ModelId,
    /// Submission name.
    pub name: String,
    /// Times the greedy combiner picked the model, summed over folds.
    pub contributivity: usize,
}

/// Models ranked by contributivity, plus ensemble scores.
#[derive(Debug, Clone, Serialize)]
pub struct CombinationLeaderboard {
    /// Scorer name.
    pub score_name: String,
    /// Ranked rows.
    pub entries: Vec<CombinationEntry>,
    /// Mean over folds of the final combined validation score.
    pub combined_valid_score: Option<f64>,
    /// Score of all folds' combined test predictions, combined again.
    pub foldwise_combined_test_score: Option<f64>,
    /// Score of each fold's best single model's test predictions, combined.
    pub foldwise_best_test_score: Option<f64>,
}

/// Mean timings of one model.
#[derive(Debug, Clone, Serialize)]
pub struct TimingEntry {
    /// Model id.
    pub model: ModelId,
    /// Submission name.
    pub name: String,
    /// Mean fit seconds.
    pub train_time: Option<f64>,
    /// Mean validation-prediction seconds.
    pub valid_time: Option<f64>,
}

/// Execution times per model, in submission order.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionTimes {
    /// Rows.
    pub entries: Vec<TimingEntry>,
}

/// Builds leaderboards from stored artifacts only.
pub struct LeaderboardBuilder<'a> {
    store: &'a dyn ArtifactStore,
    scorer: &'a dyn Scorer,
    greedy: GreedyConfig,
    telemetry: Option<&'a EvaluationTelemetry>,
}

struct FoldTruth {
    id: FoldId,
    labels: Vec<String>,
}

impl<'a> LeaderboardBuilder<'a> {
    /// Creates a builder.
    #[must_use]
    pub const fn new(store: &'a dyn ArtifactStore, scorer: &'a dyn Scorer) -> Self {
        Self {
            store,
            scorer,
            greedy: GreedyConfig {
                tolerance: 0.01,
                max_iterations: None,
            },
            telemetry: None,
        }
    }

    /// Overrides the greedy selection settings.
    #[must_use]
    pub const fn with_greedy(mut self, greedy: GreedyConfig) -> Self {
        self.greedy = greedy;
        self
    }

    /// Attaches telemetry.
    #[must_use]
    pub const fn with_telemetry(mut self, telemetry: Option<&'a EvaluationTelemetry>) -> Self {
        self.telemetry = telemetry;
        self
    }

    fn fold_truths(&self) -> Result<Vec<FoldTruth>, EvalError> {
        let folds = self.store.ground_truth_folds()?;
        if folds.is_empty() {
            return Err(EvalError::ScoringFailure(
                "no validation ground truth stored".into(),
            ));
        }
        folds
            .into_iter()
            .map(|id| {
                let labels = self.store.get_labels(&ArtifactKey::GroundTruthValid(id.clone()))?;
                Ok(FoldTruth { id, labels })
            })
            .collect()
    }

    fn test_truth(&self) -> Result<Option<Vec<String>>, EvalError> {
        match self.store.get_labels(&ArtifactKey::GroundTruthTest) {
            Ok(labels) => Ok(Some(labels)),
            Err(err) if err.is_cache_miss() => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Predictions of `model` for every fold, or `None` if any fold is missing.
    fn all_folds(
        &self,
        model: &ModelId,
        folds: &[FoldTruth],
        kind: ArtifactKind,
    ) -> Result<Option<Vec<PredictionSet>>, EvalError> {
        let mut sets = Vec::with_capacity(folds.len());
        for fold in folds {
            match self
                .store
                .try_predictions(&ArtifactKey::model(model, &fold.id, kind))?
            {
                Some(set) => sets.push(set),
                None => return Ok(None),
            }
        }
        Ok(Some(sets))
    }

    /// Mean validation (and optionally test) score per model, sorted by direction.
    ///
    /// Models without validation predictions on every fold are left out.
    pub fn classical(
        &self,
        models: &[ModelEntry],
        with_test: bool,
    ) -> Result<ClassicalLeaderboard, EvalError> {
        let folds = self.fold_truths()?;
        let test_truth = if with_test { self.test_truth()? } else { None };
        let mut entries = Vec::new();
        for entry in models.iter().filter(|entry| entry.state.is_validated()) {
            let Some(valid) = self.all_folds(&entry.id, &folds, ArtifactKind::Valid)? else {
                continue;
            };
            let scores = folds
                .iter()
                .zip(&valid)
                .map(|(fold, set)| self.scorer.score(&fold.labels, set))
                .collect::<Result<Vec<_>, _>>()?;
            let test_score = match &test_truth {
                Some(truth) => self
                    .all_folds(&entry.id, &folds, ArtifactKind::Test)?
                    .map(|sets| {
                        sets.iter()
                            .map(|set| self.scorer.score(truth, set))
                            .collect::<Result<Vec<_>, _>>()
                    })
                    .transpose()?
                    .map(|scores| mean(&scores)),
                None => None,
            };
            let score = mean(&scores);
            trace(
                self.telemetry,
                LogLevel::Debug,
                "leaderboard.classical.score",
                json!({ "model": entry.id, "score": score, "test_score": test_score }),
            );
            entries.push(ClassicalEntry {
                model: entry.id.clone(),
                name: entry.name.clone(),
                score,
                test_score,
            });
        }
        let higher = self.scorer.higher_the_better();
        entries.sort_by(|a, b| {
            if higher {
                b.score.total_cmp(&a.score)
            } else {
                a.score.total_cmp(&b.score)
            }
        });
        Ok(ClassicalLeaderboard {
            score_name: self.scorer.name().to_string(),
            higher_the_better: higher,
            with_test,
            entries,
        })
    }

    /// Contributivity counts from per-fold greedy selection.
    ///
    /// Each fold's universe is the models holding validation predictions for it; every
    /// validated model is listed, with zero when never picked.
    pub fn combination(
        &self,
        models: &[ModelEntry],
        with_test: bool,
    ) -> Result<CombinationLeaderboard, EvalError> {
        let folds = self.fold_truths()?;
        let test_truth = if with_test { self.test_truth()? } else { None };
        let models: Vec<&ModelEntry> = models
            .iter()
            .filter(|entry| entry.state.is_validated())
            .collect();
        let combiner = GreedyCombiner::new(self.scorer, self.greedy);

        let mut counts = vec![0usize; models.len()];
        let mut combined_valid = Vec::new();
        let mut fold_combined_tests = Vec::new();
        let mut fold_best_tests = Vec::new();
        for fold in &folds {
            let mut universe = Vec::new();
            let mut candidates = Vec::new();
            for (idx, entry) in models.iter().enumerate() {
                let key = ArtifactKey::model(&entry.id, &fold.id, ArtifactKind::Valid);
                if let Some(set) = self.store.try_predictions(&key)? {
                    universe.push(idx);
                    candidates.push(set);
                }
            }
            if universe.is_empty() {
                continue;
            }
            let selection = combiner.select(&candidates, &fold.labels)?;
            for (local, count) in histogram(&selection.selected, universe.len())
                .into_iter()
                .enumerate()
            {
                counts[universe[local]] += count;
            }
            combined_valid.push(selection.final_score());
            trace(
                self.telemetry,
                LogLevel::Info,
                "leaderboard.greedy.selection",
                json!({
                    "fold": fold.id,
                    "selected": selection
                        .selected
                        .iter()
                        .map(|&local| models[universe[local]].id.as_str())
                        .collect::<Vec<_>>(),
                    "score": selection.final_score(),
                }),
            );

            if test_truth.is_some() {
                let test_sets = universe
                    .iter()
                    .map(|&idx| {
                        self.store.try_predictions(&ArtifactKey::model(
                            &models[idx].id,
                            &fold.id,
                            ArtifactKind::Test,
                        ))
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                let chosen: Option<Vec<PredictionSet>> = selection
                    .selected
                    .iter()
                    .map(|&local| test_sets[local].clone())
                    .collect();
                if let Some(chosen) = chosen {
                    fold_combined_tests.push(combine_all(&chosen)?);
                }
                if let Some(best) = &test_sets[selection.best_single] {
                    fold_best_tests.push(best.clone());
                }
            }
        }

        let (foldwise_combined_test_score, foldwise_best_test_score) = match &test_truth {
            Some(truth) => (
                self.score_combined(truth, &fold_combined_tests)?,
                self.score_combined(truth, &fold_best_tests)?,
            ),
            None => (None, None),
        };
        if with_test {
            trace(
                self.telemetry,
                LogLevel::Info,
                "leaderboard.foldwise.test",
                json!({
                    "combined": foldwise_combined_test_score,
                    "best": foldwise_best_test_score,
                }),
            );
        }

        let entries = rank_by_count(&counts)
            .into_iter()
            .map(|idx| CombinationEntry {
                model: models[idx].id.clone(),
                name: models[idx].name.clone(),
                contributivity: counts[idx],
            })
            .collect();
        Ok(CombinationLeaderboard {
            score_name: self.scorer.name().to_string(),
            entries,
            combined_valid_score: (!combined_valid.is_empty()).then(|| mean(&combined_valid)),
            foldwise_combined_test_score,
            foldwise_best_test_score,
        })
    }

    fn score_combined(
        &self,
        truth: &[String],
        sets: &[PredictionSet],
    ) -> Result<Option<f64>, EvalError> {
        if sets.is_empty() {
            return Ok(None);
        }
        let combined = combine_all(sets)?;
        self.scorer.score(truth, &combined).map(Some)
    }

    /// Mean train and validation times per model over folds with timing artifacts.
    pub fn execution_times(&self, models: &[ModelEntry]) -> Result<ExecutionTimes, EvalError> {
        let folds = self.store.ground_truth_folds()?;
        let mut entries = Vec::new();
        for entry in models {
            let train_time = self.mean_scalar(&entry.id, &folds, ArtifactKind::TrainTime)?;
            let valid_time = self.mean_scalar(&entry.id, &folds, ArtifactKind::ValidTime)?;
            if train_time.is_none() && valid_time.is_none() {
                continue;
            }
            entries.push(TimingEntry {
                model: entry.id.clone(),
                name: entry.name.clone(),
                train_time,
                valid_time,
            });
        }
        Ok(ExecutionTimes { entries })
    }

    fn mean_scalar(
        &self,
        model: &ModelId,
        folds: &[FoldId],
        kind: ArtifactKind,
    ) -> Result<Option<f64>, EvalError> {
        let mut values = Vec::new();
        for fold in folds {
            match self.store.get_scalar(&ArtifactKey::model(model, fold, kind)) {
                Ok(value) => values.push(value),
                Err(err) if err.is_cache_miss() => {}
                Err(err) => return Err(err),
            }
        }
        Ok((!values.is_empty()).then(|| mean(&values)))
    }
}

#[allow(clippy::cast_precision_loss)]
fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

fn write_table(
    f: &mut fmt::Formatter<'_>,
    headers: &[&str],
    rows: &[Vec<String>],
) -> fmt::Result {
    let widths: Vec<usize> = headers
        .iter()
        .enumerate()
        .map(|(col, header)| {
            rows.iter()
                .map(|row| row[col].chars().count())
                .chain(std::iter::once(header.chars().count()))
                .max()
                .unwrap_or(0)
        })
        .collect();
    let rule = |f: &mut fmt::Formatter<'_>, left: &str, mid: &str, right: &str| {
        write!(f, "{left}")?;
        for (col, width) in widths.iter().enumerate() {
            if col > 0 {
                write!(f, "{mid}")?;
            }
            write!(f, "{:─<w$}", "", w = width + 2)?;
        }
        writeln!(f, "{right}")
    };
    let line = |f: &mut fmt::Formatter<'_>, cells: &[String]| {
        write!(f, "│")?;
        for (col, (cell, &width)) in cells.iter().zip(&widths).enumerate() {
            if col == 0 {
                write!(f, " {cell:<width$} │")?;
            } else {
                write!(f, " {cell:>width$} │")?;
            }
        }
        writeln!(f)
    };
    rule(f, "┌", "┬", "┐")?;
    line(f, &headers.iter().map(ToString::to_string).collect::<Vec<_>>())?;
    rule(f, "├", "┼", "┤")?;
    for row in rows {
        line(f, row)?;
    }
    rule(f, "└", "┴", "┘")
}

fn cell(value: Option<f64>) -> String {
    value.map_or_else(|| "-".to_string(), |value| format!("{value:.4}"))
}

impl fmt::Display for ClassicalLeaderboard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.entries.is_empty() {
            return writeln!(f, "Leaderboard: (empty)");
        }
        let test_header = format!("test {}", self.score_name);
        let mut headers = vec!["model", self.score_name.as_str()];
        if self.with_test {
            headers.push(test_header.as_str());
        }
        let rows: Vec<Vec<String>> = self
            .entries
            .iter()
            .map(|entry| {
                let mut row = vec![entry.name.clone(), cell(Some(entry.score))];
                if self.with_test {
                    row.push(cell(entry.test_score));
                }
                row
            })
            .collect();
        write_table(f, &headers, &rows)
    }
}

impl fmt::Display for CombinationLeaderboard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.entries.is_empty() {
            return writeln!(f, "Leaderboard: (empty)");
        }
        let rows: Vec<Vec<String>> = self
            .entries
            .iter()
            .map(|entry| vec![entry.name.clone(), entry.contributivity.to_string()])
            .collect();
        write_table(f, &["model", "contributivity"], &rows)?;
        writeln!(
            f,
            "combined valid {}: {}",
            self.score_name,
            cell(self.combined_valid_score)
        )?;
        if self.foldwise_combined_test_score.is_some() || self.foldwise_best_test_score.is_some() {
            writeln!(
                f,
                "foldwise combined test {}: {}",
                self.score_name,
                cell(self.foldwise_combined_test_score)
            )?;
            writeln!(
                f,
                "foldwise best test {}: {}",
                self.score_name,
                cell(self.foldwise_best_test_score)
            )?;
        }
        Ok(())
    }
}

impl fmt::Display for ExecutionTimes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.entries.is_empty() {
            return writeln!(f, "Execution times: (empty)");
        }
        let rows: Vec<Vec<String>> = self
            .entries
            .iter()
            .map(|entry| {
                vec![
                    entry.name.clone(),
                    cell(entry.train_time),
                    cell(entry.valid_time),
                ]
            })
            .collect();
        write_table(f, &["model", "train_time", "valid_time"], &rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        artifacts::MemoryArtifactStore,
        repository::ModelState,
        scoring::{Accuracy, ErrorRate},
        testing::{binary_set, labels},
    };

    struct Board {
        store: MemoryArtifactStore,
        fold: FoldId,
        models: Vec<ModelEntry>,
    }

    impl Board {
        fn new(truth: &[&str]) -> Self {
            let store = MemoryArtifactStore::default();
            let fold = FoldId::from_fit_indices(&[0, 1, 2]);
            store
                .put_labels(&ArtifactKey::GroundTruthValid(fold.clone()), &labels(truth))
                .unwrap();
            Self {
                store,
                fold,
                models: Vec::new(),
            }
        }

        fn model(&mut self, name: &str, valid: &PredictionSet) -> ModelId {
            let mut entry = ModelEntry::new(name, "scripted");
            entry.state = ModelState::Tested;
            self.store
                .put_predictions(
                    &ArtifactKey::model(&entry.id, &self.fold, ArtifactKind::Valid),
                    valid,
                )
                .unwrap();
            let id = entry.id.clone();
            self.models.push(entry);
            id
        }

        fn put(&self, model: &ModelId, kind: ArtifactKind, set: &PredictionSet) {
            self.put_on(&self.fold, model, kind, set);
        }

        fn put_on(&self, fold: &FoldId, model: &ModelId, kind: ArtifactKind, set: &PredictionSet) {
            self.store
                .put_predictions(&ArtifactKey::model(model, fold, kind), set)
                .unwrap();
        }

        /// Registers another fold's ground truth.
        fn add_fold(&self, fit_indices: &[usize], truth: &[&str]) -> FoldId {
            let fold = FoldId::from_fit_indices(fit_indices);
            self.store
                .put_labels(&ArtifactKey::GroundTruthValid(fold.clone()), &labels(truth))
                .unwrap();
            fold
        }
    }

    fn names<T>(entries: &[T], name: impl Fn(&T) -> &str) -> Vec<String> {
        entries.iter().map(|entry| name(entry).to_string()).collect()
    }

    #[test]
    fn classical_sorts_by_direction_with_stable_ties() {
        let mut board = Board::new(&["a", "b", "a", "b"]);
        board.model("half", &binary_set(&[[0.9, 0.1], [0.9, 0.1], [0.9, 0.1], [0.9, 0.1]]));
        board.model("full", &binary_set(&[[0.9, 0.1], [0.1, 0.9], [0.9, 0.1], [0.1, 0.9]]));
        board.model("half_too", &binary_set(&[[0.1, 0.9], [0.1, 0.9], [0.1, 0.9], [0.1, 0.9]]));

        let up = LeaderboardBuilder::new(&board.store, &Accuracy)
            .classical(&board.models, false)
            .unwrap();
        assert_eq!(names(&up.entries, |e| e.name.as_str()), vec!["full", "half", "half_too"]);

        let down = LeaderboardBuilder::new(&board.store, &ErrorRate)
            .classical(&board.models, false)
            .unwrap();
        assert_eq!(names(&down.entries, |e| e.name.as_str()), vec!["full", "half", "half_too"]);
        assert!(down.entries[0].score.abs() < 1e-12);
        assert!(down.to_string().contains("half_too"));
    }

    #[test]
    fn classical_skips_incomplete_models_and_reports_test() {
        let mut board = Board::new(&["a", "b"]);
        let done = board.model("done", &binary_set(&[[0.9, 0.1], [0.1, 0.9]]));
        board.put(&done, ArtifactKind::Test, &binary_set(&[[0.9, 0.1], [0.9, 0.1]]));
        board
            .store
            .put_labels(&ArtifactKey::GroundTruthTest, &labels(&["a", "b"]))
            .unwrap();
        let mut pending = ModelEntry::new("pending", "scripted");
        pending.state = ModelState::Trained;
        board.models.push(pending);

        let table = LeaderboardBuilder::new(&board.store, &Accuracy)
            .classical(&board.models, true)
            .unwrap();
        assert_eq!(table.entries.len(), 1);
        assert_eq!(table.entries[0].test_score, Some(0.5));
    }

    #[test]
    fn missing_ground_truth_is_a_scoring_failure() {
        let store = MemoryArtifactStore::default();
        let result = LeaderboardBuilder::new(&store, &Accuracy).classical(&[], false);
        assert!(matches!(result, Err(EvalError::ScoringFailure(_))));
    }

    #[test]
    fn contributivity_counts_greedy_picks() {
        let mut board = Board::new(&["a", "b", "a", "b"]);
        let first = board.model("first", &binary_set(&[[0.9, 0.1], [0.6, 0.4], [0.8, 0.2], [0.4, 0.6]]));
        let second = board.model("second", &binary_set(&[[0.1, 0.9], [0.1, 0.9], [0.45, 0.55], [0.2, 0.8]]));
        board.model("third", &binary_set(&[[0.4, 0.6], [0.1, 0.9], [0.3, 0.7], [0.1, 0.9]]));
        board
            .store
            .put_labels(&ArtifactKey::GroundTruthTest, &labels(&["a", "b"]))
            .unwrap();
        board.put(&first, ArtifactKind::Test, &binary_set(&[[0.7, 0.3], [0.6, 0.4]]));
        board.put(&second, ArtifactKind::Test, &binary_set(&[[0.2, 0.8], [0.1, 0.9]]));

        let table = LeaderboardBuilder::new(&board.store, &Accuracy)
            .combination(&board.models, true)
            .unwrap();
        let counts: Vec<(String, usize)> = table
            .entries
            .iter()
            .map(|entry| (entry.name.clone(), entry.contributivity))
            .collect();
        assert_eq!(
            counts,
            vec![("first".into(), 1), ("second".into(), 1), ("third".into(), 0)]
        );
        assert_eq!(table.combined_valid_score, Some(1.0));
        // Combined test row 0: (0.45, 0.55) picks b; row 1: (0.35, 0.65) picks b.
        assert_eq!(table.foldwise_combined_test_score, Some(0.5));
        assert_eq!(table.foldwise_best_test_score, Some(0.5));
    }

    #[test]
    fn contributivity_sums_over_folds_with_partial_models() {
        let mut board = Board::new(&["a", "b", "a", "b"]);
        let first = board.model("first", &binary_set(&[[0.9, 0.1], [0.6, 0.4], [0.8, 0.2], [0.4, 0.6]]));
        board.model("second", &binary_set(&[[0.1, 0.9], [0.1, 0.9], [0.45, 0.55], [0.2, 0.8]]));
        let third = board.model("third", &binary_set(&[[0.4, 0.6], [0.1, 0.9], [0.3, 0.7], [0.1, 0.9]]));
        // "second" never validated on this fold.
        let other = board.add_fold(&[4, 5], &["a", "b"]);
        board.put_on(&other, &first, ArtifactKind::Valid, &binary_set(&[[0.8, 0.2], [0.3, 0.7]]));
        board.put_on(&other, &third, ArtifactKind::Valid, &binary_set(&[[0.1, 0.9], [0.9, 0.1]]));

        let builder = LeaderboardBuilder::new(&board.store, &Accuracy);
        let table = builder.combination(&board.models, false).unwrap();
        let counts: Vec<(String, usize)> = table
            .entries
            .iter()
            .map(|entry| (entry.name.clone(), entry.contributivity))
            .collect();
        assert_eq!(
            counts,
            vec![("first".into(), 2), ("second".into(), 1), ("third".into(), 0)]
        );
        assert_eq!(table.combined_valid_score, Some(1.0));

        let classical = builder.classical(&board.models, false).unwrap();
        assert_eq!(names(&classical.entries, |e| e.name.as_str()), vec!["first", "third"]);
        assert!((classical.entries[0].score - 0.875).abs() < 1e-12);
        assert!((classical.entries[1].score - 0.25).abs() < 1e-12);
    }

    #[test]
    fn execution_times_average_present_folds() {
        let board = Board::new(&["a"]);
        let model = ModelEntry::new("timed", "scripted");
        let other_fold = FoldId::from_fit_indices(&[7]);
        board
            .store
            .put_labels(&ArtifactKey::GroundTruthValid(other_fold.clone()), &labels(&["a"]))
            .unwrap();
        for (fold, seconds) in [(&board.fold, 1.0), (&other_fold, 3.0)] {
            board
                .store
                .put_scalar(&ArtifactKey::model(&model.id, fold, ArtifactKind::TrainTime), seconds)
                .unwrap();
        }
        let untimed = ModelEntry::new("untimed", "scripted");
        let times = LeaderboardBuilder::new(&board.store, &Accuracy)
            .execution_times(&[model, untimed])
            .unwrap();
        assert_eq!(times.entries.len(), 1);
        assert_eq!(times.entries[0].train_time, Some(2.0));
        assert_eq!(times.entries[0].valid_time, None);
    }
}
