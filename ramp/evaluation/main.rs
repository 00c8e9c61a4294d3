//! Evaluation runtime tying storage, execution and leaderboards together.

use std::{path::Path, sync::Arc};

use serde_json::json;
use shared_event_bus::FileEventPublisher;
use shared_logging::LogLevel;

use crate::{
    artifacts::{ArtifactKey, ArtifactStore, ArtifactStoreExt, FsArtifactStore},
    combining::GreedyConfig,
    config::RampConfig,
    data::{DatasetSplitProvider, SplitProvider, StratifiedShuffleSplit},
    error::EvalError,
    executor::{EvaluationContext, Executor, PassReport},
    fold::FoldId,
    leaderboard::{ClassicalLeaderboard, CombinationLeaderboard, ExecutionTimes, LeaderboardBuilder},
    plugins::ModelRegistry,
    repository::{FsModelRepository, ModelEntry, ModelRepository},
    scoring::Scorer,
    telemetry::{notify, trace, EvaluationTelemetry, EVENT_PASS_COMPLETED},
};

/// Top-level runtime exposing setup, submission, pending passes and leaderboards.
pub struct EvaluationRuntime {
    config: RampConfig,
    store: Arc<dyn ArtifactStore>,
    repository: Arc<dyn ModelRepository>,
    registry: ModelRegistry,
    scorer: Arc<dyn Scorer>,
    telemetry: Option<EvaluationTelemetry>,
}

impl EvaluationRuntime {
    /// Creates a runtime over explicit storage with the builtin classifiers.
    #[must_use]
    pub fn new(
        config: RampConfig,
        store: Arc<dyn ArtifactStore>,
        repository: Arc<dyn ModelRepository>,
    ) -> Self {
        Self {
            scorer: config.score.scorer(),
            config,
            store,
            repository,
            registry: ModelRegistry::with_builtin(),
            telemetry: None,
        }
    }

    /// Filesystem-backed runtime rooted at `config.root_path`, with telemetry when configured.
    pub fn from_config(config: RampConfig) -> Result<Self, EvalError> {
        config.validate()?;
        let store: Arc<dyn ArtifactStore> = Arc::new(FsArtifactStore::new(&config.root_path));
        let repository: Arc<dyn ModelRepository> =
            Arc::new(FsModelRepository::new(config.repository_path()));
        let telemetry = if config.log_path.is_some() || config.event_log.is_some() {
            let mut builder = EvaluationTelemetry::builder("evaluation").min_level(config.log_level);
            if let Some(path) = &config.log_path {
                builder = builder.log_path(path);
            }
            if let Some(path) = &config.event_log {
                let publisher = FileEventPublisher::new(path)
                    .map_err(|err| EvalError::Config(format!("event log: {err:#}")))?;
                builder = builder.event_publisher(Arc::new(publisher));
            }
            Some(
                builder
                    .build()
                    .map_err(|err| EvalError::Config(format!("telemetry: {err:#}")))?,
            )
        } else {
            None
        };
        let mut runtime = Self::new(config, store, repository);
        runtime.telemetry = telemetry;
        Ok(runtime)
    }

    /// Attaches telemetry sinks for structured logging/events.
    #[must_use]
    pub fn with_telemetry(mut self, telemetry: EvaluationTelemetry) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    /// Active configuration.
    #[must_use]
    pub const fn config(&self) -> &RampConfig {
        &self.config
    }

    /// Classifier registry; user models are registered here.
    #[must_use]
    pub const fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    /// Artifact store.
    #[must_use]
    pub fn store(&self) -> &dyn ArtifactStore {
        self.store.as_ref()
    }

    /// Splits a raw dataset into `data/train.json` and `data/test.json`.
    pub fn prepare(&self, raw: impl AsRef<Path>) -> Result<(usize, usize), EvalError> {
        let (train, test) = DatasetSplitProvider::prepare(
            raw,
            self.config.data_dir(),
            self.config.held_out_test_size,
            self.config.random_state,
        )?;
        trace(
            self.telemetry.as_ref(),
            LogLevel::Info,
            "data.prepared",
            json!({ "train": train, "test": test }),
        );
        Ok((train, test))
    }

    /// Provider over the prepared data directory with the configured folds.
    #[must_use]
    pub fn split_provider(&self) -> DatasetSplitProvider {
        DatasetSplitProvider::new(
            self.config.data_dir(),
            StratifiedShuffleSplit::new(
                self.config.cv_splits,
                self.config.cv_test_size,
                self.config.random_state,
            ),
        )
    }

    /// Writes validation ground truth per fold and the test ground truth.
    ///
    /// Ground truth of folds the provider no longer produces is removed.
    pub fn setup_ground_truth(&self, provider: &dyn SplitProvider) -> Result<Vec<FoldId>, EvalError> {
        let context = EvaluationContext::load(provider)?;
        self.write_ground_truth(&context)
    }

    fn write_ground_truth(&self, context: &EvaluationContext) -> Result<Vec<FoldId>, EvalError> {
        let mut written = Vec::with_capacity(context.folds.len());
        for fold in context.folds.iter() {
            let truth: Vec<String> = fold
                .validation_indices
                .iter()
                .map(|&idx| context.train.labels[idx].clone())
                .collect();
            self.store
                .put_labels(&ArtifactKey::GroundTruthValid(fold.id.clone()), &truth)?;
            written.push(fold.id.clone());
        }
        self.store
            .put_labels(&ArtifactKey::GroundTruthTest, &context.test.labels)?;
        for stale in self.store.ground_truth_folds()? {
            if !written.contains(&stale) {
                self.store.remove(&ArtifactKey::GroundTruthValid(stale))?;
            }
        }
        trace(
            self.telemetry.as_ref(),
            LogLevel::Info,
            "ground_truth.written",
            json!({ "folds": written, "test_rows": context.test.len() }),
        );
        Ok(written)
    }

    fn ground_truth_missing(&self, context: &EvaluationContext) -> Result<bool, EvalError> {
        if !self.store.exists(&ArtifactKey::GroundTruthTest)? {
            return Ok(true);
        }
        for fold in context.folds.iter() {
            if !self
                .store
                .exists(&ArtifactKey::GroundTruthValid(fold.id.clone()))?
            {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Registers a submission whose `reference` names a registered classifier.
    ///
    /// Resubmitting a failed or pending model resets it and drops its artifacts.
    pub fn enqueue_model(&self, name: &str, reference: &str) -> Result<ModelEntry, EvalError> {
        self.registry.resolve(reference)?;
        let resubmitted = self
            .repository
            .list()?
            .iter()
            .any(|entry| entry.name == name);
        let entry = self.repository.enqueue(name, reference)?;
        if resubmitted {
            self.store.purge_model(&entry.id)?;
        }
        trace(
            self.telemetry.as_ref(),
            LogLevel::Info,
            "model.enqueued",
            json!({
                "model": entry.id,
                "name": name,
                "reference": reference,
                "resubmitted": resubmitted,
            }),
        );
        Ok(entry)
    }

    /// Trains every pending model, then tests the trained ones when `with_test` is set.
    pub async fn run_pending_pass(
        &self,
        provider: &dyn SplitProvider,
        with_test: bool,
    ) -> Result<PassReport, EvalError> {
        let context = EvaluationContext::load(provider)?;
        if self.ground_truth_missing(&context)? {
            self.write_ground_truth(&context)?;
        }
        let mut executor = Executor::new(
            Arc::clone(&self.store),
            Arc::clone(&self.repository),
            self.registry.clone(),
            self.config.n_workers,
        )
        .with_error_message_limit(self.config.error_message_limit);
        if let Some(telemetry) = &self.telemetry {
            executor = executor.with_telemetry(telemetry.clone());
        }
        let report = executor.run_pending(&context, with_test).await?;
        let payload = json!({
            "models": report.outcomes.len(),
            "failures": report.failures().count(),
            "with_test": with_test,
        });
        trace(
            self.telemetry.as_ref(),
            LogLevel::Info,
            "pass.completed",
            payload.clone(),
        );
        notify(self.telemetry.as_ref(), EVENT_PASS_COMPLETED, payload).await;
        Ok(report)
    }

    /// Every model in submission order.
    pub fn models(&self) -> Result<Vec<ModelEntry>, EvalError> {
        self.repository.list_by_submission()
    }

    fn leaderboards(&self) -> LeaderboardBuilder<'_> {
        LeaderboardBuilder::new(self.store.as_ref(), self.scorer.as_ref())
            .with_greedy(GreedyConfig {
                tolerance: self.config.greedy_tolerance,
                max_iterations: self.config.max_greedy_iterations,
            })
            .with_telemetry(self.telemetry.as_ref())
    }

    /// Models ranked by mean validation score.
    pub fn classical_leaderboard(&self, with_test: bool) -> Result<ClassicalLeaderboard, EvalError> {
        self.leaderboards().classical(&self.models()?, with_test)
    }

    /// Models ranked by greedy-ensemble contributivity.
    pub fn combination_leaderboard(
        &self,
        with_test: bool,
    ) -> Result<CombinationLeaderboard, EvalError> {
        self.leaderboards().combination(&self.models()?, with_test)
    }

    /// Mean fit and validation times per model.
    pub fn execution_times(&self) -> Result<ExecutionTimes, EvalError> {
        self.leaderboards().execution_times(&self.models()?)
    }
}
