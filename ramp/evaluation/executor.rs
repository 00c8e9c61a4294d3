use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Instant,
};

use serde::Serialize;
use serde_json::json;
use shared_logging::LogLevel;
use tokio::{sync::Semaphore, task::JoinSet};

use crate::{
    artifacts::{ArtifactKey, ArtifactKind, ArtifactStore, ArtifactStoreExt},
    combining::CombinationReviewer,
    data::{Dataset, SplitProvider},
    error::{truncate_error_message, EvalError},
    fold::{folds_from_splits, Fold},
    plugins::{Classifier, ModelRegistry, TrainedModel},
    predictions::PredictionSet,
    repository::{ModelEntry, ModelId, ModelRepository, ModelState},
    telemetry::{
        notify, trace, EvaluationTelemetry, EVENT_MODEL_FAILED, EVENT_MODEL_TESTED,
        EVENT_MODEL_TRAINED,
    },
};

/// Immutable inputs shared by every fold task of a pass.
#[derive(Debug, Clone)]
pub struct EvaluationContext {
    /// Training pool.
    pub train: Arc<Dataset>,
    /// Held-out test set.
    pub test: Arc<Dataset>,
    /// Folds over the training pool.
    pub folds: Arc<Vec<Fold>>,
    /// Label vocabulary of every prediction set.
    pub labels: Arc<Vec<String>>,
}

impl EvaluationContext {
    /// Loads data and folds once from the provider.
    pub fn load(provider: &dyn SplitProvider) -> Result<Self, EvalError> {
        let train = provider.train_data()?;
        let test = provider.test_data()?;
        let folds = folds_from_splits(provider.cv(&train.labels)?);
        for fold in &folds {
            if let Some(idx) = fold
                .fit_indices
                .iter()
                .chain(&fold.validation_indices)
                .find(|&&idx| idx >= train.len())
            {
                return Err(EvalError::Config(format!(
                    "fold {} references row {idx} of {}",
                    fold.id,
                    train.len()
                )));
            }
        }
        Ok(Self {
            labels: Arc::new(provider.labels()?),
            train: Arc::new(train),
            test: Arc::new(test),
            folds: Arc::new(folds),
        })
    }
}

/// Which half of the pipeline a model goes through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Fit plus validation predictions.
    Train,
    /// Held-out test predictions.
    Test,
}

impl Stage {
    const fn running(self) -> ModelState {
        match self {
            Self::Train => ModelState::Training,
            Self::Test => ModelState::Testing,
        }
    }

    const fn succeeded(self) -> ModelState {
        match self {
            Self::Train => ModelState::Trained,
            Self::Test => ModelState::Tested,
        }
    }

    const fn failed(self) -> ModelState {
        match self {
            Self::Train => ModelState::Error,
            Self::Test => ModelState::TestError,
        }
    }

    fn failure(self, model: &ModelId, message: impl Into<String>) -> EvalError {
        let model = model.to_string();
        let message = message.into();
        match self {
            Self::Train => EvalError::TrainingFailure { model, message },
            Self::Test => EvalError::TestingFailure { model, message },
        }
    }
}

/// Result of one model going through one stage.
#[derive(Debug, Clone, Serialize)]
pub struct ModelOutcome {
    /// Model id.
    pub model: ModelId,
    /// Submission name.
    pub name: String,
    /// Stage that ran.
    pub stage: Stage,
    /// State the model ended in.
    pub state: ModelState,
    /// Persisted failure message.
    pub error: Option<String>,
}

impl ModelOutcome {
    /// Whether the stage failed.
    #[must_use]
    pub const fn failed(&self) -> bool {
        matches!(self.state, ModelState::Error | ModelState::TestError)
    }
}

/// Per-model outcomes of one pending pass, in processing order.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PassReport {
    /// Every stage run.
    pub outcomes: Vec<ModelOutcome>,
}

impl PassReport {
    /// Outcomes that ended in `error` or `test_error`.
    pub fn failures(&self) -> impl Iterator<Item = &ModelOutcome> {
        self.outcomes.iter().filter(|outcome| outcome.failed())
    }

    /// Final state of `model`, if it ran in this pass.
    #[must_use]
    pub fn final_state(&self, model: &ModelId) -> Option<ModelState> {
        self.outcomes
            .iter()
            .rev()
            .find(|outcome| &outcome.model == model)
            .map(|outcome| outcome.state)
    }
}

/// Runs model folds on a bounded worker pool and records model states.
pub struct Executor {
    store: Arc<dyn ArtifactStore>,
    repository: Arc<dyn ModelRepository>,
    registry: ModelRegistry,
    n_workers: usize,
    error_message_limit: usize,
    telemetry: Option<EvaluationTelemetry>,
}

impl Executor {
    /// Creates an executor running at most `n_workers` folds at once.
    #[must_use]
    pub fn new(
        store: Arc<dyn ArtifactStore>,
        repository: Arc<dyn ModelRepository>,
        registry: ModelRegistry,
        n_workers: usize,
    ) -> Self {
        Self {
            store,
            repository,
            registry,
            n_workers: n_workers.max(1),
            error_message_limit: 1024,
            telemetry: None,
        }
    }

    /// Caps persisted failure messages.
    #[must_use]
    pub const fn with_error_message_limit(mut self, limit: usize) -> Self {
        self.error_message_limit = limit;
        self
    }

    /// Attaches telemetry.
    #[must_use]
    pub fn with_telemetry(mut self, telemetry: EvaluationTelemetry) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    /// Trains every `new` model, then (optionally) tests every `trained` one.
    ///
    /// Models go one at a time in submission order. Models left in `training` or
    /// `testing` by an interrupted pass are picked up again.
    pub async fn run_pending(
        &self,
        context: &EvaluationContext,
        with_test: bool,
    ) -> Result<PassReport, EvalError> {
        let mut report = PassReport::default();
        for entry in self.repository.list_by_submission()? {
            if matches!(entry.state, ModelState::New | ModelState::Training) {
                report
                    .outcomes
                    .push(self.run_stage(context, &entry, Stage::Train).await?);
            }
        }
        if with_test {
            for entry in self.repository.list_by_submission()? {
                if matches!(entry.state, ModelState::Trained | ModelState::Testing) {
                    report
                        .outcomes
                        .push(self.run_stage(context, &entry, Stage::Test).await?);
                }
            }
        }
        Ok(report)
    }

    /// Runs one stage for one model and persists the resulting state.
    ///
    /// Fold failures end up in the returned outcome; only repository errors escape.
    pub async fn run_stage(
        &self,
        context: &EvaluationContext,
        entry: &ModelEntry,
        stage: Stage,
    ) -> Result<ModelOutcome, EvalError> {
        self.repository.set_state(&entry.id, stage.running(), None)?;
        let started = Instant::now();
        let result = self.run_folds(context, entry, stage).await;
        let elapsed = started.elapsed().as_secs_f64();
        let telemetry = self.telemetry.as_ref();

        let (state, error) = match result {
            Ok(()) => {
                trace(
                    telemetry,
                    LogLevel::Info,
                    "model.stage.completed",
                    json!({ "model": entry.id, "name": entry.name, "stage": stage, "elapsed": elapsed }),
                );
                let event = match stage {
                    Stage::Train => EVENT_MODEL_TRAINED,
                    Stage::Test => EVENT_MODEL_TESTED,
                };
                notify(telemetry, event, json!({ "model": entry.id, "name": entry.name })).await;
                (stage.succeeded(), None)
            }
            Err(err) => {
                let message =
                    truncate_error_message(&err.persisted_message(), self.error_message_limit);
                trace(
                    telemetry,
                    LogLevel::Error,
                    "model.stage.failed",
                    json!({ "model": entry.id, "name": entry.name, "stage": stage, "error": message }),
                );
                notify(
                    telemetry,
                    EVENT_MODEL_FAILED,
                    json!({ "model": entry.id, "name": entry.name, "stage": stage, "error": message }),
                )
                .await;
                (stage.failed(), Some(message))
            }
        };
        self.repository.set_state(&entry.id, state, error.clone())?;
        Ok(ModelOutcome {
            model: entry.id.clone(),
            name: entry.name.clone(),
            stage,
            state,
            error,
        })
    }

    async fn run_folds(
        &self,
        context: &EvaluationContext,
        entry: &ModelEntry,
        stage: Stage,
    ) -> Result<(), EvalError> {
        let classifier = self
            .registry
            .resolve(&entry.reference)
            .map_err(|err| stage.failure(&entry.id, err.to_string()))?;
        let semaphore = Arc::new(Semaphore::new(self.n_workers));
        let cancel = Arc::new(AtomicBool::new(false));

        let mut set = JoinSet::new();
        for fold in context.folds.iter() {
            let task = FoldTask {
                model: entry.id.clone(),
                fold: fold.clone(),
                stage,
                classifier: Arc::clone(&classifier),
                store: Arc::clone(&self.store),
                context: context.clone(),
                cancel: Arc::clone(&cancel),
                telemetry: self.telemetry.clone(),
            };
            let semaphore = Arc::clone(&semaphore);
            set.spawn(async move {
                let model = task.model.clone();
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .map_err(|err| stage.failure(&model, err.to_string()))?;
                if task.is_cancelled() {
                    return Ok(());
                }
                tokio::task::spawn_blocking(move || task.run())
                    .await
                    .map_err(|err| stage.failure(&model, format!("fold task aborted: {err}")))?
            });
        }

        // Blocking fits cannot be aborted; every task is awaited.
        let mut outcome = Ok(());
        while let Some(joined) = set.join_next().await {
            let result = joined
                .map_err(|err| stage.failure(&entry.id, format!("fold task aborted: {err}")))
                .and_then(|result| result);
            if let Err(err) = result {
                cancel.store(true, Ordering::SeqCst);
                if outcome.is_ok() {
                    outcome = Err(err);
                }
            }
        }
        outcome
    }
}

/// One (model, fold, stage) unit scheduled on the worker pool.
struct FoldTask {
    model: ModelId,
    fold: Fold,
    stage: Stage,
    classifier: Arc<dyn Classifier>,
    store: Arc<dyn ArtifactStore>,
    context: EvaluationContext,
    cancel: Arc<AtomicBool>,
    telemetry: Option<EvaluationTelemetry>,
}

impl FoldTask {
    fn run(self) -> Result<(), EvalError> {
        match self.stage {
            Stage::Train => {
                let trained = self.obtain_model()?;
                self.ensure_active()?;
                self.validate(trained.as_ref())
            }
            Stage::Test => {
                let trained = self
                    .obtain_model()
                    .map_err(|err| err.into_testing_failure(self.model.as_str()))?;
                self.ensure_active()?;
                self.test(trained.as_ref())
            }
        }
    }

    fn key(&self, kind: ArtifactKind) -> ArtifactKey {
        ArtifactKey::model(&self.model, &self.fold.id, kind)
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    fn ensure_active(&self) -> Result<(), EvalError> {
        if self.is_cancelled() {
            Err(self
                .stage
                .failure(&self.model, "abandoned after a sibling fold failed"))
        } else {
            Ok(())
        }
    }

    fn log(&self, level: LogLevel, message: &str, extra: serde_json::Value) {
        let mut metadata = json!({ "model": self.model, "fold": self.fold.id });
        if let (Some(target), serde_json::Value::Object(extra)) = (metadata.as_object_mut(), extra)
        {
            target.extend(extra);
        }
        trace(self.telemetry.as_ref(), level, message, metadata);
    }

    /// Loads the cached model for this fold, or fits a new one.
    fn obtain_model(&self) -> Result<Box<dyn TrainedModel>, EvalError> {
        match self.store.get(&self.key(ArtifactKind::Model)) {
            Ok(bytes) => match self.classifier.load(&bytes) {
                Ok(model) => {
                    self.log(LogLevel::Debug, "fold.cache.hit", serde_json::Value::Null);
                    return Ok(model);
                }
                Err(err) => self.log(
                    LogLevel::Warn,
                    "fold.cache.unreadable",
                    json!({ "error": format!("{err:#}") }),
                ),
            },
            Err(err) if err.is_cache_miss() => {}
            Err(err) => return Err(err),
        }
        self.fit()
    }

    fn fit(&self) -> Result<Box<dyn TrainedModel>, EvalError> {
        let fit = self.context.train.subset(&self.fold.fit_indices)?;
        let started = Instant::now();
        let trained = self
            .classifier
            .train(&fit.features, &fit.labels)
            .map_err(|err| Stage::Train.failure(&self.model, format!("{err:#}")))?;
        let train_time = started.elapsed().as_secs_f64();
        self.store
            .put_scalar(&self.key(ArtifactKind::TrainTime), train_time)?;
        self.log(
            LogLevel::Info,
            "fold.trained",
            json!({ "train_time": train_time }),
        );

        let model_key = self.key(ArtifactKind::Model);
        let persisted = trained
            .to_bytes()
            .map_err(|err| EvalError::SerializationFailure(format!("{err:#}")))
            .and_then(|bytes| self.store.put(&model_key, &bytes));
        if let Err(err) = persisted {
            self.log(
                LogLevel::Warn,
                "fold.model.not_cached",
                json!({ "error": err.to_string() }),
            );
            self.store.remove(&model_key)?;
        }
        Ok(trained)
    }

    fn validate(&self, trained: &dyn TrainedModel) -> Result<(), EvalError> {
        let validation = self.context.train.subset(&self.fold.validation_indices)?;
        let started = Instant::now();
        let predictions = trained
            .predict(&validation.features, &self.context.labels)
            .map_err(|err| Stage::Train.failure(&self.model, format!("{err:#}")))?;
        let valid_time = started.elapsed().as_secs_f64();
        self.check_predictions(Stage::Train, &predictions, validation.len())?;
        self.store
            .put_scalar(&self.key(ArtifactKind::ValidTime), valid_time)?;
        self.store
            .put_predictions(&self.key(ArtifactKind::Valid), &predictions)?;
        self.log(
            LogLevel::Info,
            "fold.validated",
            json!({ "valid_time": valid_time }),
        );
        Ok(())
    }

    fn test(&self, trained: &dyn TrainedModel) -> Result<(), EvalError> {
        let test = &self.context.test;
        let predictions = trained
            .predict(&test.features, &self.context.labels)
            .map_err(|err| Stage::Test.failure(&self.model, format!("{err:#}")))?;
        self.check_predictions(Stage::Test, &predictions, test.len())?;
        self.store
            .put_predictions(&self.key(ArtifactKind::Test), &predictions)?;
        self.log(LogLevel::Info, "fold.tested", serde_json::Value::Null);
        Ok(())
    }

    /// Rejects predictions the leaderboards could not score against the shared vocabulary.
    fn check_predictions(
        &self,
        stage: Stage,
        predictions: &PredictionSet,
        rows: usize,
    ) -> Result<(), EvalError> {
        if predictions.len() != rows {
            return Err(stage.failure(
                &self.model,
                format!("{} predictions for {rows} rows", predictions.len()),
            ));
        }
        if predictions.labels != *self.context.labels {
            return Err(stage.failure(
                &self.model,
                format!(
                    "predicted labels {:?} differ from {:?}",
                    predictions.labels, self.context.labels
                ),
            ));
        }
        CombinationReviewer
            .review(predictions)
            .map_err(|err| stage.failure(&self.model, err.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        artifacts::MemoryArtifactStore,
        repository::MemoryModelRepository,
        testing::{
            fixture_provider, CountingClassifier, FailingClassifier, FitGauge, Malformed,
            SlowClassifier, UnserializableClassifier,
        },
    };
    use shared_event_bus::MemoryEventBus;

    struct Harness {
        store: Arc<MemoryArtifactStore>,
        repository: Arc<MemoryModelRepository>,
        registry: ModelRegistry,
        context: EvaluationContext,
    }

    impl Harness {
        fn new() -> Self {
            Self {
                store: Arc::new(MemoryArtifactStore::default()),
                repository: Arc::new(MemoryModelRepository::default()),
                registry: ModelRegistry::with_builtin(),
                context: EvaluationContext::load(&fixture_provider()).unwrap(),
            }
        }

        fn executor(&self) -> Executor {
            Executor::new(
                self.store.clone(),
                self.repository.clone(),
                self.registry.clone(),
                2,
            )
        }

        fn artifact(&self, model: &ModelId, fold: &Fold, kind: ArtifactKind) -> Option<Vec<u8>> {
            self.store.get(&ArtifactKey::model(model, &fold.id, kind)).ok()
        }
    }

    #[tokio::test]
    async fn trains_validates_and_tests_every_fold() {
        let harness = Harness::new();
        let entry = harness.repository.enqueue("centroid", "nearest_centroid").unwrap();
        let report = harness
            .executor()
            .run_pending(&harness.context, true)
            .await
            .unwrap();
        assert_eq!(report.final_state(&entry.id), Some(ModelState::Tested));
        assert_eq!(
            harness.repository.get(&entry.id).unwrap().state,
            ModelState::Tested
        );
        for fold in harness.context.folds.iter() {
            for kind in [
                ArtifactKind::Model,
                ArtifactKind::TrainTime,
                ArtifactKind::ValidTime,
                ArtifactKind::Valid,
                ArtifactKind::Test,
            ] {
                assert!(harness.artifact(&entry.id, fold, kind).is_some(), "{kind:?}");
            }
        }
    }

    #[tokio::test]
    async fn cached_models_are_not_retrained() {
        let harness = Harness::new();
        let counting = Arc::new(CountingClassifier::default());
        harness.registry.register("counting", counting.clone());
        let entry = harness.repository.enqueue("counted", "counting").unwrap();
        let executor = harness.executor();

        executor.run_pending(&harness.context, true).await.unwrap();
        let folds = harness.context.folds.len();
        assert_eq!(counting.train_calls(), folds);
        let first: Vec<_> = harness
            .context
            .folds
            .iter()
            .map(|fold| harness.artifact(&entry.id, fold, ArtifactKind::Valid))
            .collect();

        harness
            .repository
            .set_state(&entry.id, ModelState::New, None)
            .unwrap();
        executor.run_pending(&harness.context, true).await.unwrap();
        assert_eq!(counting.train_calls(), folds);
        let second: Vec<_> = harness
            .context
            .folds
            .iter()
            .map(|fold| harness.artifact(&entry.id, fold, ArtifactKind::Valid))
            .collect();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn failing_fold_isolates_its_model() {
        let harness = Harness::new();
        let second_fold_rows = harness.context.folds[1].fit_indices.len();
        harness.registry.register(
            "flaky",
            Arc::new(FailingClassifier::on_fit_size(second_fold_rows)),
        );
        let bus = Arc::new(MemoryEventBus::new(32));
        let telemetry = EvaluationTelemetry::builder("evaluation")
            .event_publisher(bus.clone())
            .build()
            .unwrap();
        let x = harness.repository.enqueue("x", "flaky").unwrap();
        let y = harness.repository.enqueue("y", "majority").unwrap();

        let report = harness
            .executor()
            .with_telemetry(telemetry)
            .run_pending(&harness.context, true)
            .await
            .unwrap();

        let x_entry = harness.repository.get(&x.id).unwrap();
        assert_eq!(x_entry.state, ModelState::Error);
        assert!(x_entry.error.as_deref().is_some_and(|msg| !msg.is_empty()));
        assert_eq!(harness.repository.get(&y.id).unwrap().state, ModelState::Tested);
        assert_eq!(report.failures().count(), 1);
        assert_eq!(bus.events_of_type(EVENT_MODEL_FAILED).len(), 1);
        assert_eq!(bus.events_of_type(EVENT_MODEL_TESTED).len(), 1);
    }

    #[tokio::test]
    async fn failure_messages_are_truncated() {
        let harness = Harness::new();
        harness
            .registry
            .register("flaky", Arc::new(FailingClassifier::always()));
        let entry = harness.repository.enqueue("x", "flaky").unwrap();
        harness
            .executor()
            .with_error_message_limit(13)
            .run_pending(&harness.context, false)
            .await
            .unwrap();
        let stored = harness.repository.get(&entry.id).unwrap().error.unwrap();
        assert_eq!(stored, "---> scripted");
    }

    #[tokio::test]
    async fn unscorable_predictions_fail_only_their_model() {
        let harness = Harness::new();
        harness
            .registry
            .register("unnormalized", Arc::new(Malformed::Unnormalized));
        harness
            .registry
            .register("foreign", Arc::new(Malformed::ForeignLabels));
        let unnormalized = harness.repository.enqueue("u", "unnormalized").unwrap();
        let foreign = harness.repository.enqueue("f", "foreign").unwrap();
        let healthy = harness.repository.enqueue("c", "nearest_centroid").unwrap();

        harness
            .executor()
            .run_pending(&harness.context, true)
            .await
            .unwrap();

        for bad in [&unnormalized, &foreign] {
            let stored = harness.repository.get(&bad.id).unwrap();
            assert_eq!(stored.state, ModelState::Error);
            for fold in harness.context.folds.iter() {
                assert!(harness.artifact(&bad.id, fold, ArtifactKind::Valid).is_none());
            }
        }
        assert!(harness
            .repository
            .get(&foreign.id)
            .unwrap()
            .error
            .is_some_and(|msg| msg.contains("other")));
        assert_eq!(
            harness.repository.get(&healthy.id).unwrap().state,
            ModelState::Tested
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn failed_model_finishes_its_fits_before_the_next_starts() {
        let harness = Harness::new();
        let gauge = Arc::new(FitGauge::default());
        let first_fold_rows = harness.context.folds[0].fit_indices.len();
        harness.registry.register(
            "slow_failing",
            Arc::new(SlowClassifier::failing_on(gauge.clone(), first_fold_rows)),
        );
        harness
            .registry
            .register("slow", Arc::new(SlowClassifier::healthy(gauge.clone())));
        let x = harness.repository.enqueue("x", "slow_failing").unwrap();
        let y = harness.repository.enqueue("y", "slow").unwrap();

        harness
            .executor()
            .run_pending(&harness.context, false)
            .await
            .unwrap();

        assert_eq!(harness.repository.get(&x.id).unwrap().state, ModelState::Error);
        assert_eq!(harness.repository.get(&y.id).unwrap().state, ModelState::Trained);
        assert!(gauge.peak() <= 2, "peak {}", gauge.peak());
    }

    #[tokio::test]
    async fn unknown_reference_marks_error() {
        let harness = Harness::new();
        let entry = harness.repository.enqueue("ghost", "missing_plugin").unwrap();
        harness
            .executor()
            .run_pending(&harness.context, true)
            .await
            .unwrap();
        let stored = harness.repository.get(&entry.id).unwrap();
        assert_eq!(stored.state, ModelState::Error);
        assert!(stored.error.unwrap().contains("missing_plugin"));
    }

    #[tokio::test]
    async fn unserializable_models_still_produce_predictions() {
        let harness = Harness::new();
        let classifier = Arc::new(UnserializableClassifier::default());
        harness.registry.register("opaque", classifier.clone());
        let entry = harness.repository.enqueue("opaque", "opaque").unwrap();
        harness
            .executor()
            .run_pending(&harness.context, true)
            .await
            .unwrap();
        assert_eq!(
            harness.repository.get(&entry.id).unwrap().state,
            ModelState::Tested
        );
        let fold = &harness.context.folds[0];
        assert!(harness.artifact(&entry.id, fold, ArtifactKind::Model).is_none());
        assert!(harness.artifact(&entry.id, fold, ArtifactKind::Valid).is_some());
        assert!(harness.artifact(&entry.id, fold, ArtifactKind::Test).is_some());
        // No cached blob, so the test stage fits every fold again.
        assert_eq!(classifier.train_calls(), 2 * harness.context.folds.len());
    }

    #[tokio::test]
    async fn training_only_pass_leaves_models_trained() {
        let harness = Harness::new();
        let entry = harness.repository.enqueue("prior", "majority").unwrap();
        harness
            .executor()
            .run_pending(&harness.context, false)
            .await
            .unwrap();
        assert_eq!(
            harness.repository.get(&entry.id).unwrap().state,
            ModelState::Trained
        );
        let fold = &harness.context.folds[0];
        assert!(harness.artifact(&entry.id, fold, ArtifactKind::Test).is_none());
    }
}
