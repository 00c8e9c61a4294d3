use std::{fmt, path::PathBuf, sync::Arc};

use anyhow::Result;
use serde_json::Value;
use shared_event_bus::{EventPublisher, EventRecord};
use shared_logging::{JsonLogger, LogLevel, LogRecord};

/// Event emitted once a model finished its training folds.
pub const EVENT_MODEL_TRAINED: &str = "evaluation.model.trained";
/// Event emitted once a model produced test predictions on every fold.
pub const EVENT_MODEL_TESTED: &str = "evaluation.model.tested";
/// Event emitted when a model lands in `error` or `test_error`.
pub const EVENT_MODEL_FAILED: &str = "evaluation.model.failed";
/// Event emitted at the end of a pending pass.
pub const EVENT_PASS_COMPLETED: &str = "evaluation.pass.completed";

/// Builder configuring evaluation telemetry.
pub struct EvaluationTelemetryBuilder {
    module: String,
    log_path: Option<PathBuf>,
    min_level: LogLevel,
    event_publisher: Option<Arc<dyn EventPublisher>>,
}

impl EvaluationTelemetryBuilder {
    /// Creates a new builder.
    #[must_use]
    pub fn new(module: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            log_path: None,
            min_level: LogLevel::Debug,
            event_publisher: None,
        }
    }

    /// Sets the JSON log path.
    #[must_use]
    pub fn log_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.log_path = Some(path.into());
        self
    }

    /// Drops log records below `level`.
    #[must_use]
    pub const fn min_level(mut self, level: LogLevel) -> Self {
        self.min_level = level;
        self
    }

    /// Assigns the event publisher.
    #[must_use]
    pub fn event_publisher(mut self, publisher: Arc<dyn EventPublisher>) -> Self {
        self.event_publisher = Some(publisher);
        self
    }

    /// Finalizes the builder.
    pub fn build(self) -> Result<EvaluationTelemetry> {
        let logger = match self.log_path {
            Some(path) => Some(JsonLogger::new(path)?.with_min_level(self.min_level)),
            None => None,
        };
        Ok(EvaluationTelemetry {
            inner: Arc::new(TelemetryInner {
                module: self.module,
                logger,
                publisher: self.event_publisher,
            }),
        })
    }
}

/// Telemetry handle shared by the executor, combiner and runtime.
#[derive(Clone)]
pub struct EvaluationTelemetry {
    inner: Arc<TelemetryInner>,
}

impl fmt::Debug for EvaluationTelemetry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EvaluationTelemetry")
            .field("module", &self.inner.module)
            .field("logging", &self.inner.logger.is_some())
            .field("events", &self.inner.publisher.is_some())
            .finish()
    }
}

struct TelemetryInner {
    module: String,
    logger: Option<JsonLogger>,
    publisher: Option<Arc<dyn EventPublisher>>,
}

impl EvaluationTelemetry {
    /// Returns a builder for this telemetry helper.
    #[must_use]
    pub fn builder(module: impl Into<String>) -> EvaluationTelemetryBuilder {
        EvaluationTelemetryBuilder::new(module)
    }

    /// Logs a structured record.
    pub fn log(&self, level: LogLevel, message: &str, metadata: Value) -> Result<()> {
        if let Some(logger) = &self.inner.logger {
            let record = LogRecord::new(&self.inner.module, level, message).with_metadata(metadata);
            logger.log(&record)?;
        }
        Ok(())
    }

    /// Publishes an event through the configured bus.
    pub async fn event(&self, event_type: &str, payload: Value) -> Result<()> {
        if let Some(publisher) = &self.inner.publisher {
            let record = EventRecord::new(&self.inner.module, event_type, payload);
            publisher.publish(record).await?;
        }
        Ok(())
    }
}

/// Logs through optional telemetry, dropping telemetry I/O failures.
pub(crate) fn trace(
    telemetry: Option<&EvaluationTelemetry>,
    level: LogLevel,
    message: &str,
    metadata: Value,
) {
    if let Some(telemetry) = telemetry {
        if let Err(err) = telemetry.log(level, message, metadata) {
            eprintln!("evaluation telemetry log failed: {err:?}");
        }
    }
}

/// Publishes through optional telemetry, dropping publish failures.
pub(crate) async fn notify(telemetry: Option<&EvaluationTelemetry>, event_type: &str, payload: Value) {
    if let Some(telemetry) = telemetry {
        if let Err(err) = telemetry.event(event_type, payload).await {
            eprintln!("evaluation telemetry event failed: {err:?}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use shared_event_bus::MemoryEventBus;
    use tempfile::tempdir;

    #[tokio::test]
    async fn telemetry_logs_and_emits() {
        let dir = tempdir().unwrap();
        let log_path = dir.path().join("evaluation.log");
        let bus = Arc::new(MemoryEventBus::new(8));
        let telemetry = EvaluationTelemetry::builder("evaluation")
            .log_path(&log_path)
            .event_publisher(bus.clone())
            .build()
            .unwrap();
        telemetry
            .log(LogLevel::Info, "fold.trained", json!({ "model": "m1" }))
            .unwrap();
        telemetry
            .event(EVENT_MODEL_TRAINED, json!({ "model": "m1" }))
            .await
            .unwrap();
        let records = shared_logging::read_records(&log_path).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].message, "fold.trained");
        assert_eq!(bus.events_of_type(EVENT_MODEL_TRAINED).len(), 1);
    }

    #[test]
    fn min_level_drops_quieter_records() {
        let dir = tempdir().unwrap();
        let log_path = dir.path().join("evaluation.log");
        let telemetry = EvaluationTelemetry::builder("evaluation")
            .log_path(&log_path)
            .min_level(LogLevel::Info)
            .build()
            .unwrap();
        telemetry
            .log(LogLevel::Debug, "fold.cached", json!({ "model": "m1" }))
            .unwrap();
        telemetry
            .log(LogLevel::Warn, "fold.failed", json!({ "model": "m1" }))
            .unwrap();
        let records = shared_logging::read_records(&log_path).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].message, "fold.failed");
    }

    #[tokio::test]
    async fn absent_telemetry_is_silent() {
        trace(None, LogLevel::Error, "ignored", Value::Null);
        notify(None, EVENT_PASS_COMPLETED, Value::Null).await;
    }
}
