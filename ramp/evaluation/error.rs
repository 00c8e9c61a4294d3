use thiserror::Error;

/// Marker separating user-facing context from the traceback in plugin error text.
const TRACE_MARKER: &str = "--->";

/// Errors raised by the evaluation core.
#[derive(Debug, Error)]
pub enum EvalError {
    /// Artifact not present in the store; callers recompute.
    #[error("artifact not found: {0}")]
    CacheMiss(String),
    /// A fold failed while fitting or validating a model.
    #[error("training failed for model {model}: {message}")]
    TrainingFailure {
        /// Offending model id.
        model: String,
        /// Plugin or executor message.
        message: String,
    },
    /// A fold failed while predicting the held-out test set.
    #[error("testing failed for model {model}: {message}")]
    TestingFailure {
        /// Offending model id.
        model: String,
        /// Plugin or executor message.
        message: String,
    },
    /// Trained model could not be turned into bytes.
    #[error("cannot serialize trained model: {0}")]
    SerializationFailure(String),
    /// Predictions and ground truth are not comparable.
    #[error("scoring failed: {0}")]
    ScoringFailure(String),
    /// Stored artifact bytes cannot be decoded.
    #[error("corrupt artifact: {0}")]
    CorruptArtifact(String),
    /// No model with that id in the repository.
    #[error("unknown model: {0}")]
    UnknownModel(String),
    /// No classifier registered under that reference.
    #[error("unknown model plugin: {0}")]
    UnknownPlugin(String),
    /// Submission name already evaluated or in flight.
    #[error("submission {0} exists already")]
    DuplicateSubmission(String),
    /// Invalid configuration or input data.
    #[error("configuration error: {0}")]
    Config(String),
    /// I/O error (filesystem).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// JSON encoding failure.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    /// TOML parsing failure.
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl EvalError {
    /// True when the error only means "recompute".
    #[must_use]
    pub const fn is_cache_miss(&self) -> bool {
        matches!(self, Self::CacheMiss(_))
    }

    /// Re-labels a training failure raised during a test step.
    #[must_use]
    pub fn into_testing_failure(self, model: &str) -> Self {
        match self {
            Self::TrainingFailure { message, .. } => Self::TestingFailure {
                model: model.to_string(),
                message,
            },
            Self::TestingFailure { .. } => self,
            other => Self::TestingFailure {
                model: model.to_string(),
                message: other.to_string(),
            },
        }
    }

    /// Message persisted alongside the model, without the variant prefix.
    #[must_use]
    pub fn persisted_message(&self) -> String {
        match self {
            Self::TrainingFailure { message, .. } | Self::TestingFailure { message, .. } => {
                message.clone()
            }
            other => other.to_string(),
        }
    }
}

/// Keeps the tail after the last traceback marker, capped at `limit` characters.
#[must_use]
pub fn truncate_error_message(message: &str, limit: usize) -> String {
    let tail = message
        .rfind(TRACE_MARKER)
        .filter(|&pos| pos > 0)
        .map_or(message, |pos| &message[pos..]);
    tail.chars().take(limit).collect()
}
