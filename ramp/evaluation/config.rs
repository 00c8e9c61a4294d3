use std::{
    fs,
    num::NonZeroUsize,
    path::{Path, PathBuf},
    thread,
};

use serde::Deserialize;
use shared_logging::LogLevel;

use crate::{error::EvalError, scoring::ScoreKind};

/// Evaluation settings loaded from `ramp.toml`.
#[derive(Debug, Clone, Deserialize)]
pub struct RampConfig {
    /// Base directory for `models/`, `ground_truth/`, `data/` and `models.json`.
    #[serde(default = "default_root_path")]
    pub root_path: PathBuf,
    /// Fold worker pool size.
    #[serde(default = "default_n_workers")]
    pub n_workers: usize,
    /// Number of cross-validation folds.
    #[serde(default = "default_cv_splits")]
    pub cv_splits: usize,
    /// Validation share of each fold.
    #[serde(default = "default_cv_test_size")]
    pub cv_test_size: f64,
    /// Share of the raw dataset held out as the test set by `prepare`.
    #[serde(default = "default_held_out_test_size")]
    pub held_out_test_size: f64,
    /// Seed for every split.
    #[serde(default = "default_random_state")]
    pub random_state: u64,
    /// Scoring function driving both leaderboards.
    #[serde(default)]
    pub score: ScoreKind,
    /// Greedy improvement tolerance, divided by the fold's ground-truth length.
    #[serde(default = "default_greedy_tolerance")]
    pub greedy_tolerance: f64,
    /// Optional cap on greedy additions per fold.
    #[serde(default)]
    pub max_greedy_iterations: Option<usize>,
    /// Maximum length of persisted failure messages.
    #[serde(default = "default_error_message_limit")]
    pub error_message_limit: usize,
    /// JSON-lines log file.
    #[serde(default)]
    pub log_path: Option<PathBuf>,
    /// JSON-lines event file for the notification collaborator.
    #[serde(default)]
    pub event_log: Option<PathBuf>,
    /// Lowest level written to `log_path` (`DEBUG`, `INFO`, `WARN`, `ERROR`).
    #[serde(default = "default_log_level")]
    pub log_level: LogLevel,
}

impl Default for RampConfig {
    fn default() -> Self {
        Self {
            root_path: default_root_path(),
            n_workers: default_n_workers(),
            cv_splits: default_cv_splits(),
            cv_test_size: default_cv_test_size(),
            held_out_test_size: default_held_out_test_size(),
            random_state: default_random_state(),
            score: ScoreKind::default(),
            greedy_tolerance: default_greedy_tolerance(),
            max_greedy_iterations: None,
            error_message_limit: default_error_message_limit(),
            log_path: None,
            event_log: None,
            log_level: default_log_level(),
        }
    }
}

impl RampConfig {
    /// Loads and validates a TOML file; relative paths resolve against its directory.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, EvalError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|err| {
            EvalError::Config(format!("reading config {}: {err}", path.display()))
        })?;
        let mut config = Self::from_toml(&raw)?;
        let source_dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        config.resolve_against(&source_dir);
        Ok(config)
    }

    /// Parses and validates TOML text without path resolution.
    pub fn from_toml(raw: &str) -> Result<Self, EvalError> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects settings the evaluation cannot run with.
    pub fn validate(&self) -> Result<(), EvalError> {
        if self.n_workers == 0 {
            return Err(EvalError::Config("n_workers must be at least 1".into()));
        }
        if self.cv_splits == 0 {
            return Err(EvalError::Config("cv_splits must be at least 1".into()));
        }
        for (name, value) in [
            ("cv_test_size", self.cv_test_size),
            ("held_out_test_size", self.held_out_test_size),
        ] {
            if !(value > 0.0 && value < 1.0) {
                return Err(EvalError::Config(format!(
                    "{name} must lie strictly between 0 and 1, got {value}"
                )));
            }
        }
        if self.greedy_tolerance.is_nan() || self.greedy_tolerance < 0.0 {
            return Err(EvalError::Config(format!(
                "greedy_tolerance must be non-negative, got {}",
                self.greedy_tolerance
            )));
        }
        Ok(())
    }

    fn resolve_against(&mut self, source_dir: &Path) {
        let resolve = |candidate: &mut PathBuf| {
            if candidate.is_relative() {
                *candidate = source_dir.join(&*candidate);
            }
        };
        resolve(&mut self.root_path);
        if let Some(path) = self.log_path.as_mut() {
            resolve(path);
        }
        if let Some(path) = self.event_log.as_mut() {
            resolve(path);
        }
    }

    /// Directory holding `train.json` and `test.json`.
    #[must_use]
    pub fn data_dir(&self) -> PathBuf {
        self.root_path.join("data")
    }

    /// Model repository document.
    #[must_use]
    pub fn repository_path(&self) -> PathBuf {
        self.root_path.join("models.json")
    }
}

fn default_root_path() -> PathBuf {
    PathBuf::from(".")
}

fn default_n_workers() -> usize {
    thread::available_parallelism().map_or(1, NonZeroUsize::get)
}

const fn default_cv_splits() -> usize {
    8
}

const fn default_cv_test_size() -> f64 {
    0.2
}

const fn default_held_out_test_size() -> f64 {
    0.2
}

const fn default_random_state() -> u64 {
    57
}

const fn default_greedy_tolerance() -> f64 {
    0.01
}

const fn default_error_message_limit() -> usize {
    1024
}

const fn default_log_level() -> LogLevel {
    LogLevel::Debug
}
