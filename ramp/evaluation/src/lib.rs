#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    missing_docs,
    rust_2018_idioms
)]

//! RAMP evaluation core: cached cross-validated training, classical and greedy-ensemble leaderboards.

/// Typed errors of every evaluation operation.
#[path = "../error.rs"]
pub mod error;

/// Content-derived fold identities.
#[path = "../fold.rs"]
pub mod fold;

/// Per-instance class-probability predictions.
#[path = "../predictions.rs"]
pub mod predictions;

/// Model entries and their lifecycle states.
#[path = "../repository.rs"]
pub mod repository;

/// Keyed artifact storage.
#[path = "../artifacts/main.rs"]
pub mod artifacts;

/// Datasets and cross-validation split providers.
#[path = "../data/main.rs"]
pub mod data;

/// Scoring functions.
#[path = "../scoring.rs"]
pub mod scoring;

/// Classifier plugins and their registry.
#[path = "../plugins/main.rs"]
pub mod plugins;

/// Fold execution on a bounded worker pool.
#[path = "../executor.rs"]
pub mod executor;

/// Prediction combination and greedy ensemble selection.
#[path = "../combining/main.rs"]
pub mod combining;

/// Classical, combination and timing leaderboards.
#[path = "../leaderboard.rs"]
pub mod leaderboard;

/// TOML configuration.
#[path = "../config.rs"]
pub mod config;

/// Telemetry helpers for logging/event emission.
#[path = "../telemetry.rs"]
pub mod telemetry;

/// High-level orchestration entry point.
#[path = "../main.rs"]
pub mod orchestration_entry;

#[cfg(test)]
#[path = "../testing.rs"]
mod testing;

pub use artifacts::{
    ArtifactKey, ArtifactKind, ArtifactStore, ArtifactStoreExt, FsArtifactStore,
    MemoryArtifactStore,
};
pub use combining::{combine, GreedyCombiner, GreedyConfig, Selection};
pub use config::RampConfig;
pub use data::{Dataset, DatasetSplitProvider, InMemorySplitProvider, SplitProvider};
pub use error::EvalError;
pub use executor::{EvaluationContext, Executor, ModelOutcome, PassReport, Stage};
pub use fold::{Fold, FoldId};
pub use leaderboard::{
    ClassicalLeaderboard, CombinationLeaderboard, ExecutionTimes, LeaderboardBuilder,
};
pub use orchestration_entry::EvaluationRuntime;
pub use plugins::{Classifier, ModelRegistry, TrainedModel};
pub use predictions::{Prediction, PredictionSet};
pub use repository::{
    FsModelRepository, MemoryModelRepository, ModelEntry, ModelId, ModelRepository, ModelState,
};
pub use scoring::{ScoreKind, Scorer};
pub use telemetry::EvaluationTelemetry;
