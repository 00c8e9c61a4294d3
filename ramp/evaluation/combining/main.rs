//! Probability-averaging combination and greedy ensemble selection.

/// Elementwise probability averaging over a selection multiset.
pub mod combine;
/// Forward selection with replacement.
pub mod greedy;
/// Sanity checks on combined predictions.
pub mod reviewer;

pub use combine::{combine, combine_all};
pub use greedy::{histogram, rank_by_count, GreedyCombiner, GreedyConfig, Selection};
pub use reviewer::CombinationReviewer;
