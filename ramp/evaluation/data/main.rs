//! Training/test data and the cross-validation split provider.

/// Labelled feature matrix and feature scaling.
pub mod dataset;
/// Stratified fold generation and split providers.
pub mod split;

pub use dataset::{Dataset, FeatureScaler};
pub use split::{
    DatasetSplitProvider, InMemorySplitProvider, SplitProvider, StratifiedShuffleSplit,
};
