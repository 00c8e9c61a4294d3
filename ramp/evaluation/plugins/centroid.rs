use anyhow::{bail, Context};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use super::{softmax, Classifier, TrainedModel};
use crate::{data::FeatureScaler, predictions::PredictionSet};

/// Softmax over negative squared distances to standardized class centroids.
#[derive(Debug, Clone, Copy, Default)]
pub struct NearestCentroid;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Centroids {
    scaler: FeatureScaler,
    centroids: IndexMap<String, Vec<f64>>,
}

impl Classifier for NearestCentroid {
    fn train(
        &self,
        features: &[Vec<f64>],
        labels: &[String],
    ) -> anyhow::Result<Box<dyn TrainedModel>> {
        if features.is_empty() || features.len() != labels.len() {
            bail!(
                "nearest centroid needs aligned rows, got {} rows and {} labels",
                features.len(),
                labels.len()
            );
        }
        let scaler = FeatureScaler::fit(features);
        let scaled = scaler.transform(features);
        let dim = scaled[0].len();
        let mut sums: IndexMap<String, (Vec<f64>, f64)> = IndexMap::new();
        for (row, label) in scaled.iter().zip(labels) {
            let (sum, count) = sums
                .entry(label.clone())
                .or_insert_with(|| (vec![0.0; dim], 0.0));
            for (acc, value) in sum.iter_mut().zip(row) {
                *acc += value;
            }
            *count += 1.0;
        }
        let centroids = sums
            .into_iter()
            .map(|(label, (sum, count))| (label, sum.into_iter().map(|v| v / count).collect()))
            .collect();
        Ok(Box::new(Centroids { scaler, centroids }))
    }

    fn load(&self, bytes: &[u8]) -> anyhow::Result<Box<dyn TrainedModel>> {
        let model: Centroids = serde_json::from_slice(bytes).context("decoding centroids")?;
        Ok(Box::new(model))
    }
}

impl TrainedModel for Centroids {
    fn predict(&self, features: &[Vec<f64>], labels: &[String]) -> anyhow::Result<PredictionSet> {
        let rows = features
            .iter()
            .map(|row| {
                let scaled = self.scaler.transform_row(row);
                let scores: Vec<f64> = labels
                    .iter()
                    .map(|label| {
                        self.centroids.get(label).map_or(f64::NEG_INFINITY, |centroid| {
                            -centroid
                                .iter()
                                .zip(&scaled)
                                .map(|(c, x)| (c - x).powi(2))
                                .sum::<f64>()
                        })
                    })
                    .collect();
                softmax(&scores)
            })
            .collect();
        Ok(PredictionSet::from_probabilities(labels.to_vec(), rows)?)
    }

    fn to_bytes(&self) -> anyhow::Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Dataset;

    #[test]
    fn separates_synthetic_blobs() {
        let dataset = Dataset::synthetic(60, 2, 2, 11);
        let model = NearestCentroid
            .train(&dataset.features, &dataset.labels)
            .unwrap();
        let predictions = model.predict(&dataset.features, &dataset.label_set()).unwrap();
        let hits = predictions
            .predicted_labels()
            .zip(&dataset.labels)
            .filter(|(predicted, truth)| *predicted == truth.as_str())
            .count();
        assert!(hits >= 45, "only {hits} of 60 rows classified correctly");
    }

    #[test]
    fn unseen_labels_get_zero_mass() {
        let labels = vec!["a".to_string(), "b".to_string()];
        let model = NearestCentroid
            .train(&[vec![0.0], vec![1.0]], &labels)
            .unwrap();
        let vocabulary = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let predictions = model.predict(&[vec![0.1]], &vocabulary).unwrap();
        assert_eq!(predictions.rows[0].label, "a");
        assert!(predictions.rows[0].probabilities[2].abs() < f64::EPSILON);
    }
}
