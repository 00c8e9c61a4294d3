use anyhow::{bail, Context};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use super::{Classifier, TrainedModel};
use crate::predictions::PredictionSet;

/// Predicts the training class priors for every row.
#[derive(Debug, Clone, Copy, Default)]
pub struct MajorityClass;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Priors {
    priors: IndexMap<String, f64>,
}

impl Classifier for MajorityClass {
    fn train(
        &self,
        _features: &[Vec<f64>],
        labels: &[String],
    ) -> anyhow::Result<Box<dyn TrainedModel>> {
        if labels.is_empty() {
            bail!("cannot estimate class priors from zero rows");
        }
        let mut priors: IndexMap<String, f64> = IndexMap::new();
        for label in labels {
            *priors.entry(label.clone()).or_default() += 1.0;
        }
        #[allow(clippy::cast_precision_loss)]
        let total = labels.len() as f64;
        for count in priors.values_mut() {
            *count /= total;
        }
        Ok(Box::new(Priors { priors }))
    }

    fn load(&self, bytes: &[u8]) -> anyhow::Result<Box<dyn TrainedModel>> {
        let model: Priors = serde_json::from_slice(bytes).context("decoding class priors")?;
        Ok(Box::new(model))
    }
}

impl TrainedModel for Priors {
    fn predict(&self, features: &[Vec<f64>], labels: &[String]) -> anyhow::Result<PredictionSet> {
        let row: Vec<f64> = labels
            .iter()
            .map(|label| self.priors.get(label).copied().unwrap_or(0.0))
            .collect();
        let rows = vec![row; features.len()];
        Ok(PredictionSet::from_probabilities(labels.to_vec(), rows)?)
    }

    fn to_bytes(&self) -> anyhow::Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn predicts_most_frequent_class() {
        let labels: Vec<String> = ["a", "b", "b"].iter().map(|l| (*l).to_string()).collect();
        let model = MajorityClass.train(&[vec![], vec![], vec![]], &labels).unwrap();
        let vocabulary = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let predictions = model.predict(&[vec![0.0], vec![1.0]], &vocabulary).unwrap();
        assert_eq!(predictions.len(), 2);
        assert_eq!(predictions.rows[0].label, "b");
        assert!(predictions.rows[0].probabilities[2].abs() < f64::EPSILON);

        let restored = MajorityClass.load(&model.to_bytes().unwrap()).unwrap();
        let again = restored.predict(&[vec![0.0], vec![1.0]], &vocabulary).unwrap();
        assert_eq!(again, predictions);
    }
}
