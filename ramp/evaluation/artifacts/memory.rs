use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::RwLock;

use super::{ArtifactKey, ArtifactStore};
use crate::{error::EvalError, fold::FoldId, repository::ModelId};

/// Store holding artifacts in a shared map.
#[derive(Debug, Clone, Default)]
pub struct MemoryArtifactStore {
    inner: Arc<RwLock<IndexMap<ArtifactKey, Vec<u8>>>>,
}

impl MemoryArtifactStore {
    /// Number of stored artifacts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    /// True when nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }
}

impl ArtifactStore for MemoryArtifactStore {
    fn put(&self, key: &ArtifactKey, bytes: &[u8]) -> Result<(), EvalError> {
        self.inner.write().insert(key.clone(), bytes.to_vec());
        Ok(())
    }

    fn get(&self, key: &ArtifactKey) -> Result<Vec<u8>, EvalError> {
        self.inner
            .read()
            .get(key)
            .cloned()
            .ok_or_else(|| EvalError::CacheMiss(key.to_string()))
    }

    fn exists(&self, key: &ArtifactKey) -> Result<bool, EvalError> {
        Ok(self.inner.read().contains_key(key))
    }

    fn remove(&self, key: &ArtifactKey) -> Result<(), EvalError> {
        self.inner.write().shift_remove(key);
        Ok(())
    }

    fn ground_truth_folds(&self) -> Result<Vec<FoldId>, EvalError> {
        let mut folds: Vec<FoldId> = self
            .inner
            .read()
            .keys()
            .filter_map(|key| match key {
                ArtifactKey::GroundTruthValid(fold) => Some(fold.clone()),
                _ => None,
            })
            .collect();
        folds.sort();
        Ok(folds)
    }

    fn purge_model(&self, model: &ModelId) -> Result<(), EvalError> {
        self.inner.write().retain(|key, _| {
            !matches!(key, ArtifactKey::Model { model: owner, .. } if owner == model)
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_before_put_misses() {
        let store = MemoryArtifactStore::default();
        let key = ArtifactKey::GroundTruthTest;
        assert!(store.get(&key).unwrap_err().is_cache_miss());
        store.put(&key, b"labels").unwrap();
        assert_eq!(store.get(&key).unwrap(), b"labels");
        assert_eq!(store.len(), 1);
    }
}
