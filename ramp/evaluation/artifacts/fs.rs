use std::{
    fs::{self, File},
    io::{ErrorKind, Write},
    path::{Path, PathBuf},
};

use uuid::Uuid;

use super::{ArtifactKey, ArtifactStore, GROUND_TRUTH_VALID_PREFIX};
use crate::{error::EvalError, fold::FoldId, repository::ModelId};

/// Writes `data` to a sibling temp file, syncs it, then renames it over `path`.
pub(crate) fn write_atomic(path: &Path, data: &[u8]) -> Result<(), EvalError> {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent)?;
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp = parent.join(format!(".{file_name}.{}.tmp", Uuid::new_v4().simple()));
    let result = (|| {
        let mut file = File::create(&tmp)?;
        file.write_all(data)?;
        file.sync_all()?;
        fs::rename(&tmp, path)
    })();
    if result.is_err() {
        let _ = fs::remove_file(&tmp);
    }
    Ok(result?)
}

/// Store rooted at a directory, one file per key.
#[derive(Debug, Clone)]
pub struct FsArtifactStore {
    root: PathBuf,
}

impl FsArtifactStore {
    /// Creates the store; directories are created on first write.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &ArtifactKey) -> PathBuf {
        self.root.join(key.relative_path())
    }
}

impl ArtifactStore for FsArtifactStore {
    fn put(&self, key: &ArtifactKey, bytes: &[u8]) -> Result<(), EvalError> {
        write_atomic(&self.path_for(key), bytes)
    }

    fn get(&self, key: &ArtifactKey) -> Result<Vec<u8>, EvalError> {
        match fs::read(self.path_for(key)) {
            Ok(bytes) => Ok(bytes),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                Err(EvalError::CacheMiss(key.to_string()))
            }
            Err(err) => Err(err.into()),
        }
    }

    fn exists(&self, key: &ArtifactKey) -> Result<bool, EvalError> {
        Ok(self.path_for(key).is_file())
    }

    fn remove(&self, key: &ArtifactKey) -> Result<(), EvalError> {
        match fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    fn ground_truth_folds(&self) -> Result<Vec<FoldId>, EvalError> {
        let dir = self.root.join("ground_truth");
        if !dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut folds = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let name = entry?.file_name();
            let name = name.to_string_lossy();
            // Skips in-flight temp files, which start with a dot.
            if let Some(suffix) = name.strip_prefix(GROUND_TRUTH_VALID_PREFIX) {
                if let Ok(fold) = suffix.parse::<FoldId>() {
                    folds.push(fold);
                }
            }
        }
        folds.sort();
        Ok(folds)
    }

    fn purge_model(&self, model: &ModelId) -> Result<(), EvalError> {
        match fs::remove_dir_all(self.root.join("models").join(model.as_str())) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifacts::ArtifactKind;
    use tempfile::tempdir;

    #[test]
    fn missing_key_is_cache_miss_then_put_get_returns_bytes() {
        let dir = tempdir().unwrap();
        let store = FsArtifactStore::new(dir.path());
        let fold = FoldId::from_fit_indices(&[3, 1, 4]);
        let key = ArtifactKey::model(&ModelId::new("m1"), &fold, ArtifactKind::Model);

        assert!(store.get(&key).unwrap_err().is_cache_miss());
        assert!(!store.exists(&key).unwrap());

        store.put(&key, b"\x00\x01binary").unwrap();
        assert_eq!(store.get(&key).unwrap(), b"\x00\x01binary");
        assert!(store.exists(&key).unwrap());
        assert!(dir
            .path()
            .join("models/m1")
            .join(format!("model_{fold}"))
            .is_file());
    }

    #[test]
    fn overwrite_leaves_no_temp_files() {
        let dir = tempdir().unwrap();
        let store = FsArtifactStore::new(dir.path());
        let fold = FoldId::from_fit_indices(&[0]);
        let key = ArtifactKey::model(&ModelId::new("m"), &fold, ArtifactKind::Valid);
        store.put(&key, b"stale").unwrap();
        store.put(&key, b"fresh").unwrap();
        assert_eq!(store.get(&key).unwrap(), b"fresh");
        let files: Vec<_> = fs::read_dir(dir.path().join("models/m"))
            .unwrap()
            .map(|entry| entry.unwrap().file_name())
            .collect();
        assert_eq!(files.len(), 1);
    }

    #[test]
    fn remove_is_idempotent() {
        let dir = tempdir().unwrap();
        let store = FsArtifactStore::new(dir.path());
        let key = ArtifactKey::GroundTruthTest;
        store.remove(&key).unwrap();
        store.put(&key, b"[]").unwrap();
        store.remove(&key).unwrap();
        assert!(!store.exists(&key).unwrap());
    }

    #[test]
    fn purge_drops_one_model_only() {
        let dir = tempdir().unwrap();
        let store = FsArtifactStore::new(dir.path());
        let fold = FoldId::from_fit_indices(&[5]);
        let stale = ArtifactKey::model(&ModelId::new("old"), &fold, ArtifactKind::Model);
        let kept = ArtifactKey::model(&ModelId::new("other"), &fold, ArtifactKind::Model);
        store.put(&stale, b"x").unwrap();
        store.put(&kept, b"y").unwrap();
        store.purge_model(&ModelId::new("old")).unwrap();
        store.purge_model(&ModelId::new("never")).unwrap();
        assert!(!store.exists(&stale).unwrap());
        assert!(store.exists(&kept).unwrap());
    }

    #[test]
    fn lists_ground_truth_folds_sorted() {
        let dir = tempdir().unwrap();
        let store = FsArtifactStore::new(dir.path());
        let a = FoldId::from_fit_indices(&[1]);
        let b = FoldId::from_fit_indices(&[2]);
        store.put(&ArtifactKey::GroundTruthValid(b.clone()), b"[]").unwrap();
        store.put(&ArtifactKey::GroundTruthValid(a.clone()), b"[]").unwrap();
        store.put(&ArtifactKey::GroundTruthTest, b"[]").unwrap();
        let mut expected = vec![a, b];
        expected.sort();
        assert_eq!(store.ground_truth_folds().unwrap(), expected);
    }
}
