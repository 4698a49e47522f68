// Persisted ranking model keyed by the job-description hash
use crate::context::write_json_atomic;
use fairrank_core::{Error, Result};
use fairrank_model::RankingModel;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredModel {
    pub job_hash: String,
    /// Written inline as `feature_names` and `estimator`
    #[serde(flatten)]
    pub model: RankingModel,
}

#[derive(Debug, Clone)]
pub struct ModelStore {
    path: PathBuf,
}

impl ModelStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    pub fn save(&self, job_hash: &str, model: &RankingModel) -> Result<()> {
        let stored = StoredModel {
            job_hash: job_hash.to_string(),
            model: model.clone(),
        };
        write_json_atomic(&self.path, &stored)?;
        info!("Model saved to {}", self.path.display());
        Ok(())
    }

    /// Fails with `ModelNotFound` when absent and `CorruptModel` when unreadable
    pub fn load(&self) -> Result<StoredModel> {
        if !self.path.exists() {
            return Err(Error::ModelNotFound(self.path.clone()));
        }
        let data = fs::read(&self.path)?;
        let stored: StoredModel = serde_json::from_slice(&data)
            .map_err(|e| Error::CorruptModel(format!("{}: {e}", self.path.display())))?;
        stored.model.validate()?;
        Ok(stored)
    }

    /// Like [`ModelStore::load`] but a missing file is `Ok(None)`
    pub fn load_optional(&self) -> Result<Option<StoredModel>> {
        match self.load() {
            Ok(stored) => Ok(Some(stored)),
            Err(Error::ModelNotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }
}
