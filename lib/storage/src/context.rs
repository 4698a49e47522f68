// On-disk layout for one job's artifacts
use atomicwrites::{AllowOverwrite, AtomicFile};
use fairrank_core::{Error, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

pub const RANKING_FILE: &str = "ranking_results.json";
pub const SHAP_FILE: &str = "shap_explanations.json";
pub const BIAS_FILE: &str = "gender_bias_analysis.json";
pub const EXPLANATIONS_FILE: &str = "explanations.json";
pub const KEYWORDS_FILE: &str = "keywords.json";
pub const MODEL_FILE: &str = "ranking_model.json";

/// Resolves artifact paths under `<root>/reports` and `<root>/models`
#[derive(Debug, Clone)]
pub struct PersistenceContext {
    root: PathBuf,
    reports_dir: PathBuf,
    models_dir: PathBuf,
}

impl PersistenceContext {
    /// Create the directory layout if missing
    pub fn new<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        let reports_dir = root.join("reports");
        let models_dir = root.join("models");
        fs::create_dir_all(&reports_dir)?;
        fs::create_dir_all(&models_dir)?;
        Ok(Self {
            root,
            reports_dir,
            models_dir,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn reports_dir(&self) -> &Path {
        &self.reports_dir
    }

    pub fn models_dir(&self) -> &Path {
        &self.models_dir
    }

    pub fn ranking_path(&self) -> PathBuf {
        self.reports_dir.join(RANKING_FILE)
    }

    pub fn shap_path(&self) -> PathBuf {
        self.reports_dir.join(SHAP_FILE)
    }

    pub fn bias_path(&self) -> PathBuf {
        self.reports_dir.join(BIAS_FILE)
    }

    pub fn explanations_path(&self) -> PathBuf {
        self.reports_dir.join(EXPLANATIONS_FILE)
    }

    pub fn keywords_path(&self) -> PathBuf {
        self.models_dir.join(KEYWORDS_FILE)
    }

    pub fn model_path(&self) -> PathBuf {
        self.models_dir.join(MODEL_FILE)
    }
}

/// Serialize as pretty JSON and replace `path` atomically
pub fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut data = serde_json::to_vec_pretty(value)?;
    data.push(b'\n');

    AtomicFile::new(path, AllowOverwrite)
        .write(|f| f.write_all(&data))
        .map_err(|e| Error::Storage(format!("failed to write {}: {e}", path.display())))
}

/// Read a JSON document, `None` if the file does not exist
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    if !path.exists() {
        return Ok(None);
    }
    let data = fs::read(path)?;
    let value = serde_json::from_slice(&data)
        .map_err(|e| Error::Serialization(format!("{}: {e}", path.display())))?;
    Ok(Some(value))
}
