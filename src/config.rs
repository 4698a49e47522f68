//! Pipeline configuration, loadable from a JSON file.

use fairrank_core::debias::default_gender_word_pairs;
use fairrank_core::features::DEFAULT_SAMPLE_DIMS;
use fairrank_core::{EmbedOptions, Error, Result};
use fairrank_explain::DEFAULT_TOP_CONTRIBUTORS;
use fairrank_model::TrainConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Skill universe matched against job and candidate texts
pub const DEFAULT_SKILLS: &[&str] = &[
    "python", "nlp", "machine learning", "deep learning", "data science", "statistics",
    "tensorflow", "pytorch", "sklearn", "pandas", "numpy", "language models",
    "neural networks", "algorithms", "ai", "computer vision", "data visualization",
    "big data", "spark", "sql", "database", "cloud", "aws", "azure", "gcp", "kubernetes",
    "docker", "git", "ci/cd",
];

pub const DEFAULT_EXPLANATION_TOP_N: usize = 5;

fn default_sample_dims() -> usize {
    DEFAULT_SAMPLE_DIMS
}

fn default_top_contributors() -> usize {
    DEFAULT_TOP_CONTRIBUTORS
}

fn default_explanation_top_n() -> usize {
    DEFAULT_EXPLANATION_TOP_N
}

fn default_skill_keywords() -> Vec<String> {
    DEFAULT_SKILLS.iter().map(|s| s.to_string()).collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Debiasing strength in `[0, 1]`; no default
    pub lambda_bias: f32,
    #[serde(default)]
    pub embedding: EmbedOptions,
    #[serde(default = "default_sample_dims")]
    pub sample_dims: usize,
    #[serde(default = "default_top_contributors")]
    pub top_contributors: usize,
    #[serde(default = "default_explanation_top_n")]
    pub explanation_top_n: usize,
    #[serde(default = "default_skill_keywords")]
    pub skill_keywords: Vec<String>,
    #[serde(default = "default_gender_word_pairs")]
    pub gender_word_pairs: Vec<(String, String)>,
    #[serde(default)]
    pub training: TrainConfig,
}

impl PipelineConfig {
    /// Defaults for everything except the debiasing strength
    pub fn new(lambda_bias: f32) -> Self {
        Self {
            lambda_bias,
            embedding: EmbedOptions::default(),
            sample_dims: DEFAULT_SAMPLE_DIMS,
            top_contributors: DEFAULT_TOP_CONTRIBUTORS,
            explanation_top_n: DEFAULT_EXPLANATION_TOP_N,
            skill_keywords: default_skill_keywords(),
            gender_word_pairs: default_gender_word_pairs(),
            training: TrainConfig::default(),
        }
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let data = std::fs::read(path)?;
        let config: Self = serde_json::from_slice(&data)
            .map_err(|e| Error::InvalidConfig(format!("{}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.lambda_bias) {
            return Err(Error::InvalidConfig(format!(
                "lambda_bias must be in [0, 1], got {}",
                self.lambda_bias
            )));
        }
        if self.sample_dims == 0 {
            return Err(Error::InvalidConfig("sample_dims must be positive".to_string()));
        }
        if self.embedding.max_length == 0 {
            return Err(Error::InvalidConfig("embedding.max_length must be positive".to_string()));
        }
        if self.gender_word_pairs.is_empty() {
            return Err(Error::InvalidConfig("gender_word_pairs is empty".to_string()));
        }
        self.training.validate()
    }
}
