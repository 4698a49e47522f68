// Job-description hash and the keyword list it produced
use crate::artifact::new_analysis_id;
use crate::context::{read_json, write_json_atomic};
use fairrank_core::text::strip_html;
use fairrank_core::Result;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::Path;
use tracing::info;

pub const KEYWORDS_KIND: &str = "keywords";

/// SHA-256 hex digest of the HTML-stripped job description
pub fn content_hash(job_description: &str) -> String {
    hex::encode(Sha256::digest(strip_html(job_description).as_bytes()))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeywordsArtifact {
    pub analysis_id: String,
    pub job_hash: String,
    pub keywords: Vec<String>,
}

impl KeywordsArtifact {
    pub fn load(path: &Path) -> Result<Option<Self>> {
        read_json(path)
    }

    /// Write the keyword list for `job_hash`, reusing the analysis id of any
    /// previous artifact at `path`.
    pub fn store(path: &Path, job_hash: &str, keywords: Vec<String>) -> Result<Self> {
        let analysis_id = match Self::load(path) {
            Ok(Some(previous)) => previous.analysis_id,
            _ => new_analysis_id(KEYWORDS_KIND),
        };
        let artifact = Self {
            analysis_id,
            job_hash: job_hash.to_string(),
            keywords,
        };
        write_json_atomic(path, &artifact)?;
        info!(keywords = artifact.keywords.len(), "Saved keywords to {}", path.display());
        Ok(artifact)
    }

    pub fn matches(&self, job_hash: &str) -> bool {
        self.job_hash == job_hash
    }
}
