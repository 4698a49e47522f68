//! Candidate identity and extracted-text types.
//!
//! The pipeline never keys results on raw upload names. An [`IdentityResolver`]
//! turns the uploaded file name into a stable id plus a display name, and
//! text extraction hands over an [`ExtractionError`]-aware outcome so "no text"
//! and "extraction failed" stay distinguishable.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::path::Path;

/// Hex characters of the file-name digest used as the default id
const DEFAULT_ID_LEN: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CandidateIdentity {
    pub candidate_id: String,
    pub display_name: String,
}

pub trait IdentityResolver: Send + Sync {
    fn resolve(&self, file_name: &str) -> CandidateIdentity;
}

/// Default resolver: id from a SHA-256 prefix of the file name, display name
/// from the file stem.
#[derive(Debug, Clone, Default)]
pub struct FileNameResolver;

impl IdentityResolver for FileNameResolver {
    fn resolve(&self, file_name: &str) -> CandidateIdentity {
        let base = Path::new(file_name)
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(file_name);

        let mut candidate_id = hex::encode(Sha256::digest(base.as_bytes()));
        candidate_id.truncate(DEFAULT_ID_LEN);

        let display_name = strip_known_extension(base).to_string();
        CandidateIdentity {
            candidate_id,
            display_name,
        }
    }
}

fn strip_known_extension(name: &str) -> &str {
    for ext in [".pdf", ".PDF", ".txt", ".TXT"] {
        if let Some(stem) = name.strip_suffix(ext) {
            return stem;
        }
    }
    name
}

/// Why a candidate produced no usable text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "reason", rename_all = "snake_case")]
pub enum ExtractionError {
    /// The document was read but contained no text
    Empty,
    /// The extractor itself failed (OCR error, unreadable file)
    Failed(String),
}

impl fmt::Display for ExtractionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "no text extracted"),
            Self::Failed(reason) => write!(f, "extraction failed: {reason}"),
        }
    }
}

impl std::error::Error for ExtractionError {}

/// Outcome of text extraction for one document
pub type ExtractedText = std::result::Result<String, ExtractionError>;

/// Treat whitespace-only text as [`ExtractionError::Empty`]
pub fn non_empty_text(text: impl Into<String>) -> ExtractedText {
    let text = text.into();
    if text.trim().is_empty() {
        Err(ExtractionError::Empty)
    } else {
        Ok(text)
    }
}

/// A candidate handed to the pipeline
#[derive(Debug, Clone)]
pub struct CandidateInput {
    pub identity: CandidateIdentity,
    pub text: ExtractedText,
}

impl CandidateInput {
    pub fn new(identity: CandidateIdentity, text: ExtractedText) -> Self {
        Self { identity, text }
    }

    /// Resolve `file_name` and normalize the text
    pub fn from_file(resolver: &dyn IdentityResolver, file_name: &str, text: ExtractedText) -> Self {
        Self {
            identity: resolver.resolve(file_name),
            text: text.and_then(non_empty_text),
        }
    }

    pub fn id(&self) -> &str {
        &self.identity.candidate_id
    }
}
