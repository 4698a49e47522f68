//! Embedding Adapter
//!
//! The transformer model itself lives outside this crate; the pipeline only
//! consumes a text -> vector function through the [`Embedder`] trait.
//! [`HashingEmbedder`] is a deterministic in-process implementation used by the
//! CLI and tests.

use crate::text::tokenize;
use crate::vector::EmbeddingVector;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use fnv::FnvHasher;
use std::fmt;
use std::hash::Hasher;

/// Default token window, matching BERT-style encoders
pub const DEFAULT_MAX_LENGTH: usize = 512;

/// Default dimension of the hashing embedder
pub const DEFAULT_HASHING_DIM: usize = 384;

/// How token states are reduced to a single vector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Pooling {
    #[default]
    Cls,
    Mean,
}

impl fmt::Display for Pooling {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cls => write!(f, "cls"),
            Self::Mean => write!(f, "mean"),
        }
    }
}

/// Per-call embedding options
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EmbedOptions {
    #[serde(default = "default_max_length")]
    pub max_length: usize,
    #[serde(default)]
    pub pooling: Pooling,
}

fn default_max_length() -> usize {
    DEFAULT_MAX_LENGTH
}

impl Default for EmbedOptions {
    fn default() -> Self {
        Self {
            max_length: DEFAULT_MAX_LENGTH,
            pooling: Pooling::Cls,
        }
    }
}

#[derive(Debug, Clone)]
pub struct EmbedderInfo {
    pub name: String,
    pub dimension: usize,
}

/// Text -> fixed-length vector.
///
/// Implementations truncate/pad to `max_length` and fail with
/// [`Error::EmbeddingUnavailable`] for empty text or an unreachable backend.
/// Calls may block for a long time; there is no built-in timeout.
pub trait Embedder: Send + Sync {
    fn info(&self) -> EmbedderInfo;

    fn embed(&self, text: &str, options: &EmbedOptions) -> Result<EmbeddingVector>;

    fn dimension(&self) -> usize {
        self.info().dimension
    }
}

/// Deterministic feature-hashing embedder.
///
/// Words and character trigrams are hashed into vector positions; words
/// contribute more than trigrams. Two texts sharing vocabulary get a high
/// cosine similarity, unrelated texts a low one.
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dim: usize,
}

impl HashingEmbedder {
    pub fn new(dim: usize) -> Self {
        Self { dim: dim.max(1) }
    }

    /// FNV-1a over the UTF-8 bytes, so buckets never move between builds
    fn bucket(&self, feature: &str) -> usize {
        let mut hasher = FnvHasher::default();
        hasher.write(feature.as_bytes());
        (hasher.finish() % self.dim as u64) as usize
    }
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self::new(DEFAULT_HASHING_DIM)
    }
}

impl Embedder for HashingEmbedder {
    fn info(&self) -> EmbedderInfo {
        EmbedderInfo {
            name: "feature-hashing".to_string(),
            dimension: self.dim,
        }
    }

    fn embed(&self, text: &str, options: &EmbedOptions) -> Result<EmbeddingVector> {
        let tokens: Vec<String> = tokenize(text).into_iter().take(options.max_length).collect();
        if tokens.is_empty() {
            return Err(Error::EmbeddingUnavailable(
                "cannot embed empty text".to_string(),
            ));
        }

        let mut vector = vec![0.0f32; self.dim];
        for token in &tokens {
            vector[self.bucket(token)] += 2.0; // Words contribute more

            for trigram in trigrams(token) {
                vector[self.bucket(&trigram)] += 1.0;
            }
        }

        let mut embedding = EmbeddingVector::new(vector);
        match options.pooling {
            Pooling::Cls => embedding.normalize(),
            Pooling::Mean => {
                let n = tokens.len() as f32;
                embedding = EmbeddingVector::new(
                    embedding.as_slice().iter().map(|v| v / n).collect(),
                );
            }
        }
        Ok(embedding)
    }
}

/// Character trigrams of a padded word
fn trigrams(word: &str) -> Vec<String> {
    let padded: Vec<char> = format!(" {word} ").chars().collect();
    if padded.len() < 3 {
        return Vec::new();
    }
    padded.windows(3).map(|w| w.iter().collect()).collect()
}
