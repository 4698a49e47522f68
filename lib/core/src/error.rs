use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Embedding unavailable: {0}")]
    EmbeddingUnavailable(String),

    #[error("Zero-norm vector: {0}")]
    ZeroVector(String),

    #[error("Empty input: {0}")]
    EmptyInput(String),

    #[error("Ranking model not found: {}", .0.display())]
    ModelNotFound(PathBuf),

    #[error("Corrupt ranking model: {0}")]
    CorruptModel(String),

    #[error("Truncated response: {0}")]
    TruncatedResponse(String),

    #[error("Invalid vector dimension: expected {expected}, got {actual}")]
    InvalidDimension { expected: usize, actual: usize },

    #[error("Feature mismatch: {0}")]
    FeatureMismatch(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl From<regex::Error> for Error {
    fn from(e: regex::Error) -> Self {
        Error::InvalidConfig(e.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl Error {
    /// Whether the failure only concerns a single candidate and the batch can continue.
    pub fn is_per_candidate(&self) -> bool {
        matches!(self, Error::ZeroVector(_) | Error::TruncatedResponse(_))
    }
}
