//! # fairrank
//!
//! Explainable, debiased ranking of candidate resumes against a job description.
//!
//! fairrank embeds the job and every resume, removes the gender direction from
//! the resume embeddings, scores each candidate with a gradient-boosted model and
//! decomposes every score into additive per-feature contributions. Results are
//! merged into per-job JSON reports that can be re-run safely on overlapping
//! candidate sets.
//!
//! ## Quick Start
//!
//! ### From the command line
//!
//! ```bash
//! fairrank --job-description job.txt --candidates-dir ./cvs --job-id backend-2024 --lambda-bias 1.0
//! ```
//!
//! ### As a Library
//!
//! ```rust,no_run
//! use fairrank::prelude::*;
//! use std::sync::Arc;
//!
//! let config = PipelineConfig::new(1.0);
//! let context = PersistenceContext::new("./output/job-42").unwrap();
//! let pipeline = Pipeline::new(config, Arc::new(HashingEmbedder::default()), context).unwrap();
//!
//! let resolver = FileNameResolver;
//! let candidates = vec![
//!     CandidateInput::from_file(&resolver, "jane.txt", Ok("Python, machine learning, pandas".into())),
//!     CandidateInput::from_file(&resolver, "john.txt", Ok("Forklift operator".into())),
//! ];
//! let report = pipeline
//!     .run("Looking for a Python developer with ML experience", &candidates)
//!     .unwrap();
//! for ranked in &report.rankings {
//!     println!("{}. {} - {:.4}", ranked.rank, ranked.display_name, ranked.score);
//! }
//! ```
//!
//! ## Crate Structure
//!
//! - [`fairrank-core`](fairrank_core) - Embeddings, debiasing, text analysis, feature tables
//! - [`fairrank-model`](fairrank_model) - Gradient-boosted trees, grid search, ranking model
//! - [`fairrank-explain`](fairrank_explain) - TreeSHAP attributions and HR summaries
//! - [`fairrank-storage`](fairrank_storage) - Idempotent report merging and model store

pub mod config;
pub mod pipeline;

pub use config::{PipelineConfig, DEFAULT_SKILLS};
pub use pipeline::{
    display_ranking, KeywordExtractor, Pipeline, PipelineReport, RankedCandidate, ScoredCandidate,
    SkillListExtractor, SkippedCandidate,
};

// Re-export core types
pub use fairrank_core::{
    BiasSubspace, CandidateIdentity, CandidateInput, EmbedOptions, Embedder, EmbeddingVector,
    Error, ExtractedText, ExtractionError, FeatureBuilder, FeatureTable, FileNameResolver,
    HashingEmbedder, IdentityResolver, Pooling, Result,
};

// Re-export model, explanations and storage
pub use fairrank_explain::{
    format_explanation_for_hr, AttributionRecord, CandidateExplanation, Contributor,
    ExplanationGenerator, ExplanationOutcome, ExplanationRequest,
};
pub use fairrank_model::{RankingModel, TrainConfig, TrainReport};
pub use fairrank_storage::{ModelStore, PersistenceContext, ReportArtifact};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::{
        CandidateInput, Embedder, Error, FileNameResolver, HashingEmbedder, IdentityResolver,
        PersistenceContext, Pipeline, PipelineConfig, PipelineReport, Result,
    };
}
