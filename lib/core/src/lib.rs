//! # fairrank Core
//!
//! Core library for the fairrank candidate ranking pipeline.
//!
//! This crate provides the data types and the vector-space stages:
//!
//! - [`EmbeddingVector`] - Dense embedding with cosine similarity
//! - [`Embedder`] - Text -> vector adapter, with [`HashingEmbedder`] as the in-process default
//! - [`BiasSubspace`] - Gender bias directions and subspace projection
//! - [`FeatureBuilder`] - Feature records and column-aligned [`FeatureTable`]s
//! - [`text`] - Tokenizing, keyword counting and gendered-language analysis
//!
//! ## Example
//!
//! ```rust
//! use fairrank_core::{BiasSubspace, EmbedOptions, Embedder, FeatureBuilder, HashingEmbedder};
//! use fairrank_core::debias::DEFAULT_GENDER_WORD_PAIRS;
//!
//! let embedder = HashingEmbedder::new(64);
//! let options = EmbedOptions::default();
//! let subspace = BiasSubspace::compute(&embedder, DEFAULT_GENDER_WORD_PAIRS, &options).unwrap();
//!
//! let job = embedder.embed("Python developer", &options).unwrap();
//! let cv = embedder.embed("Python, pandas and machine learning", &options).unwrap();
//! let cv = subspace.debias(&cv, 0.5).unwrap();
//!
//! let builder = FeatureBuilder::new(16, vec!["python".to_string()]).unwrap();
//! let record = builder.build(&job, &cv, Some("Python, pandas")).unwrap();
//! assert_eq!(record.get("skill_python"), Some(1.0));
//! ```

pub mod candidate;
pub mod debias;
pub mod embedder;
pub mod error;
pub mod features;
pub mod text;
pub mod vector;

pub use candidate::{
    CandidateIdentity, CandidateInput, ExtractedText, ExtractionError, FileNameResolver,
    IdentityResolver,
};
pub use debias::{compute_bias_subspace, BiasSubspace};
pub use embedder::{EmbedOptions, Embedder, EmbedderInfo, HashingEmbedder, Pooling};
pub use error::{Error, Result};
pub use features::{
    build_feature_dataset, build_feature_vector, CandidateVector, FeatureBuilder, FeatureRecord,
    FeatureSchema, FeatureTable,
};
pub use vector::EmbeddingVector;
