pub mod artifact;
pub mod context;
pub mod keywords;
pub mod models;
pub mod reports;

pub use artifact::{merge_and_persist, MergeOutcome, ReportArtifact, ReportEntry};
pub use context::PersistenceContext;
pub use keywords::{content_hash, KeywordsArtifact};
pub use models::{ModelStore, StoredModel};
pub use reports::{BiasEntry, BiasSummary, RankingEntry, ShapEntry};
