//! # fairrank Explain
//!
//! Per-candidate explanations for ranking scores.
//!
//! - [`treeshap`] - Exact path-dependent TreeSHAP over the boosted ensemble
//! - [`explain`] - Additive attribution records with display names
//! - [`format_explanation_for_hr`] - Plain-text Strengths/Concerns summary
//! - [`ExplanationGenerator`] - Boundary to an external narrative service

pub mod attribution;
pub mod narrative;
pub mod treeshap;

pub use attribution::{
    display_name, explain, AttributionRecord, Contributor, DEFAULT_TOP_CONTRIBUTORS,
};
pub use narrative::{
    format_contributors, format_explanation_for_hr, generate_explanation, CandidateExplanation,
    ExplanationGenerator, ExplanationOutcome, ExplanationRequest,
};
