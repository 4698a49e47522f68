//! HR-facing explanation text and the external explanation-generator boundary.

use crate::attribution::{AttributionRecord, Contributor};
use fairrank_core::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt::Write as _;
use tracing::warn;

/// Factors listed per section in HR text
const FACTORS_PER_SECTION: usize = 3;

/// Render an attribution as plain text for a hiring manager
pub fn format_explanation_for_hr(
    record: &AttributionRecord,
    candidate_name: &str,
    job_title: &str,
) -> String {
    let positive: Vec<&Contributor> = record.positive().collect();
    let negative: Vec<&Contributor> = record.negative().collect();

    let mut text = String::new();
    let _ = writeln!(text, "Candidate: {candidate_name}");
    let _ = writeln!(text, "Position: {job_title}");
    let _ = writeln!(
        text,
        "Match Score: {:.2} (average is {:.2})\n",
        record.prediction, record.base_value
    );
    text.push_str(&format_factors("Strengths", &positive, true));
    text.push_str(&format_factors("Concerns", &negative, false));
    text
}

fn format_factors(title: &str, factors: &[&Contributor], strengths: bool) -> String {
    if factors.is_empty() {
        return format!("{title}:\n• No significant factors identified\n");
    }
    let mut out = format!("{title}:\n");
    for factor in factors.iter().take(FACTORS_PER_SECTION) {
        let verb = if strengths { "Contributes +" } else { "Decreases by " };
        let _ = writeln!(out, "• {}: {verb}{:.3}", factor.feature, factor.impact.abs());
    }
    out
}

/// `"Feature (+0.123), Other (-0.050)"`, or `"None"`
pub fn format_contributors(contributors: &[Contributor]) -> String {
    if contributors.is_empty() {
        return "None".to_string();
    }
    contributors
        .iter()
        .map(|c| format!("{} ({:+.3})", c.feature, c.impact))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Everything a generator sees about one candidate
#[derive(Debug, Clone)]
pub struct ExplanationRequest<'a> {
    pub job_description: &'a str,
    pub candidate_text: &'a str,
    pub score: f64,
    pub top_positive: Vec<Contributor>,
    pub top_negative: Vec<Contributor>,
    /// [`format_contributors`] over `top_positive`
    pub positive_summary: String,
    pub negative_summary: String,
    pub bias_score: f64,
}

impl<'a> ExplanationRequest<'a> {
    pub fn new(
        job_description: &'a str,
        candidate_text: &'a str,
        score: f64,
        attribution: &AttributionRecord,
        bias_score: f64,
    ) -> Self {
        let top_positive: Vec<Contributor> = attribution.positive().cloned().collect();
        let top_negative: Vec<Contributor> = attribution.negative().cloned().collect();
        Self {
            job_description,
            candidate_text,
            score,
            positive_summary: format_contributors(&top_positive),
            negative_summary: format_contributors(&top_negative),
            top_positive,
            top_negative,
            bias_score,
        }
    }
}

/// External text-generation service producing a structured evaluation.
///
/// An `{"error": ...}` payload or [`Error::TruncatedResponse`] is treated as a
/// failure for that candidate only.
pub trait ExplanationGenerator: Send + Sync {
    fn generate(&self, request: &ExplanationRequest<'_>) -> Result<Value>;
}

/// Generated payload or a per-candidate error marker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ExplanationOutcome {
    Degraded { error: String },
    Generated(Value),
}

impl ExplanationOutcome {
    pub fn is_degraded(&self) -> bool {
        matches!(self, Self::Degraded { .. })
    }
}

/// Call the generator, folding failures into a degraded outcome
pub fn generate_explanation(
    generator: &dyn ExplanationGenerator,
    request: &ExplanationRequest<'_>,
) -> ExplanationOutcome {
    match generator.generate(request) {
        Ok(Value::Object(map)) if map.contains_key("error") => {
            let error = match map.get("error") {
                Some(Value::String(s)) => s.clone(),
                Some(other) => other.to_string(),
                None => String::new(),
            };
            warn!(%error, "Explanation service reported an error");
            ExplanationOutcome::Degraded { error }
        }
        Ok(payload) => ExplanationOutcome::Generated(payload),
        Err(Error::TruncatedResponse(reason)) => {
            warn!(%reason, "Explanation payload truncated");
            ExplanationOutcome::Degraded {
                error: format!("Explanation truncated: {reason}"),
            }
        }
        Err(e) => {
            warn!(error = %e, "Explanation unavailable");
            ExplanationOutcome::Degraded {
                error: format!("Explanation unavailable: {e}"),
            }
        }
    }
}

/// Per-candidate explanation as persisted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateExplanation {
    pub id: String,
    pub rank: usize,
    pub candidate: String,
    pub similarity_score: f64,
    pub bias_score: f64,
    pub explanation: ExplanationOutcome,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record() -> AttributionRecord {
        AttributionRecord {
            base_value: 0.41,
            prediction: 0.8,
            contributors: vec![
                Contributor { feature: "Skill: Python".into(), impact: 0.25, value: 2.0, positive: true },
                Contributor { feature: "Concept Gap 3".into(), impact: -0.05, value: 0.4, positive: false },
                Contributor { feature: "Overall CV-Job Similarity".into(), impact: 0.19, value: 0.7, positive: true },
            ],
        }
    }

    struct Fixed(Result<Value>);

    impl ExplanationGenerator for Fixed {
        fn generate(&self, _request: &ExplanationRequest<'_>) -> Result<Value> {
            match &self.0 {
                Ok(v) => Ok(v.clone()),
                Err(Error::TruncatedResponse(r)) => Err(Error::TruncatedResponse(r.clone())),
                Err(e) => Err(Error::EmbeddingUnavailable(e.to_string())),
            }
        }
    }

    #[test]
    fn test_hr_text() {
        let text = format_explanation_for_hr(&record(), "jane_doe", "Data Scientist");
        assert!(text.starts_with("Candidate: jane_doe\nPosition: Data Scientist\n"));
        assert!(text.contains("Match Score: 0.80 (average is 0.41)"));
        assert!(text.contains("Strengths:\n• Skill: Python: Contributes +0.250\n"));
        assert!(text.contains("Concerns:\n• Concept Gap 3: Decreases by 0.050\n"));
    }

    #[test]
    fn test_hr_text_without_concerns() {
        let mut r = record();
        r.contributors.retain(|c| c.positive);
        let text = format_explanation_for_hr(&r, "a", "b");
        assert!(text.ends_with("Concerns:\n• No significant factors identified\n"));
    }

    #[test]
    fn test_format_contributors() {
        let r = record();
        let pos: Vec<Contributor> = r.positive().cloned().collect();
        assert_eq!(
            format_contributors(&pos),
            "Skill: Python (+0.250), Overall CV-Job Similarity (+0.190)"
        );
        assert_eq!(format_contributors(&[]), "None");
    }

    struct Echo;

    impl ExplanationGenerator for Echo {
        fn generate(&self, request: &ExplanationRequest<'_>) -> Result<Value> {
            Ok(json!({
                "strengths": request.positive_summary,
                "weaknesses": request.negative_summary,
            }))
        }
    }

    #[test]
    fn test_request_carries_contributor_summaries() {
        let mut r = record();
        let request = ExplanationRequest::new("job", "cv", 0.8, &r, 0.0);
        let outcome = generate_explanation(&Echo, &request);
        assert_eq!(
            outcome,
            ExplanationOutcome::Generated(json!({
                "strengths": "Skill: Python (+0.250), Overall CV-Job Similarity (+0.190)",
                "weaknesses": "Concept Gap 3 (-0.050)",
            }))
        );

        r.contributors.retain(|c| c.positive);
        let request = ExplanationRequest::new("job", "cv", 0.8, &r, 0.0);
        assert_eq!(request.negative_summary, "None");
    }

    #[test]
    fn test_generator_outcomes() {
        let r = record();
        let request = ExplanationRequest::new("job", "cv", 0.8, &r, 0.0);
        assert_eq!(request.top_positive.len(), 2);

        let ok = generate_explanation(&Fixed(Ok(json!({"summary": "solid"}))), &request);
        assert_eq!(ok, ExplanationOutcome::Generated(json!({"summary": "solid"})));

        let flagged = generate_explanation(&Fixed(Ok(json!({"error": "quota"}))), &request);
        assert_eq!(flagged, ExplanationOutcome::Degraded { error: "quota".into() });

        let cut = generate_explanation(&Fixed(Err(Error::TruncatedResponse("eof".into()))), &request);
        assert!(cut.is_degraded());
    }

    #[test]
    fn test_outcome_serialization() {
        let degraded = ExplanationOutcome::Degraded { error: "offline".into() };
        assert_eq!(serde_json::to_value(&degraded).unwrap(), json!({"error": "offline"}));
        let back: ExplanationOutcome = serde_json::from_value(json!({"error": "offline"})).unwrap();
        assert!(back.is_degraded());
        let generated: ExplanationOutcome = serde_json::from_value(json!({"summary": "ok"})).unwrap();
        assert!(!generated.is_degraded());
    }
}
