//! Concrete report entries: ranking, attributions, gender bias, explanations.

use crate::artifact::ReportEntry;
use fairrank_core::text::{bias_recommendation, GenderedTerms};
use fairrank_explain::{AttributionRecord, CandidateExplanation, Contributor};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;

/// Round half away from zero to `places` decimals
pub fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankingEntry {
    pub id: String,
    pub rank: usize,
    pub candidate_file: String,
    pub score: f64,
}

impl RankingEntry {
    pub fn new(id: impl Into<String>, rank: usize, candidate_file: impl Into<String>, score: f64) -> Self {
        Self {
            id: id.into(),
            rank,
            candidate_file: candidate_file.into(),
            score: round_to(score, 4),
        }
    }
}

impl ReportEntry for RankingEntry {
    const KIND: &'static str = "ranking";
    const ENTRIES_KEY: &'static str = "ranking";

    fn key(&self) -> &str {
        &self.id
    }

    fn label(&self) -> &str {
        &self.candidate_file
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShapEntry {
    pub id: String,
    pub candidate_file: String,
    pub base_value: f64,
    pub prediction: f64,
    pub contributors: Vec<Contributor>,
}

impl ShapEntry {
    pub fn new(id: impl Into<String>, candidate_file: impl Into<String>, record: &AttributionRecord) -> Self {
        Self {
            id: id.into(),
            candidate_file: candidate_file.into(),
            base_value: record.base_value,
            prediction: record.prediction,
            contributors: record.contributors.clone(),
        }
    }
}

impl ReportEntry for ShapEntry {
    const KIND: &'static str = "shap";
    const ENTRIES_KEY: &'static str = "shap";

    fn key(&self) -> &str {
        &self.id
    }

    fn label(&self) -> &str {
        &self.candidate_file
    }
}

/// Term frequencies, written as `"none"` when empty
mod terms_or_none {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::collections::BTreeMap;

    pub fn serialize<S: Serializer>(terms: &BTreeMap<String, usize>, s: S) -> Result<S::Ok, S::Error> {
        if terms.is_empty() {
            s.serialize_str("none")
        } else {
            terms.serialize(s)
        }
    }

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Counts(BTreeMap<String, usize>),
        Marker(String),
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<BTreeMap<String, usize>, D::Error> {
        Ok(match Repr::deserialize(d)? {
            Repr::Counts(counts) => counts,
            Repr::Marker(_) => BTreeMap::new(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BiasEntry {
    pub id: String,
    pub candidate_file: String,
    pub gender_bias_score: f64,
    #[serde(with = "terms_or_none")]
    pub male_terms: BTreeMap<String, usize>,
    #[serde(with = "terms_or_none")]
    pub female_terms: BTreeMap<String, usize>,
    pub recommendation: String,
}

impl BiasEntry {
    /// Entry for one candidate's text and precomputed bias score
    pub fn from_text(id: impl Into<String>, candidate_file: impl Into<String>, text: &str, score: f64) -> Self {
        let terms = GenderedTerms::detect(text);
        Self {
            id: id.into(),
            candidate_file: candidate_file.into(),
            gender_bias_score: round_to(score, 2),
            male_terms: terms.male,
            female_terms: terms.female,
            recommendation: bias_recommendation(score).to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BiasSummary {
    pub average_bias: f64,
    pub min_bias: f64,
    pub max_bias: f64,
    pub median_bias: f64,
    pub most_neutral_candidate: String,
    pub least_neutral_candidate: String,
}

impl BiasSummary {
    /// `None` for an empty entry list
    pub fn from_entries(entries: &[BiasEntry]) -> Option<Self> {
        let first = entries.first()?;
        let scores: Vec<f64> = entries.iter().map(|e| e.gender_bias_score).collect();

        // First entry wins ties on both ends
        let mut most = first;
        let mut least = first;
        for e in &entries[1..] {
            if e.gender_bias_score < most.gender_bias_score {
                most = e;
            }
            if e.gender_bias_score > least.gender_bias_score {
                least = e;
            }
        }

        Some(Self {
            average_bias: round_to(scores.iter().sum::<f64>() / scores.len() as f64, 2),
            min_bias: round_to(most.gender_bias_score, 2),
            max_bias: round_to(least.gender_bias_score, 2),
            median_bias: round_to(median(&scores), 2),
            most_neutral_candidate: most.candidate_file.clone(),
            least_neutral_candidate: least.candidate_file.clone(),
        })
    }
}

fn median(values: &[f64]) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

impl ReportEntry for BiasEntry {
    const KIND: &'static str = "gender_bias";
    const ENTRIES_KEY: &'static str = "candidate_analysis";

    fn key(&self) -> &str {
        &self.id
    }

    fn preamble() -> Map<String, Value> {
        let preamble = json!({
            "title": "Gender Bias Analysis Report",
            "understanding": {
                "description": "The Gender Bias Score measures the imbalance between masculine and feminine \
                    terms in the text. A score of 0 indicates perfect balance, while higher scores indicate \
                    more gender-specific language.",
                "calculation": "(|male_terms - female_terms| / total_words) * 100"
            },
            "recommendations": [
                "Use gender-neutral job titles (e.g., 'chairperson' instead of 'chairman/chairwoman').",
                "Replace gendered pronouns with 'they/them' where possible.",
                "Focus on skills and achievements rather than personal attributes.",
                "Review for unconscious bias in language describing leadership, technical skills, etc."
            ]
        });
        match preamble {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }

    fn summarize(entries: &[Self]) -> Option<Value> {
        match BiasSummary::from_entries(entries) {
            Some(summary) => serde_json::to_value(summary).ok(),
            None => Some(json!({})),
        }
    }
}

impl ReportEntry for CandidateExplanation {
    const KIND: &'static str = "explanations";
    const ENTRIES_KEY: &'static str = "explanations";

    fn key(&self) -> &str {
        &self.id
    }

    fn label(&self) -> &str {
        &self.candidate
    }
}
