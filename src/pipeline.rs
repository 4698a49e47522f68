//! End-to-end ranking run for one job.
//!
//! A run embeds the job and every candidate, projects the gender subspace out
//! of the candidate embeddings, builds an aligned feature table, scores it
//! with the persisted model (retraining when the job description changed),
//! attributes every score and merges the results into the job's reports.

use crate::config::PipelineConfig;
use fairrank_core::features::synthetic_labels;
use fairrank_core::text::{gender_bias_score, mitigate_gendered_language, strip_html, KeywordMatcher};
use fairrank_core::{
    BiasSubspace, CandidateIdentity, CandidateInput, CandidateVector, Embedder, Error,
    ExtractionError, FeatureBuilder, Result,
};
use fairrank_explain::{
    explain, generate_explanation, AttributionRecord, CandidateExplanation, ExplanationGenerator,
    ExplanationRequest,
};
use fairrank_model::{train, RankingModel, TrainReport};
use fairrank_storage::{
    content_hash, merge_and_persist, BiasEntry, KeywordsArtifact, ModelStore, PersistenceContext,
    RankingEntry, ReportArtifact, ShapEntry,
};
use rayon::prelude::*;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Picks the skill keywords a job description asks for.
///
/// In production this is a text-generation service; a payload it could not
/// finish is reported as [`Error::TruncatedResponse`].
pub trait KeywordExtractor: Send + Sync {
    fn extract(&self, job_description: &str) -> Result<Vec<String>>;
}

/// Whole-word matches a fixed skill universe against the job text
#[derive(Debug, Clone)]
pub struct SkillListExtractor {
    matchers: Vec<KeywordMatcher>,
}

impl SkillListExtractor {
    pub fn new(skills: Vec<String>) -> Result<Self> {
        let matchers = skills
            .iter()
            .map(|skill| KeywordMatcher::new(skill))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { matchers })
    }
}

impl KeywordExtractor for SkillListExtractor {
    fn extract(&self, job_description: &str) -> Result<Vec<String>> {
        Ok(self
            .matchers
            .iter()
            .filter(|m| m.is_match(job_description))
            .map(|m| m.keyword().to_string())
            .collect())
    }
}

/// A candidate left out of a run because it had no usable text
#[derive(Debug, Clone, Serialize)]
pub struct SkippedCandidate {
    pub identity: CandidateIdentity,
    pub reason: ExtractionError,
}

/// Score and attribution for one candidate, in input order
#[derive(Debug, Clone, Serialize)]
pub struct ScoredCandidate {
    pub identity: CandidateIdentity,
    pub score: f64,
    pub bias_score: f64,
    pub attribution: AttributionRecord,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedCandidate {
    pub rank: usize,
    pub candidate_id: String,
    pub display_name: String,
    pub score: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct PipelineReport {
    pub job_hash: String,
    pub retrained: bool,
    pub keywords: Vec<String>,
    pub training: Option<TrainReport>,
    pub candidates: Vec<ScoredCandidate>,
    pub rankings: Vec<RankedCandidate>,
    pub skipped: Vec<SkippedCandidate>,
    pub explanations: Vec<CandidateExplanation>,
}

impl PipelineReport {
    /// Scores of the scored candidates, in input order
    pub fn predictions(&self) -> Vec<f64> {
        self.candidates.iter().map(|c| c.score).collect()
    }
}

pub struct Pipeline {
    config: PipelineConfig,
    embedder: Arc<dyn Embedder>,
    extractor: Box<dyn KeywordExtractor>,
    generator: Option<Box<dyn ExplanationGenerator>>,
    context: PersistenceContext,
}

impl Pipeline {
    pub fn new(
        config: PipelineConfig,
        embedder: Arc<dyn Embedder>,
        context: PersistenceContext,
    ) -> Result<Self> {
        config.validate()?;
        let extractor = Box::new(SkillListExtractor::new(config.skill_keywords.clone())?);
        Ok(Self {
            config,
            embedder,
            extractor,
            generator: None,
            context,
        })
    }

    pub fn with_keyword_extractor(mut self, extractor: Box<dyn KeywordExtractor>) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn with_explanation_generator(mut self, generator: Box<dyn ExplanationGenerator>) -> Self {
        self.generator = Some(generator);
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn context(&self) -> &PersistenceContext {
        &self.context
    }

    /// Rank `candidates` against `job_description` and merge the results
    /// into the persisted reports.
    ///
    /// Only one run per job directory may be active at a time.
    pub fn run(&self, job_description: &str, candidates: &[CandidateInput]) -> Result<PipelineReport> {
        if candidates.is_empty() {
            return Err(Error::EmptyInput("no candidates to rank".to_string()));
        }

        let mut usable: Vec<(&CandidateInput, &str)> = Vec::with_capacity(candidates.len());
        let mut skipped = Vec::new();
        for candidate in candidates {
            match &candidate.text {
                Ok(text) if !text.trim().is_empty() => usable.push((candidate, text.as_str())),
                Ok(_) => skipped.push(skip(candidate, ExtractionError::Empty)),
                Err(reason) => skipped.push(skip(candidate, reason.clone())),
            }
        }
        if usable.is_empty() {
            return Err(Error::EmptyInput(format!(
                "none of the {} candidates has extractable text",
                candidates.len()
            )));
        }

        let job_hash = content_hash(job_description);
        let job_text = strip_html(job_description);
        let model_store = ModelStore::new(self.context.model_path());

        let reuse = self.reusable_state(&job_hash, &model_store)?;
        let retrained = reuse.is_none();
        let keywords = match &reuse {
            Some((keywords, _)) => {
                info!(job_hash = %job_hash, "Job description unchanged, reusing model and keywords");
                keywords.clone()
            }
            None => {
                info!(job_hash = %job_hash, "Job description changed or no model stored, retraining");
                self.extract_keywords(&job_text)?
            }
        };
        debug!(?keywords, "Skill keywords");

        let options = &self.config.embedding;
        let subspace =
            BiasSubspace::compute(self.embedder.as_ref(), &self.config.gender_word_pairs, options)?;
        info!(directions = subspace.len(), "Computed bias subspace");

        let job_vec = self
            .embedder
            .embed(&mitigate_gendered_language(&job_text), options)?;
        let embeddings = usable
            .par_iter()
            .map(|(_, text)| {
                let vector = self.embedder.embed(&mitigate_gendered_language(text), options)?;
                subspace.debias(&vector, self.config.lambda_bias)
            })
            .collect::<Result<Vec<_>>>()?;
        info!(candidates = embeddings.len(), "Embedded candidates");

        let builder = FeatureBuilder::new(self.config.sample_dims, keywords.clone())?;
        let batch: Vec<CandidateVector<'_>> = embeddings
            .iter()
            .zip(&usable)
            .map(|(embedding, (_, text))| CandidateVector {
                embedding,
                text: Some(*text),
            })
            .collect();
        let table = builder.build_dataset(&job_vec, &batch, None)?;

        let (model, training) = match reuse {
            Some((_, model)) => (model, None),
            None => {
                let labels = synthetic_labels(&table)?;
                let labelled = table.clone().with_targets(labels)?;
                let (model, report) = train(&labelled, &self.config.training)?;
                // Model first: a crash before the keywords land forces a retrain
                model_store.save(&job_hash, &model)?;
                KeywordsArtifact::store(&self.context.keywords_path(), &job_hash, keywords.clone())?;
                (model, Some(report))
            }
        };

        let predictions = model.predict(&table)?;
        let attributions = explain(&model, model.feature_names(), &table, self.config.top_contributors)?;

        let scored: Vec<ScoredCandidate> = usable
            .iter()
            .zip(predictions.iter().zip(attributions))
            .map(|((candidate, text), (&score, attribution))| ScoredCandidate {
                identity: candidate.identity.clone(),
                score,
                bias_score: gender_bias_score(text),
                attribution,
            })
            .collect();

        let rankings = rank(&scored);
        for r in &rankings {
            info!("Rank {}: {} (score: {:.4})", r.rank, r.display_name, r.score);
        }

        self.persist_reports(&scored, &rankings, &usable)?;

        let explanations = match &self.generator {
            Some(generator) => self.explain_top(generator.as_ref(), &job_text, &scored, &rankings, &usable)?,
            None => Vec::new(),
        };

        Ok(PipelineReport {
            job_hash,
            retrained,
            keywords,
            training,
            candidates: scored,
            rankings,
            skipped,
            explanations,
        })
    }

    /// Stored keywords and model, when both belong to `job_hash`
    fn reusable_state(
        &self,
        job_hash: &str,
        model_store: &ModelStore,
    ) -> Result<Option<(Vec<String>, RankingModel)>> {
        let keywords_path = self.context.keywords_path();
        let stored_keywords = match KeywordsArtifact::load(&keywords_path) {
            Ok(stored) => stored,
            Err(e) => {
                warn!(error = %e, "Unreadable {}, retraining", keywords_path.display());
                None
            }
        };
        let Some(stored_keywords) = stored_keywords.filter(|k| k.matches(job_hash)) else {
            return Ok(None);
        };
        match model_store.load_optional()? {
            Some(stored) if stored.job_hash == job_hash => Ok(Some((stored_keywords.keywords, stored.model))),
            _ => Ok(None),
        }
    }

    fn extract_keywords(&self, job_text: &str) -> Result<Vec<String>> {
        match self.extractor.extract(job_text) {
            Ok(keywords) if keywords.is_empty() => {
                warn!("No skill keywords found in job description, using the full skill list");
                Ok(self.config.skill_keywords.clone())
            }
            Ok(keywords) => Ok(keywords),
            Err(Error::TruncatedResponse(reason)) => {
                warn!(%reason, "Keyword extraction truncated, using the full skill list");
                Ok(self.config.skill_keywords.clone())
            }
            Err(e) => Err(e),
        }
    }

    fn persist_reports(
        &self,
        scored: &[ScoredCandidate],
        rankings: &[RankedCandidate],
        usable: &[(&CandidateInput, &str)],
    ) -> Result<()> {
        let ranking_entries = rankings
            .iter()
            .map(|r| RankingEntry::new(r.candidate_id.as_str(), r.rank, r.display_name.as_str(), r.score));
        merge_and_persist(&self.context.ranking_path(), ranking_entries)?;

        let shap_entries = scored.iter().map(|c| {
            ShapEntry::new(
                c.identity.candidate_id.as_str(),
                c.identity.display_name.as_str(),
                &c.attribution,
            )
        });
        merge_and_persist(&self.context.shap_path(), shap_entries)?;

        let bias_entries = scored.iter().zip(usable).map(|(c, (_, text))| {
            BiasEntry::from_text(
                c.identity.candidate_id.as_str(),
                c.identity.display_name.as_str(),
                text,
                c.bias_score,
            )
        });
        merge_and_persist(&self.context.bias_path(), bias_entries)?;
        Ok(())
    }

    fn explain_top(
        &self,
        generator: &dyn ExplanationGenerator,
        job_text: &str,
        scored: &[ScoredCandidate],
        rankings: &[RankedCandidate],
        usable: &[(&CandidateInput, &str)],
    ) -> Result<Vec<CandidateExplanation>> {
        let mut explanations = Vec::new();
        for ranked in rankings.iter().take(self.config.explanation_top_n) {
            let Some(idx) = scored
                .iter()
                .position(|c| c.identity.candidate_id == ranked.candidate_id)
            else {
                continue;
            };
            let candidate = &scored[idx];
            let request = ExplanationRequest::new(
                job_text,
                usable[idx].1,
                candidate.score,
                &candidate.attribution,
                candidate.bias_score,
            );
            let explanation = generate_explanation(generator, &request);
            explanations.push(CandidateExplanation {
                id: ranked.candidate_id.clone(),
                rank: ranked.rank,
                candidate: ranked.display_name.clone(),
                similarity_score: candidate.score,
                bias_score: candidate.bias_score,
                explanation,
            });
        }

        merge_and_persist(&self.context.explanations_path(), explanations.clone())?;
        Ok(explanations)
    }
}

fn skip(candidate: &CandidateInput, reason: ExtractionError) -> SkippedCandidate {
    warn!(
        candidate = %candidate.identity.display_name,
        %reason,
        "Skipping candidate without usable text"
    );
    SkippedCandidate {
        identity: candidate.identity.clone(),
        reason,
    }
}

/// Descending by score; ties keep input order
fn rank(scored: &[ScoredCandidate]) -> Vec<RankedCandidate> {
    let mut order: Vec<usize> = (0..scored.len()).collect();
    order.sort_by(|&a, &b| scored[b].score.total_cmp(&scored[a].score));
    order
        .into_iter()
        .enumerate()
        .map(|(i, idx)| RankedCandidate {
            rank: i + 1,
            candidate_id: scored[idx].identity.candidate_id.clone(),
            display_name: scored[idx].identity.display_name.clone(),
            score: scored[idx].score,
        })
        .collect()
}

/// Persisted ranking as `"rank. candidate - Score: x.xxxx"` lines
pub fn display_ranking(path: &Path) -> Result<Vec<String>> {
    let report = ReportArtifact::<RankingEntry>::load(path)?;
    Ok(report
        .entries()
        .iter()
        .map(|e| format!("{}. {} - Score: {:.4}", e.rank, e.candidate_file, e.score))
        .collect())
}
