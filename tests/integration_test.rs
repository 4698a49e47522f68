// Integration tests for fairrank
use fairrank::prelude::*;
use fairrank::{display_ranking, ExplanationGenerator, ExplanationRequest};
use fairrank_core::debias::DEFAULT_GENDER_WORD_PAIRS;
use fairrank_core::features::{CandidateVector, COSINE_FEATURE, SKILL_PREFIX};
use fairrank_core::text::gender_bias_score;
use fairrank_core::{build_feature_dataset, BiasSubspace, EmbedOptions, ExtractionError};
use fairrank_storage::{KeywordsArtifact, ModelStore};
use serde_json::{json, Value};
use std::fs;
use std::sync::Arc;
use tempfile::TempDir;

const JOB: &str = "Looking for a Python developer with ML experience";

fn candidate(file: &str, text: &str) -> CandidateInput {
    CandidateInput::from_file(&FileNameResolver, file, Ok(text.to_string()))
}

fn two_candidates() -> Vec<CandidateInput> {
    vec![
        candidate("jane_doe.txt", "Python, machine learning, pandas"),
        candidate("john_smith.txt", "Forklift operator, warehouse logistics and inventory"),
    ]
}

fn pipeline(dir: &TempDir) -> Pipeline {
    let context = PersistenceContext::new(dir.path().join("job-1")).unwrap();
    Pipeline::new(PipelineConfig::new(1.0), Arc::new(HashingEmbedder::default()), context).unwrap()
}

fn read_json(path: &std::path::Path) -> Value {
    serde_json::from_slice(&fs::read(path).unwrap()).unwrap()
}

#[test]
fn test_keyword_rich_resume_ranks_higher() {
    let dir = TempDir::new().unwrap();
    let report = pipeline(&dir).run(JOB, &two_candidates()).unwrap();

    let predictions = report.predictions();
    assert_eq!(predictions.len(), 2);
    assert!(predictions[0] > predictions[1], "{predictions:?}");
    assert!(report.retrained);
    assert_eq!(report.keywords, vec!["python".to_string()]);
    assert_eq!(report.rankings[0].display_name, "jane_doe");
    assert_eq!(report.rankings[0].rank, 1);
    assert_eq!(report.rankings[1].display_name, "john_smith");
}

#[test]
fn test_reports_are_written() {
    let dir = TempDir::new().unwrap();
    let pipeline = pipeline(&dir);
    pipeline.run(JOB, &two_candidates()).unwrap();
    let context = pipeline.context();

    let ranking = read_json(&context.ranking_path());
    assert!(ranking["analysis_id"].as_str().unwrap().starts_with("ranking_"));
    assert_eq!(ranking["ranking"].as_array().unwrap().len(), 2);
    assert_eq!(ranking["ranking"][0]["candidate_file"], "jane_doe");

    let shap = read_json(&context.shap_path());
    assert_eq!(shap["shap"].as_array().unwrap().len(), 2);

    let bias = read_json(&context.bias_path());
    assert_eq!(bias["title"], "Gender Bias Analysis Report");
    assert_eq!(bias["candidate_analysis"].as_array().unwrap().len(), 2);
    assert_eq!(bias["summary"]["average_bias"], 0.0);

    let stored = ModelStore::new(context.model_path()).load().unwrap();
    let keywords = KeywordsArtifact::load(&context.keywords_path()).unwrap().unwrap();
    assert_eq!(stored.job_hash, keywords.job_hash);

    let lines = display_ranking(&context.ranking_path()).unwrap();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].starts_with("1. jane_doe - Score: "));
}

#[test]
fn test_unchanged_job_reuses_model_and_keywords() {
    let dir = TempDir::new().unwrap();
    let pipeline = pipeline(&dir);
    let first = pipeline.run(JOB, &two_candidates()).unwrap();
    let keywords_path = pipeline.context().keywords_path();
    let keywords_before = fs::read(&keywords_path).unwrap();
    let model_before = fs::read(pipeline.context().model_path()).unwrap();

    // Markup does not change the job hash
    let second = pipeline.run(&format!("<p>{JOB}</p>"), &two_candidates()).unwrap();
    assert!(!second.retrained);
    assert!(second.training.is_none());
    assert_eq!(first.job_hash, second.job_hash);
    assert_eq!(fs::read(&keywords_path).unwrap(), keywords_before);
    assert_eq!(fs::read(pipeline.context().model_path()).unwrap(), model_before);
    assert_eq!(first.predictions(), second.predictions());
}

#[test]
fn test_changed_job_triggers_retraining() {
    let dir = TempDir::new().unwrap();
    let pipeline = pipeline(&dir);
    let first = pipeline.run(JOB, &two_candidates()).unwrap();
    let keywords_path = pipeline.context().keywords_path();
    let before = KeywordsArtifact::load(&keywords_path).unwrap().unwrap();

    let second = pipeline
        .run("Hiring a data engineer fluent in SQL and Spark", &two_candidates())
        .unwrap();
    assert!(second.retrained);
    assert_ne!(first.job_hash, second.job_hash);

    let after = KeywordsArtifact::load(&keywords_path).unwrap().unwrap();
    assert_eq!(after.job_hash, second.job_hash);
    assert_eq!(after.analysis_id, before.analysis_id);
    assert_eq!(after.keywords, vec!["spark".to_string(), "sql".to_string()]);

    let stored = ModelStore::new(pipeline.context().model_path()).load().unwrap();
    assert_eq!(stored.job_hash, second.job_hash);
}

#[test]
fn test_rerun_is_idempotent_and_extends_incrementally() {
    let dir = TempDir::new().unwrap();
    let pipeline = pipeline(&dir);
    pipeline.run(JOB, &two_candidates()).unwrap();
    let ranking_path = pipeline.context().ranking_path();
    let bias_path = pipeline.context().bias_path();
    let ranking_before = fs::read(&ranking_path).unwrap();
    let bias_before = fs::read(&bias_path).unwrap();

    pipeline.run(JOB, &two_candidates()).unwrap();
    assert_eq!(fs::read(&ranking_path).unwrap(), ranking_before);
    assert_eq!(fs::read(&bias_path).unwrap(), bias_before);

    let mut superset = two_candidates();
    superset.push(candidate("alex_roe.txt", "He is a chairman. Python and SQL."));
    pipeline.run(JOB, &superset).unwrap();

    let ranking = read_json(&ranking_path);
    let entries = ranking["ranking"].as_array().unwrap();
    assert_eq!(entries.len(), 3);
    assert_eq!(entries[2]["candidate_file"], "alex_roe");
    let before: Value = serde_json::from_slice(&ranking_before).unwrap();
    assert_eq!(ranking["analysis_id"], before["analysis_id"]);
    assert_eq!(entries[..2], before["ranking"].as_array().unwrap()[..]);

    // Summary follows the full entry list
    let bias = read_json(&bias_path);
    assert_eq!(bias["candidate_analysis"].as_array().unwrap().len(), 3);
    assert_eq!(bias["summary"]["least_neutral_candidate"], "alex_roe");
}

#[test]
fn test_legacy_report_gets_analysis_id() {
    let dir = TempDir::new().unwrap();
    let pipeline = pipeline(&dir);
    let ranking_path = pipeline.context().ranking_path();
    fs::write(
        &ranking_path,
        serde_json::to_vec(&json!({
            "ranking": [{"id": "legacy", "rank": 1, "candidate_file": "old_cv", "score": 0.5}]
        }))
        .unwrap(),
    )
    .unwrap();

    pipeline.run(JOB, &two_candidates()).unwrap();
    let ranking = read_json(&ranking_path);
    assert!(ranking["analysis_id"].as_str().unwrap().starts_with("ranking_"));
    assert_eq!(ranking["ranking"].as_array().unwrap().len(), 3);
    assert_eq!(ranking["ranking"][0]["id"], "legacy");
}

#[test]
fn test_attributions_reconcile_with_scores() {
    let dir = TempDir::new().unwrap();
    let report = pipeline(&dir).run(JOB, &two_candidates()).unwrap();

    for candidate in &report.candidates {
        let record = &candidate.attribution;
        assert!((record.prediction - candidate.score).abs() < 1e-3);
        let total: f64 = record.contributors.iter().map(|c| c.impact).sum();
        assert!((record.base_value + total - candidate.score).abs() < 1e-3);
        for pair in record.contributors.windows(2) {
            assert!(pair[0].impact.abs() >= pair[1].impact.abs());
        }
        for c in &record.contributors {
            assert_eq!(c.positive, c.impact > 0.0);
        }
    }
}

#[test]
fn test_empty_extraction_is_skipped() {
    let dir = TempDir::new().unwrap();
    let pipeline = pipeline(&dir);
    let mut candidates = two_candidates();
    candidates.push(CandidateInput::from_file(&FileNameResolver, "scan.pdf", Ok("   ".to_string())));
    candidates.push(CandidateInput::from_file(
        &FileNameResolver,
        "broken.pdf",
        Err(ExtractionError::Failed("OCR failed".to_string())),
    ));

    let report = pipeline.run(JOB, &candidates).unwrap();
    assert_eq!(report.candidates.len(), 2);
    assert_eq!(report.skipped.len(), 2);
    assert_eq!(report.skipped[0].identity.display_name, "scan");
    assert_eq!(report.skipped[0].reason, ExtractionError::Empty);

    let ranking = read_json(&pipeline.context().ranking_path());
    assert_eq!(ranking["ranking"].as_array().unwrap().len(), 2);
}

#[test]
fn test_no_usable_candidates_is_fatal() {
    let dir = TempDir::new().unwrap();
    let pipeline = pipeline(&dir);
    assert!(matches!(pipeline.run(JOB, &[]), Err(Error::EmptyInput(_))));

    let candidates = vec![CandidateInput::from_file(&FileNameResolver, "blank.txt", Ok(String::new()))];
    assert!(matches!(pipeline.run(JOB, &candidates), Err(Error::EmptyInput(_))));
    assert!(!pipeline.context().ranking_path().exists());
}

#[test]
fn test_corrupt_model_aborts_without_touching_reports() {
    let dir = TempDir::new().unwrap();
    let pipeline = pipeline(&dir);
    pipeline.run(JOB, &two_candidates()).unwrap();
    let ranking_before = fs::read(pipeline.context().ranking_path()).unwrap();

    fs::write(pipeline.context().model_path(), b"{\"job_hash\": ").unwrap();
    let mut superset = two_candidates();
    superset.push(candidate("new_cv.txt", "Python and pandas"));
    let result = pipeline.run(JOB, &superset);
    assert!(matches!(result, Err(Error::CorruptModel(_))));
    assert_eq!(fs::read(pipeline.context().ranking_path()).unwrap(), ranking_before);
}

struct Unavailable;

impl ExplanationGenerator for Unavailable {
    fn generate(&self, request: &ExplanationRequest<'_>) -> Result<Value> {
        if request.candidate_text.contains("Python") {
            Ok(json!({"summary": "Strong Python background", "score": request.score}))
        } else {
            Ok(json!({"error": "service unavailable"}))
        }
    }
}

#[test]
fn test_explanation_failures_degrade_per_candidate() {
    let dir = TempDir::new().unwrap();
    let pipeline = pipeline(&dir).with_explanation_generator(Box::new(Unavailable));
    let report = pipeline.run(JOB, &two_candidates()).unwrap();

    assert_eq!(report.explanations.len(), 2);
    assert!(!report.explanations[0].explanation.is_degraded());
    assert!(report.explanations[1].explanation.is_degraded());

    let persisted = read_json(&pipeline.context().explanations_path());
    let entries = persisted["explanations"].as_array().unwrap();
    assert_eq!(entries[0]["explanation"]["summary"], "Strong Python background");
    assert_eq!(entries[1]["explanation"]["error"], "service unavailable");
}

#[test]
fn test_feature_columns_are_stable_across_batches() {
    let embedder = HashingEmbedder::new(128);
    let options = EmbedOptions::default();
    let keywords = vec!["python".to_string(), "sql".to_string()];
    let job = embedder.embed(JOB, &options).unwrap();

    let texts = ["Python and SQL", "Gardening", "SQL reports", "Python, python, python"];
    let vectors: Vec<_> = texts.iter().map(|t| embedder.embed(t, &options).unwrap()).collect();
    let batch = |range: std::ops::Range<usize>| {
        range
            .map(|i| CandidateVector { embedding: &vectors[i], text: Some(texts[i]) })
            .collect::<Vec<CandidateVector>>()
    };

    let a = build_feature_dataset(&job, &batch(0..2), &keywords, None, 16).unwrap();
    let b = build_feature_dataset(&job, &batch(2..4), &keywords, None, 16).unwrap();
    let non_skill = |cols: &[String]| -> Vec<String> {
        cols.iter().filter(|c| !c.starts_with(SKILL_PREFIX)).cloned().collect()
    };
    assert_eq!(non_skill(a.columns()), non_skill(b.columns()));
    assert_eq!(a.columns(), b.columns());
    assert_eq!(a.columns()[0], COSINE_FEATURE);
    assert_eq!(b.column("skill_python").unwrap(), vec![0.0, 3.0]);
}

#[test]
fn test_debiasing_removes_projection() {
    let embedder = HashingEmbedder::default();
    let options = EmbedOptions::default();
    let subspace = BiasSubspace::compute(&embedder, DEFAULT_GENDER_WORD_PAIRS, &options).unwrap();
    assert!(!subspace.is_empty() && subspace.len() <= 3);

    for text in ["He is a strong leader and his team trusts him", "She codes in Python", JOB] {
        let vector = embedder.embed(text, &options).unwrap();
        let before = subspace.projections(&vector);
        let debiased = subspace.debias(&vector, 1.0).unwrap();
        let after = subspace.projections(&debiased);
        let tolerance = 1e-4 * vector.norm().max(1.0);
        for (b, a) in before.iter().zip(&after) {
            assert!(a.abs() <= b.abs() + tolerance);
            assert!(a.abs() < tolerance);
        }
    }
}

#[test]
fn test_cosine_similarity_is_symmetric() {
    let embedder = HashingEmbedder::default();
    let options = EmbedOptions::default();
    let a = embedder.embed("Python developer", &options).unwrap();
    let b = embedder.embed("Machine learning engineer", &options).unwrap();
    assert_eq!(a.cosine_similarity(&b).unwrap(), b.cosine_similarity(&a).unwrap());
    assert!((a.cosine_similarity(&a).unwrap() - 1.0).abs() < 1e-6);
}

#[test]
fn test_gender_bias_score_properties() {
    assert_eq!(gender_bias_score("He and she wrote the report with his and her team"), 0.0);
    assert!(gender_bias_score("He said his brother would join him") > 0.0);
    assert_eq!(gender_bias_score("The engineer shipped the release"), 0.0);
}
