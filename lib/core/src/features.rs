//! Feature Vector Builder
//!
//! Each candidate is summarized as a named feature record:
//!
//! - `cosine_similarity` between the job and the debiased candidate embedding
//! - `embed_dim_i`: the candidate embedding at a fixed stride of dimensions
//! - `embed_diff_i`: `|job_i - candidate_i|` at the same dimensions
//! - `skill_<keyword>`: whole-word occurrence counts (sparse in a record)
//!
//! A [`FeatureSchema`] declares the full column universe for a run so every
//! row of a [`FeatureTable`] carries the same columns in the same order;
//! skills absent from a record become explicit zeros.

use crate::text::KeywordMatcher;
use crate::vector::EmbeddingVector;
use crate::{Error, Result};
use ahash::AHashMap;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::warn;

pub const DEFAULT_SAMPLE_DIMS: usize = 50;

pub const COSINE_FEATURE: &str = "cosine_similarity";
pub const TARGET_COLUMN: &str = "target_score";
pub const SKILL_PREFIX: &str = "skill_";
pub const EMBED_DIM_PREFIX: &str = "embed_dim_";
pub const EMBED_DIFF_PREFIX: &str = "embed_diff_";

/// Weight of cosine similarity in the synthetic training label
pub const LABEL_COSINE_WEIGHT: f64 = 0.6;
/// Weight of the keyword-match ratio in the synthetic training label
pub const LABEL_KEYWORD_WEIGHT: f64 = 0.4;

pub fn skill_feature(keyword: &str) -> String {
    format!("{SKILL_PREFIX}{keyword}")
}

/// Indices `0, step, 2*step, ...` below `dim`, with `step = dim / sample_count` (at least 1)
pub fn sampled_indices(dim: usize, sample_count: usize) -> Vec<usize> {
    let step = (dim / sample_count.max(1)).max(1);
    (0..dim).step_by(step).collect()
}

/// Ordered mapping from feature name to value
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureRecord {
    entries: Vec<(String, f64)>,
}

impl FeatureRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite a feature, keeping first-insertion order
    pub fn insert(&mut self, name: impl Into<String>, value: f64) {
        let name = name.into();
        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.entries.iter().find(|(n, _)| n == name).map(|(_, v)| *v)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(n, _)| n.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), *v))
    }
}

/// Declared column universe for one run
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureSchema {
    columns: Vec<String>,
    index: AHashMap<String, usize>,
}

impl FeatureSchema {
    pub fn new(embedding_dim: usize, sample_count: usize, skill_keywords: &[String]) -> Self {
        let indices = sampled_indices(embedding_dim, sample_count);
        let mut columns = Vec::with_capacity(1 + 2 * indices.len() + skill_keywords.len());
        columns.push(COSINE_FEATURE.to_string());
        columns.extend(indices.iter().map(|i| format!("{EMBED_DIM_PREFIX}{i}")));
        columns.extend(indices.iter().map(|i| format!("{EMBED_DIFF_PREFIX}{i}")));
        for kw in skill_keywords {
            let name = skill_feature(kw);
            if !columns.contains(&name) {
                columns.push(name);
            }
        }
        Self::from_columns(columns)
    }

    pub fn from_columns(columns: Vec<String>) -> Self {
        let index = columns
            .iter()
            .enumerate()
            .map(|(i, c)| (c.clone(), i))
            .collect();
        Self { columns, index }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    /// Dense row for a record. Missing skill columns are zero; any other
    /// missing column, or a record key outside the schema, is a mismatch.
    pub fn row(&self, record: &FeatureRecord) -> Result<Vec<f64>> {
        let mut row = vec![0.0; self.columns.len()];
        let mut seen = vec![false; self.columns.len()];

        for (name, value) in record.iter() {
            let idx = self.index_of(name).ok_or_else(|| {
                Error::FeatureMismatch(format!("feature '{name}' is not in the schema"))
            })?;
            row[idx] = value;
            seen[idx] = true;
        }

        if let Some((name, _)) = self
            .columns
            .iter()
            .zip(seen.iter())
            .find(|(name, seen)| !**seen && !name.starts_with(SKILL_PREFIX))
        {
            return Err(Error::FeatureMismatch(format!("record is missing feature '{name}'")));
        }

        Ok(row)
    }
}

/// Column-aligned feature rows, with optional training targets
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureTable {
    columns: Vec<String>,
    rows: Vec<Vec<f64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    targets: Option<Vec<f64>>,
}

impl FeatureTable {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<f64>>) -> Result<Self> {
        if let Some(bad) = rows.iter().find(|r| r.len() != columns.len()) {
            return Err(Error::InvalidDimension {
                expected: columns.len(),
                actual: bad.len(),
            });
        }
        Ok(Self {
            columns,
            rows,
            targets: None,
        })
    }

    /// Attach training targets, one per row
    pub fn with_targets(mut self, targets: Vec<f64>) -> Result<Self> {
        if targets.len() != self.rows.len() {
            return Err(Error::InvalidDimension {
                expected: self.rows.len(),
                actual: targets.len(),
            });
        }
        self.targets = Some(targets);
        Ok(self)
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<f64>] {
        &self.rows
    }

    pub fn targets(&self) -> Option<&[f64]> {
        self.targets.as_deref()
    }

    pub fn n_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn n_cols(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn column(&self, name: &str) -> Option<Vec<f64>> {
        let idx = self.column_index(name)?;
        Some(self.rows.iter().map(|r| r[idx]).collect())
    }

    /// Drop a literal `target_score` column if one was loaded as a feature
    pub fn without_target_column(&self) -> Self {
        match self.column_index(TARGET_COLUMN) {
            None => self.clone(),
            Some(idx) => {
                let mut columns = self.columns.clone();
                columns.remove(idx);
                let rows = self
                    .rows
                    .iter()
                    .map(|r| {
                        let mut r = r.clone();
                        r.remove(idx);
                        r
                    })
                    .collect();
                Self {
                    columns,
                    rows,
                    targets: self.targets.clone(),
                }
            }
        }
    }

    /// Reorder columns to `order`.
    ///
    /// Missing `skill_*` columns are filled with zeros; any other missing
    /// column fails with [`Error::FeatureMismatch`]. Extra columns are dropped.
    pub fn reindex(&self, order: &[String]) -> Result<Self> {
        let positions: Vec<Option<usize>> = order
            .iter()
            .map(|name| match self.column_index(name) {
                Some(idx) => Ok(Some(idx)),
                None if name.starts_with(SKILL_PREFIX) => Ok(None),
                None => Err(Error::FeatureMismatch(format!(
                    "column '{name}' required by the model is missing"
                ))),
            })
            .collect::<Result<_>>()?;

        let rows = self
            .rows
            .iter()
            .map(|r| positions.iter().map(|p| p.map_or(0.0, |i| r[i])).collect())
            .collect();

        Ok(Self {
            columns: order.to_vec(),
            rows,
            targets: self.targets.clone(),
        })
    }
}

/// One candidate's inputs to the dataset builder
#[derive(Debug, Clone, Copy)]
pub struct CandidateVector<'a> {
    /// Debiased candidate embedding
    pub embedding: &'a EmbeddingVector,
    pub text: Option<&'a str>,
}

/// Builds feature records and aligned tables with fixed sampling and keywords
#[derive(Debug, Clone)]
pub struct FeatureBuilder {
    sample_count: usize,
    skill_keywords: Vec<String>,
    matchers: Vec<KeywordMatcher>,
}

impl FeatureBuilder {
    pub fn new(sample_count: usize, skill_keywords: Vec<String>) -> Result<Self> {
        let matchers = skill_keywords
            .iter()
            .map(|kw| KeywordMatcher::new(kw))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            sample_count: sample_count.max(1),
            skill_keywords,
            matchers,
        })
    }

    pub fn skill_keywords(&self) -> &[String] {
        &self.skill_keywords
    }

    pub fn schema(&self, embedding_dim: usize) -> FeatureSchema {
        FeatureSchema::new(embedding_dim, self.sample_count, &self.skill_keywords)
    }

    /// Feature record for one candidate. Fails with [`Error::ZeroVector`]
    /// when either embedding has a ~0 norm.
    pub fn build(
        &self,
        job: &EmbeddingVector,
        candidate: &EmbeddingVector,
        candidate_text: Option<&str>,
    ) -> Result<FeatureRecord> {
        let cosine = job.cosine_similarity(candidate)?;
        self.assemble(job, candidate, cosine, candidate_text)
    }

    fn assemble(
        &self,
        job: &EmbeddingVector,
        candidate: &EmbeddingVector,
        cosine: f64,
        candidate_text: Option<&str>,
    ) -> Result<FeatureRecord> {
        let diff = job.abs_diff(candidate)?;
        let indices = sampled_indices(candidate.dim(), self.sample_count);
        let values = candidate.as_slice();

        let mut record = FeatureRecord::new();
        record.insert(COSINE_FEATURE, cosine);
        for &i in &indices {
            record.insert(format!("{EMBED_DIM_PREFIX}{i}"), f64::from(values[i]));
        }
        for &i in &indices {
            record.insert(format!("{EMBED_DIFF_PREFIX}{i}"), diff[i]);
        }

        if let Some(text) = candidate_text {
            for matcher in &self.matchers {
                let count = matcher.count(text);
                if count > 0 {
                    record.insert(skill_feature(matcher.keyword()), count as f64);
                }
            }
        }

        Ok(record)
    }

    /// Aligned table for a batch, in input order.
    ///
    /// A candidate with a degenerate embedding keeps its row with a zero
    /// similarity instead of failing the batch. `targets`, when given, are
    /// attached as the training label column.
    pub fn build_dataset(
        &self,
        job: &EmbeddingVector,
        candidates: &[CandidateVector<'_>],
        targets: Option<&[f64]>,
    ) -> Result<FeatureTable> {
        if candidates.is_empty() {
            return Err(Error::EmptyInput("no candidates to featurize".to_string()));
        }

        let schema = self.schema(job.dim());
        let rows = candidates
            .par_iter()
            .enumerate()
            .map(|(idx, candidate)| {
                let record = match self.build(job, candidate.embedding, candidate.text) {
                    Ok(record) => record,
                    Err(Error::ZeroVector(reason)) => {
                        warn!(candidate = idx, %reason, "degenerate embedding, using zero similarity");
                        self.assemble(job, candidate.embedding, 0.0, candidate.text)?
                    }
                    Err(e) => return Err(e),
                };
                schema.row(&record)
            })
            .collect::<Result<Vec<_>>>()?;

        let table = FeatureTable::new(schema.columns().to_vec(), rows)?;
        match targets {
            Some(t) => table.with_targets(t.to_vec()),
            None => Ok(table),
        }
    }
}

/// Feature record for a single job/candidate pair
pub fn build_feature_vector(
    job: &EmbeddingVector,
    candidate: &EmbeddingVector,
    candidate_text: Option<&str>,
    skill_keywords: Option<&[String]>,
    sample_count: usize,
) -> Result<FeatureRecord> {
    let keywords = skill_keywords.map(<[String]>::to_vec).unwrap_or_default();
    FeatureBuilder::new(sample_count, keywords)?.build(job, candidate, candidate_text)
}

/// Aligned feature table over a batch of candidates
pub fn build_feature_dataset(
    job: &EmbeddingVector,
    candidates: &[CandidateVector<'_>],
    skill_keywords: &[String],
    targets: Option<&[f64]>,
    sample_count: usize,
) -> Result<FeatureTable> {
    FeatureBuilder::new(sample_count, skill_keywords.to_vec())?.build_dataset(job, candidates, targets)
}

/// Fraction of `skill_*` columns with a nonzero count, per row
pub fn keyword_ratios(table: &FeatureTable) -> Vec<f64> {
    let skill_cols: Vec<usize> = table
        .columns()
        .iter()
        .enumerate()
        .filter(|(_, c)| c.starts_with(SKILL_PREFIX))
        .map(|(i, _)| i)
        .collect();

    table
        .rows()
        .iter()
        .map(|row| {
            if skill_cols.is_empty() {
                0.0
            } else {
                let matched = skill_cols.iter().filter(|&&i| row[i] > 0.0).count();
                matched as f64 / skill_cols.len() as f64
            }
        })
        .collect()
}

/// Synthetic training labels: `0.6 * cosine_similarity + 0.4 * keyword_ratio`
pub fn synthetic_labels(table: &FeatureTable) -> Result<Vec<f64>> {
    let cosine = table.column(COSINE_FEATURE).ok_or_else(|| {
        Error::FeatureMismatch(format!("table has no '{COSINE_FEATURE}' column"))
    })?;
    Ok(cosine
        .iter()
        .zip(keyword_ratios(table))
        .map(|(c, k)| LABEL_COSINE_WEIGHT * c + LABEL_KEYWORD_WEIGHT * k)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vector(dim: usize, f: impl Fn(usize) -> f32) -> EmbeddingVector {
        EmbeddingVector::new((0..dim).map(f).collect())
    }

    fn keywords() -> Vec<String> {
        vec!["python".into(), "machine learning".into(), "sql".into()]
    }

    #[test]
    fn test_sampled_indices() {
        assert_eq!(sampled_indices(10, 5), vec![0, 2, 4, 6, 8]);
        assert_eq!(sampled_indices(768, 50).len(), 52); // step 15
        assert_eq!(sampled_indices(3, 50), vec![0, 1, 2]);
    }

    #[test]
    fn test_feature_vector_layout() {
        let job = vector(10, |i| i as f32 + 1.0);
        let cv = vector(10, |i| (10 - i) as f32);
        let kws = keywords();
        let record =
            build_feature_vector(&job, &cv, Some("Python and SQL, more python"), Some(&kws), 5)
                .unwrap();

        assert!(record.contains(COSINE_FEATURE));
        assert_eq!(record.get("embed_dim_2"), Some(8.0));
        assert_eq!(record.get("embed_diff_2"), Some(5.0));
        assert_eq!(record.get("skill_python"), Some(2.0));
        assert_eq!(record.get("skill_sql"), Some(1.0));
        assert!(!record.contains("skill_machine learning"));
        // cosine + 5 dims + 5 diffs + 2 skills
        assert_eq!(record.len(), 13);
    }

    #[test]
    fn test_zero_vector_rejected() {
        let job = vector(4, |_| 1.0);
        let zero = vector(4, |_| 0.0);
        let result = build_feature_vector(&job, &zero, None, None, 2);
        assert!(matches!(result, Err(Error::ZeroVector(_))));
    }

    #[test]
    fn test_dataset_columns_are_stable() {
        let job = vector(20, |i| (i % 3) as f32 + 0.5);
        let a = vector(20, |i| i as f32);
        let b = vector(20, |i| (20 - i) as f32);
        let kws = keywords();

        let first = build_feature_dataset(
            &job,
            &[CandidateVector { embedding: &a, text: Some("python") }],
            &kws,
            None,
            5,
        )
        .unwrap();
        let second = build_feature_dataset(
            &job,
            &[
                CandidateVector { embedding: &b, text: Some("sql sql") },
                CandidateVector { embedding: &a, text: None },
            ],
            &kws,
            None,
            5,
        )
        .unwrap();

        assert_eq!(first.columns(), second.columns());
        assert_eq!(second.n_rows(), 2);
        // Absent skills are explicit zeros
        let python = second.column("skill_python").unwrap();
        assert_eq!(python, vec![0.0, 0.0]);
    }

    #[test]
    fn test_dataset_zero_vector_fallback() {
        let job = vector(8, |i| i as f32 + 1.0);
        let zero = vector(8, |_| 0.0);
        let ok = vector(8, |i| i as f32);
        let table = build_feature_dataset(
            &job,
            &[
                CandidateVector { embedding: &zero, text: None },
                CandidateVector { embedding: &ok, text: None },
            ],
            &[],
            None,
            4,
        )
        .unwrap();

        let cosine = table.column(COSINE_FEATURE).unwrap();
        assert_eq!(cosine[0], 0.0);
        assert!(cosine[1] > 0.0);
    }

    #[test]
    fn test_dataset_with_targets() {
        let job = vector(4, |i| i as f32 + 1.0);
        let cv = vector(4, |i| i as f32 + 2.0);
        let table = build_feature_dataset(
            &job,
            &[CandidateVector { embedding: &cv, text: None }],
            &[],
            Some(&[0.75]),
            2,
        )
        .unwrap();
        assert_eq!(table.targets(), Some(&[0.75][..]));
    }

    #[test]
    fn test_builder_counts_skills_once_compiled() {
        let job = vector(6, |i| i as f32 + 1.0);
        let cv = vector(6, |i| (6 - i) as f32);
        let builder =
            FeatureBuilder::new(3, vec!["sql".into(), "spark".into(), "node.js".into()]).unwrap();

        let text = "Python developer, <5 years experience, SQL and Spark required";
        let record = builder.build(&job, &cv, Some(text)).unwrap();
        assert_eq!(record.get("skill_sql"), Some(1.0));
        assert_eq!(record.get("skill_spark"), Some(1.0));
        assert!(!record.contains("skill_node.js"));

        let record = builder.build(&job, &cv, Some("Node.js, nodexjs")).unwrap();
        assert_eq!(record.get("skill_node.js"), Some(1.0));
    }

    #[test]
    fn test_empty_batch_rejected() {
        let job = vector(4, |_| 1.0);
        let result = build_feature_dataset(&job, &[], &[], None, 2);
        assert!(matches!(result, Err(Error::EmptyInput(_))));
    }

    #[test]
    fn test_reindex() {
        let table = FeatureTable::new(
            vec!["b".into(), "a".into(), TARGET_COLUMN.into()],
            vec![vec![2.0, 1.0, 9.0]],
        )
        .unwrap();

        let dropped = table.without_target_column();
        assert_eq!(dropped.columns(), &["b".to_string(), "a".to_string()]);

        let order = vec!["a".to_string(), "b".to_string(), "skill_rust".to_string()];
        let aligned = dropped.reindex(&order).unwrap();
        assert_eq!(aligned.rows()[0], vec![1.0, 2.0, 0.0]);

        let bad = vec!["a".to_string(), "embed_dim_0".to_string()];
        assert!(matches!(dropped.reindex(&bad), Err(Error::FeatureMismatch(_))));
    }

    #[test]
    fn test_schema_rejects_unknown_feature() {
        let schema = FeatureSchema::new(4, 2, &[]);
        let mut record = FeatureRecord::new();
        record.insert("mystery", 1.0);
        assert!(matches!(schema.row(&record), Err(Error::FeatureMismatch(_))));
    }

    #[test]
    fn test_synthetic_labels() {
        let table = FeatureTable::new(
            vec![COSINE_FEATURE.into(), "skill_python".into(), "skill_sql".into()],
            vec![vec![0.5, 2.0, 0.0], vec![1.0, 0.0, 0.0]],
        )
        .unwrap();
        let labels = synthetic_labels(&table).unwrap();
        assert!((labels[0] - (0.6 * 0.5 + 0.4 * 0.5)).abs() < 1e-12);
        assert!((labels[1] - 0.6).abs() < 1e-12);
    }
}
