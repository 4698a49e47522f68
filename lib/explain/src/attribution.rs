//! Attribution Engine
//!
//! Decomposes each prediction into signed per-feature contributions around the
//! ensemble baseline and keeps the strongest ones under display names.

use crate::treeshap::{ensemble_shap, expected_value};
use fairrank_core::text::capitalize;
use fairrank_core::{FeatureTable, Result};
use fairrank_model::RankingModel;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::warn;

pub const DEFAULT_TOP_CONTRIBUTORS: usize = 10;

/// Relative tolerance between `base + Σφ` and the model output
pub const RECONCILIATION_TOLERANCE: f64 = 1e-4;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contributor {
    /// Display name
    pub feature: String,
    pub impact: f64,
    /// Feature value in the explained row
    pub value: f64,
    pub positive: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributionRecord {
    pub base_value: f64,
    /// `base_value + Σ impacts` over every feature
    pub prediction: f64,
    pub contributors: Vec<Contributor>,
}

impl AttributionRecord {
    pub fn positive(&self) -> impl Iterator<Item = &Contributor> {
        self.contributors.iter().filter(|c| c.positive)
    }

    pub fn negative(&self) -> impl Iterator<Item = &Contributor> {
        self.contributors.iter().filter(|c| !c.positive)
    }
}

/// Human-readable label for an internal feature name
pub fn display_name(feature: &str) -> String {
    if let Some(skill) = feature.strip_prefix("skill_") {
        return format!("Skill: {}", capitalize(skill));
    }
    if let Some(i) = feature.strip_prefix("embed_dim_") {
        return format!("Semantic Context Factor {i}");
    }
    if let Some(i) = feature.strip_prefix("embed_diff_") {
        return format!("Concept Gap {i}");
    }
    match feature {
        "cosine_similarity" => "Overall CV-Job Similarity".to_string(),
        "gender_bias_score" => "Gender Neutrality Score".to_string(),
        other => title_case(&other.replace('_', " ")),
    }
}

fn title_case(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut at_word_start = true;
    for c in text.chars() {
        if c.is_alphabetic() {
            if at_word_start {
                out.extend(c.to_uppercase());
            } else {
                out.extend(c.to_lowercase());
            }
            at_word_start = false;
        } else {
            out.push(c);
            at_word_start = true;
        }
    }
    out
}

/// Top-`k` contributors by absolute impact; equal magnitudes keep column order
pub fn top_contributors(names: &[String], row: &[f64], phi: &[f64], k: usize) -> Vec<Contributor> {
    let mut order: Vec<usize> = (0..phi.len()).collect();
    order.sort_by(|&a, &b| phi[b].abs().total_cmp(&phi[a].abs()));
    order
        .into_iter()
        .take(k)
        .map(|i| Contributor {
            feature: display_name(&names[i]),
            impact: phi[i],
            value: row[i],
            positive: phi[i] > 0.0,
        })
        .collect()
}

/// Attribution records for every row of `table`, in row order.
///
/// `feature_names` label the model's columns. When their count disagrees
/// with the aligned table, the table's own column names are used instead.
pub fn explain(
    model: &RankingModel,
    feature_names: &[String],
    table: &FeatureTable,
    top_k: usize,
) -> Result<Vec<AttributionRecord>> {
    let aligned = model.align(table)?;
    let names: &[String] = if feature_names.len() == aligned.n_cols() {
        feature_names
    } else {
        warn!(
            given = feature_names.len(),
            columns = aligned.n_cols(),
            "Feature name count does not match attribution width, using table columns"
        );
        aligned.columns()
    };

    let estimator = model.estimator();
    let base_value = expected_value(estimator);

    let records = aligned
        .rows()
        .par_iter()
        .enumerate()
        .map(|(idx, row)| {
            let phi = ensemble_shap(estimator, row);
            let prediction = base_value + phi.iter().sum::<f64>();

            let model_output = estimator.predict_row(row);
            let scale = model_output.abs().max(1.0);
            if (prediction - model_output).abs() > RECONCILIATION_TOLERANCE * scale {
                warn!(row = idx, prediction, model_output, "Attributions do not reconcile with prediction");
            }

            AttributionRecord {
                base_value,
                prediction,
                contributors: top_contributors(names, row, &phi, top_k),
            }
        })
        .collect();

    Ok(records)
}
