//! Ranking model training: seeded hold-out split, grid search with k-fold
//! cross-validation, refit on the training split.
//!
//! Datasets at or below `small_sample_threshold` rows skip validation and fit
//! fixed parameters on everything.

use crate::gbm::{mean_squared_error, r2_score, BoostingParams, GradientBoostedRegressor};
use crate::ranking::RankingModel;
use fairrank_core::{Error, FeatureTable, Result};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Feature importances reported after training
pub const TOP_IMPORTANCES: usize = 10;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamGrid {
    pub n_estimators: Vec<usize>,
    pub learning_rate: Vec<f64>,
    pub max_depth: Vec<usize>,
    pub min_samples_split: Vec<usize>,
}

impl Default for ParamGrid {
    fn default() -> Self {
        Self {
            n_estimators: vec![50, 100, 200],
            learning_rate: vec![0.01, 0.05, 0.1],
            max_depth: vec![3, 4, 5],
            min_samples_split: vec![2, 5],
        }
    }
}

impl ParamGrid {
    /// Every combination, last axis varying fastest
    pub fn combinations(&self) -> Vec<BoostingParams> {
        let mut out = Vec::new();
        for &n_estimators in &self.n_estimators {
            for &learning_rate in &self.learning_rate {
                for &max_depth in &self.max_depth {
                    for &min_samples_split in &self.min_samples_split {
                        out.push(BoostingParams {
                            n_estimators,
                            learning_rate,
                            max_depth,
                            min_samples_split,
                        });
                    }
                }
            }
        }
        out
    }

    pub fn is_empty(&self) -> bool {
        self.n_estimators.is_empty()
            || self.learning_rate.is_empty()
            || self.max_depth.is_empty()
            || self.min_samples_split.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainConfig {
    pub grid: ParamGrid,
    pub cv_folds: usize,
    pub validation_fraction: f64,
    pub seed: u64,
    pub small_sample_threshold: usize,
    pub small_sample_params: BoostingParams,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            grid: ParamGrid::default(),
            cv_folds: 3,
            validation_fraction: 0.2,
            seed: 42,
            small_sample_threshold: 3,
            small_sample_params: BoostingParams::default(),
        }
    }
}

impl TrainConfig {
    pub fn validate(&self) -> Result<()> {
        if self.grid.is_empty() {
            return Err(Error::InvalidConfig("parameter grid has an empty axis".to_string()));
        }
        if self.cv_folds < 2 {
            return Err(Error::InvalidConfig(format!(
                "cv_folds must be at least 2, got {}",
                self.cv_folds
            )));
        }
        if !(self.validation_fraction > 0.0 && self.validation_fraction < 1.0) {
            return Err(Error::InvalidConfig(format!(
                "validation_fraction must be in (0, 1), got {}",
                self.validation_fraction
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainReport {
    pub n_samples: usize,
    pub n_train: usize,
    pub n_validation: usize,
    pub params: BoostingParams,
    /// Mean negated MSE of the winning grid entry
    pub cv_score: Option<f64>,
    pub training_mse: Option<f64>,
    pub validation_mse: Option<f64>,
    pub validation_r2: Option<f64>,
    pub top_features: Vec<(String, f64)>,
}

/// Contiguous k-fold splits without shuffling; the first `n % k` folds get one extra sample.
pub fn kfold_indices(n: usize, k: usize) -> Vec<(Vec<usize>, Vec<usize>)> {
    let k = k.min(n).max(1);
    let base = n / k;
    let extra = n % k;

    let mut folds = Vec::with_capacity(k);
    let mut start = 0;
    for fold in 0..k {
        let size = base + usize::from(fold < extra);
        let test: Vec<usize> = (start..start + size).collect();
        let train: Vec<usize> = (0..start).chain(start + size..n).collect();
        folds.push((train, test));
        start += size;
    }
    folds
}

/// Seeded shuffle split into `(train, validation)`, validation gets `ceil(fraction * n)` rows
pub fn train_validation_split(n: usize, fraction: f64, seed: u64) -> (Vec<usize>, Vec<usize>) {
    let mut indices: Vec<usize> = (0..n).collect();
    let mut rng = StdRng::seed_from_u64(seed);
    indices.shuffle(&mut rng);

    let n_val = ((n as f64) * fraction - 1e-9).ceil() as usize;
    let n_val = n_val.clamp(1, n.saturating_sub(1).max(1));
    let train = indices.split_off(n_val);
    (train, indices)
}

fn cross_validate(
    rows: &[Vec<f64>],
    targets: &[f64],
    folds: &[(Vec<usize>, Vec<usize>)],
    params: BoostingParams,
) -> Result<f64> {
    let mut total = 0.0;
    for (train, test) in folds {
        let model = GradientBoostedRegressor::fit_subset(rows, targets, train, params)?;
        let actual: Vec<f64> = test.iter().map(|&i| targets[i]).collect();
        let predicted: Vec<f64> = test.iter().map(|&i| model.predict_row(&rows[i])).collect();
        total -= mean_squared_error(&actual, &predicted);
    }
    Ok(total / folds.len() as f64)
}

/// Grid search over `grid`, scored by mean negated MSE; ties keep the earlier entry
fn grid_search(
    rows: &[Vec<f64>],
    targets: &[f64],
    grid: &ParamGrid,
    cv_folds: usize,
) -> Result<(BoostingParams, f64)> {
    let folds = kfold_indices(rows.len(), cv_folds);
    let combos = grid.combinations();
    info!(candidates = combos.len(), folds = folds.len(), "Starting grid search");

    let scores = combos
        .par_iter()
        .map(|params| cross_validate(rows, targets, &folds, *params))
        .collect::<Result<Vec<f64>>>()?;

    let mut best = (combos[0], scores[0]);
    for (params, score) in combos.iter().zip(&scores).skip(1) {
        debug!(?params, score, "grid entry scored");
        if *score > best.1 {
            best = (*params, *score);
        }
    }
    Ok(best)
}

/// Train a ranking model on a labelled feature table
pub fn train(table: &FeatureTable, config: &TrainConfig) -> Result<(RankingModel, TrainReport)> {
    config.validate()?;
    let table = table.without_target_column();
    let targets = table
        .targets()
        .ok_or_else(|| Error::EmptyInput("training table has no target scores".to_string()))?
        .to_vec();
    let n = table.n_rows();
    if n == 0 {
        return Err(Error::EmptyInput("no training samples".to_string()));
    }
    let rows = table.rows();

    let (estimator, report) = if n <= config.small_sample_threshold {
        info!(samples = n, "Small dataset, training without validation");
        let params = config.small_sample_params;
        let model = GradientBoostedRegressor::fit(rows, &targets, params)?;
        let mse = mean_squared_error(&targets, &model.predict(rows)?);
        info!("Training MSE: {:.4}", mse);
        let report = TrainReport {
            n_samples: n,
            n_train: n,
            n_validation: 0,
            params,
            cv_score: None,
            training_mse: Some(mse),
            validation_mse: None,
            validation_r2: None,
            top_features: Vec::new(),
        };
        (model, report)
    } else {
        let (train_idx, val_idx) =
            train_validation_split(n, config.validation_fraction, config.seed);
        let train_rows: Vec<Vec<f64>> = train_idx.iter().map(|&i| rows[i].clone()).collect();
        let train_targets: Vec<f64> = train_idx.iter().map(|&i| targets[i]).collect();

        let (params, cv_score) =
            grid_search(&train_rows, &train_targets, &config.grid, config.cv_folds)?;
        info!(?params, cv_score, "Best parameters");

        let model = GradientBoostedRegressor::fit(&train_rows, &train_targets, params)?;
        let val_actual: Vec<f64> = val_idx.iter().map(|&i| targets[i]).collect();
        let val_pred: Vec<f64> = val_idx.iter().map(|&i| model.predict_row(&rows[i])).collect();
        let mse = mean_squared_error(&val_actual, &val_pred);
        let r2 = r2_score(&val_actual, &val_pred);
        info!("Validation MSE: {:.4}", mse);
        if let Some(r2) = r2 {
            info!("Validation R²: {:.4}", r2);
        }

        let report = TrainReport {
            n_samples: n,
            n_train: train_idx.len(),
            n_validation: val_idx.len(),
            params,
            cv_score: Some(cv_score),
            training_mse: None,
            validation_mse: Some(mse),
            validation_r2: r2,
            top_features: Vec::new(),
        };
        (model, report)
    };

    let ranking = RankingModel::new(table.columns().to_vec(), estimator)?;
    let top_features = ranking.top_features(TOP_IMPORTANCES);
    info!("Top {} important features:", top_features.len());
    for (name, importance) in &top_features {
        info!("  {name}: {importance:.4}");
    }

    Ok((ranking, TrainReport { top_features, ..report }))
}

/// Score every row of `table` with `model`
pub fn predict(model: &RankingModel, table: &FeatureTable) -> Result<Vec<f64>> {
    model.predict(table)
}
