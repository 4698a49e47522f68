//! Gradient-boosted regression trees on squared loss.
//!
//! Prediction is `init + learning_rate * Σ tree(x)` where `init` is the
//! training-target mean and every tree is fitted to the current residuals.

use crate::tree::{RegressionTree, TreeParams};
use fairrank_core::{Error, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoostingParams {
    pub n_estimators: usize,
    pub learning_rate: f64,
    pub max_depth: usize,
    pub min_samples_split: usize,
}

impl Default for BoostingParams {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            learning_rate: 0.1,
            max_depth: 3,
            min_samples_split: 2,
        }
    }
}

impl BoostingParams {
    fn tree_params(&self) -> TreeParams {
        TreeParams {
            max_depth: self.max_depth,
            min_samples_split: self.min_samples_split,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradientBoostedRegressor {
    params: BoostingParams,
    init: f64,
    n_features: usize,
    trees: Vec<RegressionTree>,
}

impl GradientBoostedRegressor {
    /// Fit on every row of `rows`
    pub fn fit(rows: &[Vec<f64>], targets: &[f64], params: BoostingParams) -> Result<Self> {
        let indices: Vec<usize> = (0..rows.len()).collect();
        Self::fit_subset(rows, targets, &indices, params)
    }

    /// Fit on `rows[indices]` only, without copying the table
    pub fn fit_subset(
        rows: &[Vec<f64>],
        targets: &[f64],
        indices: &[usize],
        params: BoostingParams,
    ) -> Result<Self> {
        if indices.is_empty() {
            return Err(Error::EmptyInput("no training samples".to_string()));
        }
        if rows.len() != targets.len() {
            return Err(Error::InvalidDimension {
                expected: rows.len(),
                actual: targets.len(),
            });
        }
        let n_features = rows[indices[0]].len();
        if let Some(bad) = rows.iter().find(|r| r.len() != n_features) {
            return Err(Error::InvalidDimension {
                expected: n_features,
                actual: bad.len(),
            });
        }

        let init = indices.iter().map(|&i| targets[i]).sum::<f64>() / indices.len() as f64;
        let mut current = vec![init; rows.len()];
        let mut residuals = vec![0.0; rows.len()];
        let tree_params = params.tree_params();
        let mut trees = Vec::with_capacity(params.n_estimators);

        for _ in 0..params.n_estimators {
            for &i in indices {
                residuals[i] = targets[i] - current[i];
            }
            let tree = RegressionTree::fit(rows, &residuals, indices, &tree_params);
            for &i in indices {
                current[i] += params.learning_rate * tree.predict(&rows[i]);
            }
            trees.push(tree);
        }

        Ok(Self {
            params,
            init,
            n_features,
            trees,
        })
    }

    pub fn predict_row(&self, row: &[f64]) -> f64 {
        self.init
            + self.params.learning_rate * self.trees.iter().map(|t| t.predict(row)).sum::<f64>()
    }

    pub fn predict(&self, rows: &[Vec<f64>]) -> Result<Vec<f64>> {
        rows.iter()
            .map(|row| {
                if row.len() != self.n_features {
                    return Err(Error::InvalidDimension {
                        expected: self.n_features,
                        actual: row.len(),
                    });
                }
                Ok(self.predict_row(row))
            })
            .collect()
    }

    /// Mean of per-tree normalized importances, renormalized to sum to 1
    pub fn feature_importances(&self) -> Vec<f64> {
        let mut totals = vec![0.0; self.n_features];
        let mut contributing = 0usize;
        for tree in &self.trees {
            let imp = tree.feature_importances();
            if imp.iter().any(|v| *v > 0.0) {
                contributing += 1;
                for (t, v) in totals.iter_mut().zip(imp) {
                    *t += v;
                }
            }
        }
        let sum: f64 = totals.iter().sum();
        if contributing == 0 || sum <= 0.0 {
            return totals;
        }
        totals.iter().map(|v| v / sum).collect()
    }

    pub fn params(&self) -> &BoostingParams {
        &self.params
    }

    pub fn init(&self) -> f64 {
        self.init
    }

    pub fn learning_rate(&self) -> f64 {
        self.params.learning_rate
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    pub fn trees(&self) -> &[RegressionTree] {
        &self.trees
    }

    /// Structural checks for a deserialized ensemble
    pub fn validate(&self) -> Result<()> {
        if !self.init.is_finite() || !self.params.learning_rate.is_finite() {
            return Err(Error::CorruptModel("non-finite ensemble parameters".to_string()));
        }
        for (i, tree) in self.trees.iter().enumerate() {
            if tree.n_features() != self.n_features {
                return Err(Error::CorruptModel(format!(
                    "tree {i} expects {} features, ensemble has {}",
                    tree.n_features(),
                    self.n_features
                )));
            }
            tree.validate()
                .map_err(|e| Error::CorruptModel(format!("tree {i}: {e}")))?;
        }
        Ok(())
    }
}

/// Mean squared error of two equal-length slices
pub fn mean_squared_error(actual: &[f64], predicted: &[f64]) -> f64 {
    if actual.is_empty() {
        return 0.0;
    }
    actual
        .iter()
        .zip(predicted)
        .map(|(a, p)| (a - p).powi(2))
        .sum::<f64>()
        / actual.len() as f64
}

/// Coefficient of determination; `None` when the actual values have no variance
pub fn r2_score(actual: &[f64], predicted: &[f64]) -> Option<f64> {
    if actual.is_empty() {
        return None;
    }
    let mean = actual.iter().sum::<f64>() / actual.len() as f64;
    let ss_tot: f64 = actual.iter().map(|a| (a - mean).powi(2)).sum();
    if ss_tot <= f64::EPSILON {
        return None;
    }
    let ss_res: f64 = actual.iter().zip(predicted).map(|(a, p)| (a - p).powi(2)).sum();
    Some(1.0 - ss_res / ss_tot)
}
