//! Exact path-dependent TreeSHAP.
//!
//! For each tree, Shapley values are computed in polynomial time by tracking
//! the proportion of feature subsets that flow down every root-to-leaf path.
//! Missing features follow both children weighted by training cover, so the
//! attributions sum to `f(x) - E[f]` with `E[f]` the cover-weighted mean leaf.

use fairrank_model::{GradientBoostedRegressor, RegressionTree, TreeNode};

#[derive(Debug, Clone, Copy)]
struct PathElement {
    feature: Option<usize>,
    zero_fraction: f64,
    one_fraction: f64,
    pweight: f64,
}

/// Add a split to the path, updating the permutation weights
fn extend_path(
    path: &mut Vec<PathElement>,
    unique_depth: usize,
    zero_fraction: f64,
    one_fraction: f64,
    feature: Option<usize>,
) {
    path.truncate(unique_depth);
    path.push(PathElement {
        feature,
        zero_fraction,
        one_fraction,
        pweight: if unique_depth == 0 { 1.0 } else { 0.0 },
    });

    let denom = (unique_depth + 1) as f64;
    for i in (0..unique_depth).rev() {
        path[i + 1].pweight += one_fraction * path[i].pweight * (i + 1) as f64 / denom;
        path[i].pweight = zero_fraction * path[i].pweight * (unique_depth - i) as f64 / denom;
    }
}

/// Undo a previous extension so a repeated feature is counted once
fn unwind_path(path: &mut Vec<PathElement>, unique_depth: usize, path_index: usize) {
    let one_fraction = path[path_index].one_fraction;
    let zero_fraction = path[path_index].zero_fraction;
    let mut next_one_portion = path[unique_depth].pweight;
    let denom = (unique_depth + 1) as f64;

    for i in (0..unique_depth).rev() {
        if one_fraction != 0.0 {
            let tmp = path[i].pweight;
            path[i].pweight = next_one_portion * denom / ((i + 1) as f64 * one_fraction);
            next_one_portion =
                tmp - path[i].pweight * zero_fraction * (unique_depth - i) as f64 / denom;
        } else {
            path[i].pweight = path[i].pweight * denom / (zero_fraction * (unique_depth - i) as f64);
        }
    }

    for i in path_index..unique_depth {
        path[i].feature = path[i + 1].feature;
        path[i].zero_fraction = path[i + 1].zero_fraction;
        path[i].one_fraction = path[i + 1].one_fraction;
    }
    path.truncate(unique_depth);
}

/// Total permutation weight with `path_index` unwound, without mutating the path
fn unwound_path_sum(path: &[PathElement], unique_depth: usize, path_index: usize) -> f64 {
    let one_fraction = path[path_index].one_fraction;
    let zero_fraction = path[path_index].zero_fraction;
    let mut next_one_portion = path[unique_depth].pweight;
    let denom = (unique_depth + 1) as f64;
    let mut total = 0.0;

    for i in (0..unique_depth).rev() {
        if one_fraction != 0.0 {
            let tmp = next_one_portion * denom / ((i + 1) as f64 * one_fraction);
            total += tmp;
            next_one_portion =
                path[i].pweight - tmp * zero_fraction * (unique_depth - i) as f64 / denom;
        } else if zero_fraction != 0.0 {
            total += path[i].pweight / zero_fraction / ((unique_depth - i) as f64 / denom);
        }
    }
    total
}

struct Walker<'a> {
    nodes: &'a [TreeNode],
    row: &'a [f64],
    phi: &'a mut [f64],
}

impl Walker<'_> {
    fn recurse(
        &mut self,
        node: usize,
        parent_path: &[PathElement],
        unique_depth: usize,
        zero_fraction: f64,
        one_fraction: f64,
        feature: Option<usize>,
    ) {
        let mut path = parent_path.to_vec();
        extend_path(&mut path, unique_depth, zero_fraction, one_fraction, feature);
        let mut unique_depth = unique_depth;
        let nodes = self.nodes;

        match &nodes[node] {
            TreeNode::Leaf { value, .. } => {
                for i in 1..=unique_depth {
                    let weight = unwound_path_sum(&path, unique_depth, i);
                    let el = path[i];
                    if let Some(f) = el.feature {
                        self.phi[f] += weight * (el.one_fraction - el.zero_fraction) * value;
                    }
                }
            }
            TreeNode::Split {
                feature: split_feature,
                threshold,
                left,
                right,
                cover,
                ..
            } => {
                let (hot, cold) = if self.row[*split_feature] <= *threshold {
                    (*left, *right)
                } else {
                    (*right, *left)
                };
                let hot_zero = nodes[hot].cover() / cover;
                let cold_zero = nodes[cold].cover() / cover;

                let mut incoming_zero = 1.0;
                let mut incoming_one = 1.0;
                if let Some(k) = (1..=unique_depth).find(|&k| path[k].feature == Some(*split_feature)) {
                    incoming_zero = path[k].zero_fraction;
                    incoming_one = path[k].one_fraction;
                    unwind_path(&mut path, unique_depth, k);
                    unique_depth -= 1;
                }

                let split = Some(*split_feature);
                self.recurse(hot, &path, unique_depth + 1, hot_zero * incoming_zero, incoming_one, split);
                self.recurse(cold, &path, unique_depth + 1, cold_zero * incoming_zero, 0.0, split);
            }
        }
    }
}

/// Add one tree's Shapley values for `row` into `phi`
pub fn tree_shap(tree: &RegressionTree, row: &[f64], phi: &mut [f64]) {
    if tree.nodes().is_empty() {
        return;
    }
    let mut walker = Walker {
        nodes: tree.nodes(),
        row,
        phi,
    };
    walker.recurse(0, &[], 0, 1.0, 1.0, None);
}

/// Baseline of the ensemble: `init + lr * Σ E[tree]`
pub fn expected_value(model: &GradientBoostedRegressor) -> f64 {
    model.init()
        + model.learning_rate()
            * model.trees().iter().map(RegressionTree::expected_value).sum::<f64>()
}

/// Per-feature Shapley values of the ensemble for one row
pub fn ensemble_shap(model: &GradientBoostedRegressor, row: &[f64]) -> Vec<f64> {
    let mut phi = vec![0.0; model.n_features()];
    for tree in model.trees() {
        tree_shap(tree, row, &mut phi);
    }
    let lr = model.learning_rate();
    phi.iter_mut().for_each(|v| *v *= lr);
    phi
}

#[cfg(test)]
mod tests {
    use super::*;
    use fairrank_model::{BoostingParams, TreeParams};

    /// E[f(x) | x_S] under the tree's cover distribution
    fn conditional_expectation(nodes: &[TreeNode], idx: usize, row: &[f64], known: &[bool]) -> f64 {
        match &nodes[idx] {
            TreeNode::Leaf { value, .. } => *value,
            TreeNode::Split { feature, threshold, left, right, cover, .. } => {
                if known[*feature] {
                    let next = if row[*feature] <= *threshold { *left } else { *right };
                    conditional_expectation(nodes, next, row, known)
                } else {
                    (nodes[*left].cover() * conditional_expectation(nodes, *left, row, known)
                        + nodes[*right].cover() * conditional_expectation(nodes, *right, row, known))
                        / cover
                }
            }
        }
    }

    fn factorial(n: usize) -> f64 {
        (1..=n).map(|v| v as f64).product()
    }

    /// Exponential-time Shapley values by subset enumeration
    fn brute_force(tree: &RegressionTree, row: &[f64]) -> Vec<f64> {
        let m = tree.n_features();
        let mut phi = vec![0.0; m];
        for i in 0..m {
            for mask in 0..(1usize << m) {
                if mask & (1 << i) != 0 {
                    continue;
                }
                let mut known: Vec<bool> = (0..m).map(|j| mask & (1 << j) != 0).collect();
                let s = known.iter().filter(|k| **k).count();
                let without = conditional_expectation(tree.nodes(), 0, row, &known);
                known[i] = true;
                let with = conditional_expectation(tree.nodes(), 0, row, &known);
                let weight = factorial(s) * factorial(m - s - 1) / factorial(m);
                phi[i] += weight * (with - without);
            }
        }
        phi
    }

    fn dataset() -> (Vec<Vec<f64>>, Vec<f64>) {
        let rows: Vec<Vec<f64>> = (0..24)
            .map(|i| vec![(i % 4) as f64, (i % 3) as f64, (i / 6) as f64])
            .collect();
        let targets = rows
            .iter()
            .map(|r| r[0] * 0.5 + if r[1] > 1.0 { 1.0 } else { 0.0 } + r[0] * r[2] * 0.1)
            .collect();
        (rows, targets)
    }

    #[test]
    fn test_matches_brute_force_shapley() {
        let (rows, targets) = dataset();
        let indices: Vec<usize> = (0..rows.len()).collect();
        let tree = RegressionTree::fit(&rows, &targets, &indices, &TreeParams { max_depth: 4, min_samples_split: 2 });

        for row in [vec![3.0, 2.0, 1.0], vec![0.0, 0.0, 3.0], vec![1.5, 1.0, 2.0]] {
            let mut phi = vec![0.0; 3];
            tree_shap(&tree, &row, &mut phi);
            let expected = brute_force(&tree, &row);
            for (a, b) in phi.iter().zip(&expected) {
                assert!((a - b).abs() < 1e-9, "{phi:?} vs {expected:?}");
            }
        }
    }

    #[test]
    fn test_ensemble_attributions_are_additive() {
        let (rows, targets) = dataset();
        let params = BoostingParams { n_estimators: 30, ..BoostingParams::default() };
        let model = GradientBoostedRegressor::fit(&rows, &targets, params).unwrap();
        let base = expected_value(&model);

        for row in &rows {
            let phi = ensemble_shap(&model, row);
            let reconstructed = base + phi.iter().sum::<f64>();
            assert!((reconstructed - model.predict_row(row)).abs() < 1e-9);
        }
    }

    #[test]
    fn test_unused_feature_gets_zero() {
        let rows = vec![vec![0.0, 7.0], vec![1.0, 7.0], vec![2.0, 7.0], vec![3.0, 7.0]];
        let targets = vec![0.0, 0.0, 1.0, 1.0];
        let tree = RegressionTree::fit(&rows, &targets, &[0, 1, 2, 3], &TreeParams::default());
        let mut phi = vec![0.0; 2];
        tree_shap(&tree, &[3.0, 7.0], &mut phi);
        assert!((phi[0] - 0.5).abs() < 1e-12);
        assert_eq!(phi[1], 0.0);
    }
}
