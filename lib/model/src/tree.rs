//! CART regression trees fitted on squared error.
//!
//! Nodes live in a flat arena; index 0 is the root. Every node records its
//! `cover` (number of training samples that reached it), which tree
//! attribution uses as the background distribution.

use serde::{Deserialize, Serialize};

/// Minimum SSE reduction for a split to be kept
const MIN_SPLIT_GAIN: f64 = 1e-12;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TreeParams {
    pub max_depth: usize,
    pub min_samples_split: usize,
}

impl Default for TreeParams {
    fn default() -> Self {
        Self {
            max_depth: 3,
            min_samples_split: 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TreeNode {
    /// Samples with `x[feature] <= threshold` go left
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
        value: f64,
        cover: f64,
    },
    Leaf {
        value: f64,
        cover: f64,
    },
}

impl TreeNode {
    #[inline]
    pub fn value(&self) -> f64 {
        match self {
            Self::Split { value, .. } | Self::Leaf { value, .. } => *value,
        }
    }

    #[inline]
    pub fn cover(&self) -> f64 {
        match self {
            Self::Split { cover, .. } | Self::Leaf { cover, .. } => *cover,
        }
    }

    #[inline]
    pub fn is_leaf(&self) -> bool {
        matches!(self, Self::Leaf { .. })
    }
}

#[derive(Debug, Clone, Copy)]
struct BestSplit {
    feature: usize,
    threshold: f64,
    gain: f64,
    /// Samples on the left after sorting by `feature`
    n_left: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegressionTree {
    nodes: Vec<TreeNode>,
    n_features: usize,
    /// Total SSE reduction per feature
    #[serde(default)]
    impurity_decrease: Vec<f64>,
}

impl RegressionTree {
    /// Fit on `rows[indices]` against `targets`. `rows` must be rectangular
    /// and `indices` non-empty.
    pub fn fit(rows: &[Vec<f64>], targets: &[f64], indices: &[usize], params: &TreeParams) -> Self {
        let n_features = rows.first().map_or(0, Vec::len);
        let mut tree = Self {
            nodes: Vec::new(),
            n_features,
            impurity_decrease: vec![0.0; n_features],
        };
        let mut indices = indices.to_vec();
        tree.grow(rows, targets, &mut indices, 0, params);
        tree
    }

    pub fn from_nodes(nodes: Vec<TreeNode>, n_features: usize) -> Self {
        Self {
            nodes,
            n_features,
            impurity_decrease: vec![0.0; n_features],
        }
    }

    fn grow(
        &mut self,
        rows: &[Vec<f64>],
        targets: &[f64],
        indices: &mut [usize],
        depth: usize,
        params: &TreeParams,
    ) -> usize {
        let n = indices.len();
        let sum: f64 = indices.iter().map(|&i| targets[i]).sum();
        let value = if n > 0 { sum / n as f64 } else { 0.0 };
        let cover = n as f64;

        let node_id = self.nodes.len();
        self.nodes.push(TreeNode::Leaf { value, cover });

        if depth >= params.max_depth || n < params.min_samples_split.max(2) {
            return node_id;
        }

        let Some(best) = self.best_split(rows, targets, indices) else {
            return node_id;
        };

        indices.sort_by(|&a, &b| rows[a][best.feature].total_cmp(&rows[b][best.feature]));
        let (left_idx, right_idx) = indices.split_at_mut(best.n_left);

        self.impurity_decrease[best.feature] += best.gain;
        let left = self.grow(rows, targets, left_idx, depth + 1, params);
        let right = self.grow(rows, targets, right_idx, depth + 1, params);

        self.nodes[node_id] = TreeNode::Split {
            feature: best.feature,
            threshold: best.threshold,
            left,
            right,
            value,
            cover,
        };
        node_id
    }

    /// Exhaustive search over features and midpoints between distinct values.
    /// Ties keep the first split found.
    fn best_split(&self, rows: &[Vec<f64>], targets: &[f64], indices: &[usize]) -> Option<BestSplit> {
        let n = indices.len();
        let total: f64 = indices.iter().map(|&i| targets[i]).sum();
        let parent_score = total * total / n as f64;

        let mut best: Option<BestSplit> = None;
        let mut order = indices.to_vec();

        for feature in 0..self.n_features {
            order.sort_by(|&a, &b| rows[a][feature].total_cmp(&rows[b][feature]));

            let mut left_sum = 0.0;
            for pos in 0..n - 1 {
                left_sum += targets[order[pos]];
                let here = rows[order[pos]][feature];
                let next = rows[order[pos + 1]][feature];
                if next <= here {
                    continue;
                }

                let n_left = (pos + 1) as f64;
                let n_right = (n - pos - 1) as f64;
                let right_sum = total - left_sum;
                let gain = left_sum * left_sum / n_left + right_sum * right_sum / n_right
                    - parent_score;

                if gain > MIN_SPLIT_GAIN && best.map_or(true, |b| gain > b.gain) {
                    best = Some(BestSplit {
                        feature,
                        threshold: here + (next - here) / 2.0,
                        gain,
                        n_left: pos + 1,
                    });
                }
            }
        }

        best
    }

    pub fn predict(&self, row: &[f64]) -> f64 {
        let mut idx = 0;
        loop {
            match &self.nodes[idx] {
                TreeNode::Leaf { value, .. } => return *value,
                TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                    ..
                } => {
                    idx = if row[*feature] <= *threshold { *left } else { *right };
                }
            }
        }
    }

    /// Cover-weighted mean of the leaf values
    pub fn expected_value(&self) -> f64 {
        let root_cover = self.nodes.first().map_or(0.0, TreeNode::cover);
        if root_cover <= 0.0 {
            return self.nodes.first().map_or(0.0, TreeNode::value);
        }
        self.nodes
            .iter()
            .filter(|n| n.is_leaf())
            .map(|n| n.value() * n.cover())
            .sum::<f64>()
            / root_cover
    }

    /// Per-feature impurity decrease, normalized to sum to 1 (all zeros for a stump)
    pub fn feature_importances(&self) -> Vec<f64> {
        let total: f64 = self.impurity_decrease.iter().sum();
        if total <= 0.0 {
            return vec![0.0; self.n_features];
        }
        self.impurity_decrease.iter().map(|v| v / total).collect()
    }

    pub fn nodes(&self) -> &[TreeNode] {
        &self.nodes
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    pub fn depth(&self) -> usize {
        fn walk(nodes: &[TreeNode], idx: usize) -> usize {
            match &nodes[idx] {
                TreeNode::Leaf { .. } => 0,
                TreeNode::Split { left, right, .. } => {
                    1 + walk(nodes, *left).max(walk(nodes, *right))
                }
            }
        }
        if self.nodes.is_empty() {
            0
        } else {
            walk(&self.nodes, 0)
        }
    }

    /// Structural consistency: children in range and after their parent,
    /// split features below `n_features`
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.nodes.is_empty() {
            return Err("tree has no nodes".to_string());
        }
        for (idx, node) in self.nodes.iter().enumerate() {
            if let TreeNode::Split {
                feature,
                left,
                right,
                ..
            } = node
            {
                if *feature >= self.n_features {
                    return Err(format!("node {idx} splits on feature {feature} of {}", self.n_features));
                }
                for child in [*left, *right] {
                    if child <= idx || child >= self.nodes.len() {
                        return Err(format!("node {idx} has invalid child {child}"));
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step_data() -> (Vec<Vec<f64>>, Vec<f64>) {
        let rows = vec![vec![1.0, 5.0], vec![2.0, 5.0], vec![3.0, 5.0], vec![4.0, 5.0]];
        let targets = vec![0.0, 0.0, 1.0, 1.0];
        (rows, targets)
    }

    #[test]
    fn test_single_split_recovers_step() {
        let (rows, targets) = step_data();
        let tree = RegressionTree::fit(&rows, &targets, &[0, 1, 2, 3], &TreeParams::default());

        match &tree.nodes()[0] {
            TreeNode::Split { feature, threshold, cover, .. } => {
                assert_eq!(*feature, 0);
                assert_eq!(*threshold, 2.5);
                assert_eq!(*cover, 4.0);
            }
            TreeNode::Leaf { .. } => panic!("expected a split at the root"),
        }
        assert_eq!(tree.predict(&[1.5, 0.0]), 0.0);
        assert_eq!(tree.predict(&[3.5, 0.0]), 1.0);
        assert_eq!(tree.depth(), 1);
    }

    #[test]
    fn test_constant_targets_make_a_leaf() {
        let rows = vec![vec![1.0], vec![2.0], vec![3.0]];
        let tree = RegressionTree::fit(&rows, &[0.4, 0.4, 0.4], &[0, 1, 2], &TreeParams::default());
        assert_eq!(tree.nodes().len(), 1);
        assert!((tree.predict(&[10.0]) - 0.4).abs() < 1e-12);
    }

    #[test]
    fn test_depth_limit() {
        let rows: Vec<Vec<f64>> = (0..16).map(|i| vec![i as f64]).collect();
        let targets: Vec<f64> = (0..16).map(|i| (i * i) as f64).collect();
        let indices: Vec<usize> = (0..16).collect();
        let params = TreeParams { max_depth: 2, min_samples_split: 2 };
        let tree = RegressionTree::fit(&rows, &targets, &indices, &params);
        assert!(tree.depth() <= 2);
        assert!(tree.nodes().len() <= 7);
    }

    #[test]
    fn test_min_samples_split() {
        let (rows, targets) = step_data();
        let params = TreeParams { max_depth: 3, min_samples_split: 5 };
        let tree = RegressionTree::fit(&rows, &targets, &[0, 1, 2, 3], &params);
        assert_eq!(tree.nodes().len(), 1);
        assert!((tree.predict(&[0.0, 0.0]) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_expected_value_matches_mean() {
        let (rows, targets) = step_data();
        let tree = RegressionTree::fit(&rows, &targets, &[0, 1, 2, 3], &TreeParams::default());
        assert!((tree.expected_value() - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_importances_favor_informative_feature() {
        let (rows, targets) = step_data();
        let tree = RegressionTree::fit(&rows, &targets, &[0, 1, 2, 3], &TreeParams::default());
        assert_eq!(tree.feature_importances(), vec![1.0, 0.0]);
    }

    #[test]
    fn test_validate_rejects_bad_child() {
        let tree = RegressionTree::from_nodes(
            vec![TreeNode::Split {
                feature: 0,
                threshold: 0.5,
                left: 1,
                right: 7,
                value: 0.0,
                cover: 2.0,
            }],
            1,
        );
        assert!(tree.validate().is_err());
    }
}
