//! # fairrank Model
//!
//! Learned relevance scoring for fairrank.
//!
//! - [`RegressionTree`] - CART regression tree with per-node sample cover
//! - [`GradientBoostedRegressor`] - Squared-loss boosting over regression trees
//! - [`train`] - Hold-out split, grid search with k-fold CV, refit
//! - [`RankingModel`] - Fitted ensemble plus its training column order

pub mod gbm;
pub mod ranking;
pub mod train;
pub mod tree;

pub use gbm::{BoostingParams, GradientBoostedRegressor};
pub use ranking::RankingModel;
pub use train::{predict, train, ParamGrid, TrainConfig, TrainReport};
pub use tree::{RegressionTree, TreeNode, TreeParams};
