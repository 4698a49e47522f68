use crate::gbm::GradientBoostedRegressor;
use fairrank_core::{Error, FeatureTable, Result};
use serde::{Deserialize, Serialize};

/// A fitted ensemble together with the column order it was trained on.
///
/// Predictions reindex incoming tables to `feature_names`, so a table built
/// with a different skill universe still lines up (absent skills score as 0).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankingModel {
    feature_names: Vec<String>,
    estimator: GradientBoostedRegressor,
}

impl RankingModel {
    pub fn new(feature_names: Vec<String>, estimator: GradientBoostedRegressor) -> Result<Self> {
        let model = Self {
            feature_names,
            estimator,
        };
        model.validate()?;
        Ok(model)
    }

    /// Reject models whose columns and ensemble disagree
    pub fn validate(&self) -> Result<()> {
        if self.feature_names.len() != self.estimator.n_features() {
            return Err(Error::CorruptModel(format!(
                "{} feature names for an ensemble over {} features",
                self.feature_names.len(),
                self.estimator.n_features()
            )));
        }
        self.estimator.validate()
    }

    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    pub fn estimator(&self) -> &GradientBoostedRegressor {
        &self.estimator
    }

    /// Align `table` to the training column order, dropping any target column
    pub fn align(&self, table: &FeatureTable) -> Result<FeatureTable> {
        table.without_target_column().reindex(&self.feature_names)
    }

    pub fn predict(&self, table: &FeatureTable) -> Result<Vec<f64>> {
        let aligned = self.align(table)?;
        self.estimator.predict(aligned.rows())
    }

    /// Highest-importance features, descending
    pub fn top_features(&self, k: usize) -> Vec<(String, f64)> {
        let mut ranked: Vec<(String, f64)> = self
            .feature_names
            .iter()
            .cloned()
            .zip(self.estimator.feature_importances())
            .collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
        ranked.truncate(k);
        ranked
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gbm::BoostingParams;
    use fairrank_core::features::TARGET_COLUMN;

    fn fitted() -> RankingModel {
        let rows = vec![vec![0.9, 2.0], vec![0.2, 0.0], vec![0.5, 1.0]];
        let estimator =
            GradientBoostedRegressor::fit(&rows, &[0.9, 0.1, 0.5], BoostingParams::default()).unwrap();
        RankingModel::new(vec!["cosine_similarity".into(), "skill_python".into()], estimator).unwrap()
    }

    #[test]
    fn test_name_count_must_match() {
        let estimator =
            GradientBoostedRegressor::fit(&[vec![1.0]], &[0.5], BoostingParams::default()).unwrap();
        let result = RankingModel::new(vec!["a".into(), "b".into()], estimator);
        assert!(matches!(result, Err(Error::CorruptModel(_))));
    }

    #[test]
    fn test_predict_reorders_and_drops_target() {
        let model = fitted();
        let in_order = FeatureTable::new(
            vec!["cosine_similarity".into(), "skill_python".into()],
            vec![vec![0.9, 2.0]],
        )
        .unwrap();
        let shuffled = FeatureTable::new(
            vec![TARGET_COLUMN.into(), "skill_python".into(), "cosine_similarity".into()],
            vec![vec![123.0, 2.0, 0.9]],
        )
        .unwrap();

        assert_eq!(model.predict(&in_order).unwrap(), model.predict(&shuffled).unwrap());
    }

    #[test]
    fn test_missing_skill_column_scores_as_zero() {
        let model = fitted();
        let without_skill =
            FeatureTable::new(vec!["cosine_similarity".into()], vec![vec![0.2]]).unwrap();
        let with_zero = FeatureTable::new(
            vec!["cosine_similarity".into(), "skill_python".into()],
            vec![vec![0.2, 0.0]],
        )
        .unwrap();
        assert_eq!(model.predict(&without_skill).unwrap(), model.predict(&with_zero).unwrap());
    }

    #[test]
    fn test_missing_core_column_fails() {
        let model = fitted();
        let table = FeatureTable::new(vec!["skill_python".into()], vec![vec![1.0]]).unwrap();
        assert!(matches!(model.predict(&table), Err(Error::FeatureMismatch(_))));
    }

    #[test]
    fn test_serde_round_trip_keeps_predictions() {
        let model = fitted();
        let json = serde_json::to_string(&model).unwrap();
        let restored: RankingModel = serde_json::from_str(&json).unwrap();
        restored.validate().unwrap();
        assert_eq!(model.feature_names(), restored.feature_names());

        let table = FeatureTable::new(model.feature_names().to_vec(), vec![vec![0.7, 1.0]]).unwrap();
        let a = model.predict(&table).unwrap()[0];
        let b = restored.predict(&table).unwrap()[0];
        assert!((a - b).abs() < 1e-12);
    }
}
