//! Gradient boosted regression trees (least-squares loss)

use super::decision_tree::DecisionTreeRegressor;
use crate::error::{PipelineError, Result};
use ndarray::{Array1, Array2};
use rand::seq::index::sample;
use rand::SeedableRng;
use rand_xoshiro::Xoshiro256PlusPlus;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradientBoostingConfig {
    pub n_estimators: usize,
    /// Shrinkage applied to every tree's contribution
    pub learning_rate: f64,
    pub max_depth: Option<usize>,
    pub min_samples_leaf: usize,
    /// Fraction of rows each tree sees, drawn without replacement
    pub subsample: f64,
    pub random_state: u64,
}

impl Default for GradientBoostingConfig {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            learning_rate: 0.1,
            max_depth: Some(3),
            min_samples_leaf: 1,
            subsample: 1.0,
            random_state: 42,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradientBoostingRegressor {
    config: GradientBoostingConfig,
    initial_prediction: f64,
    trees: Vec<DecisionTreeRegressor>,
}

impl Default for GradientBoostingRegressor {
    fn default() -> Self {
        Self::new(GradientBoostingConfig::default())
    }
}

impl GradientBoostingRegressor {
    pub fn new(config: GradientBoostingConfig) -> Self {
        Self {
            config,
            initial_prediction: 0.0,
            trees: Vec::new(),
        }
    }

    pub fn config(&self) -> &GradientBoostingConfig {
        &self.config
    }

    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<&mut Self> {
        let n_samples = x.nrows();
        if n_samples != y.len() {
            return Err(PipelineError::ShapeError {
                expected: format!("y length = {}", n_samples),
                actual: format!("y length = {}", y.len()),
            });
        }
        let subsample = self.config.subsample;
        if !(subsample > 0.0 && subsample <= 1.0) {
            return Err(PipelineError::InvalidParameter {
                name: "subsample".to_string(),
                value: subsample.to_string(),
                reason: "must be in (0, 1]".to_string(),
            });
        }

        self.initial_prediction = y.mean().ok_or_else(|| {
            PipelineError::ComputationError("cannot boost on zero rows".to_string())
        })?;
        self.trees.clear();

        let mut rng = Xoshiro256PlusPlus::seed_from_u64(self.config.random_state);
        let n_rows = ((n_samples as f64 * subsample).round() as usize).clamp(1, n_samples);
        let mut predictions = Array1::from_elem(n_samples, self.initial_prediction);

        for _ in 0..self.config.n_estimators {
            let residuals = y - &predictions;
            let rows: Vec<usize> = if n_rows < n_samples {
                let mut picked = sample(&mut rng, n_samples, n_rows).into_vec();
                picked.sort_unstable();
                picked
            } else {
                (0..n_samples).collect()
            };

            let mut tree = DecisionTreeRegressor::new()
                .with_max_depth(self.config.max_depth)
                .with_min_samples_leaf(self.config.min_samples_leaf);
            tree.fit_on(x, &residuals, &rows)?;

            predictions.scaled_add(self.config.learning_rate, &tree.predict(x)?);
            self.trees.push(tree);
        }
        Ok(self)
    }

    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        if self.trees.is_empty() && self.config.n_estimators > 0 {
            return Err(PipelineError::ModelNotFitted);
        }
        let mut predictions = Array1::from_elem(x.nrows(), self.initial_prediction);
        for tree in &self.trees {
            predictions.scaled_add(self.config.learning_rate, &tree.predict(x)?);
        }
        Ok(predictions)
    }
}
