//! Exhaustive hyperparameter search scored by k-fold R²

use super::cross_validation::{cross_val_score, CVResults, CrossValidator};
use super::models::{Estimator, ModelFamily};
use super::params::{Hyperparameters, ParamGrid};
use crate::error::{PipelineError, Result};
use ndarray::{Array1, Array2};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// CV outcome for one hyperparameter combination
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateScore {
    pub params: Hyperparameters,
    pub cv: CVResults,
}

#[derive(Debug, Clone)]
pub struct GridSearchResult {
    pub best_params: Hyperparameters,
    pub best_score: f64,
    /// Best candidate refit on the full training partition
    pub best_estimator: Estimator,
    pub cv_results: Vec<CandidateScore>,
}

/// Grid search over one model family
#[derive(Debug, Clone)]
pub struct GridSearchCV {
    family: ModelFamily,
    grid: ParamGrid,
    cv: CrossValidator,
    seed: u64,
}

impl GridSearchCV {
    pub fn new(family: ModelFamily, grid: ParamGrid) -> Self {
        Self {
            family,
            grid,
            cv: CrossValidator::k_fold(5),
            seed: 42,
        }
    }

    pub fn with_cv(mut self, cv: CrossValidator) -> Self {
        self.cv = cv;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn fit(&self, x: &Array2<f64>, y: &Array1<f64>) -> Result<GridSearchResult> {
        let candidates = self.grid.combinations()?;

        // Build every estimator up front so bad parameters fail before any fitting
        let templates = candidates
            .iter()
            .map(|params| self.family.build(params, self.seed))
            .collect::<Result<Vec<_>>>()?;

        let scores: Vec<CVResults> = templates
            .par_iter()
            .map(|template| cross_val_score(template, x, y, &self.cv))
            .collect::<Result<Vec<_>>>()?;

        let mut best: Option<(usize, f64)> = None;
        for (idx, result) in scores.iter().enumerate() {
            let score = result.mean_score;
            debug!(family = %self.family, params = %candidates[idx], cv_r2 = score, "candidate scored");
            if !score.is_finite() {
                continue;
            }
            match best {
                Some((_, current)) if score <= current => {}
                _ => best = Some((idx, score)),
            }
        }

        let (best_idx, best_score) = best.ok_or_else(|| {
            PipelineError::TrainingError(format!(
                "no {} candidate produced a finite cross-validated score",
                self.family
            ))
        })?;

        let mut best_estimator = templates[best_idx].clone();
        best_estimator.fit(x, y)?;

        let cv_results = candidates
            .into_iter()
            .zip(scores)
            .map(|(params, cv)| CandidateScore { params, cv })
            .collect::<Vec<_>>();

        Ok(GridSearchResult {
            best_params: cv_results[best_idx].params.clone(),
            best_score,
            best_estimator,
            cv_results,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::training::params::ParamValue;
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;

    fn linear_data(n: usize) -> (Array2<f64>, Array1<f64>) {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let x = Array2::from_shape_fn((n, 3), |_| rng.gen_range(-1.0..1.0));
        let y = x.rows().into_iter().map(|r| 2.0 * r[0] - r[1] + 0.5 * r[2]).collect();
        (x, y)
    }

    #[test]
    fn test_prefers_light_regularisation_on_clean_data() {
        let (x, y) = linear_data(60);
        let grid = ParamGrid::new().add(
            "alpha",
            vec![ParamValue::Float(100.0), ParamValue::Float(0.01), ParamValue::Float(10.0)],
        );
        let result = GridSearchCV::new(ModelFamily::Ridge, grid).fit(&x, &y).unwrap();
        assert_eq!(result.best_params.get("alpha"), Some(&ParamValue::Float(0.01)));
        assert_eq!(result.cv_results.len(), 3);
        assert!(result.best_score > 0.99);
    }

    #[test]
    fn test_ties_go_to_first_candidate() {
        let (x, y) = linear_data(40);
        // Both candidates are identical models, so their scores tie exactly
        let grid = ParamGrid::new().add("max_iter", vec![ParamValue::Int(500), ParamValue::Int(500)]);
        let result = GridSearchCV::new(ModelFamily::Lasso, grid).fit(&x, &y).unwrap();
        assert_eq!(result.cv_results[0].cv.mean_score, result.cv_results[1].cv.mean_score);
        assert_eq!(result.best_score, result.cv_results[0].cv.mean_score);
    }

    #[test]
    fn test_empty_grid_scores_defaults() {
        let (x, y) = linear_data(30);
        let result = GridSearchCV::new(ModelFamily::LinearRegression, ParamGrid::new())
            .fit(&x, &y)
            .unwrap();
        assert!(result.best_params.is_empty());
        assert_eq!(result.cv_results.len(), 1);
        let preds = result.best_estimator.predict(&x).unwrap();
        assert!((preds[0] - y[0]).abs() < 1e-8);
    }

    #[test]
    fn test_invalid_candidate_aborts_search() {
        let (x, y) = linear_data(30);
        let grid = ParamGrid::new().add("n_neighbors", vec![ParamValue::Int(0)]);
        assert!(GridSearchCV::new(ModelFamily::Knn, grid).fit(&x, &y).is_err());
    }
}
