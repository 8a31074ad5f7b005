//! K-fold cross-validation

use super::metrics::r2_score;
use super::models::Estimator;
use crate::error::{PipelineError, Result};
use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};

/// A single train/validation split
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CVSplit {
    pub train_indices: Vec<usize>,
    pub test_indices: Vec<usize>,
    pub fold_idx: usize,
}

/// Unshuffled k-fold splitter: contiguous folds, the first `n % k` folds
/// one row larger.
#[derive(Debug, Clone)]
pub struct CrossValidator {
    n_splits: usize,
}

impl CrossValidator {
    pub fn k_fold(n_splits: usize) -> Self {
        Self { n_splits }
    }

    pub fn split(&self, n_samples: usize) -> Result<Vec<CVSplit>> {
        let k = self.n_splits;
        if k < 2 {
            return Err(PipelineError::InvalidParameter {
                name: "n_splits".to_string(),
                value: k.to_string(),
                reason: "must be at least 2".to_string(),
            });
        }
        if n_samples < k {
            return Err(PipelineError::InvalidParameter {
                name: "n_splits".to_string(),
                value: k.to_string(),
                reason: format!("cannot exceed the number of samples ({})", n_samples),
            });
        }

        let indices: Vec<usize> = (0..n_samples).collect();

        let base = n_samples / k;
        let remainder = n_samples % k;
        let mut splits = Vec::with_capacity(k);
        let mut start = 0;
        for fold_idx in 0..k {
            let size = if fold_idx < remainder { base + 1 } else { base };
            let end = start + size;
            splits.push(CVSplit {
                test_indices: indices[start..end].to_vec(),
                train_indices: indices[..start].iter().chain(&indices[end..]).copied().collect(),
                fold_idx,
            });
            start = end;
        }
        Ok(splits)
    }
}

/// Per-fold scores and their summary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CVResults {
    pub scores: Vec<f64>,
    pub mean_score: f64,
    pub std_score: f64,
    pub n_folds: usize,
}

impl CVResults {
    pub fn from_scores(scores: Vec<f64>) -> Self {
        let n_folds = scores.len();
        if n_folds == 0 {
            return Self {
                scores,
                mean_score: f64::NAN,
                std_score: f64::NAN,
                n_folds,
            };
        }
        let mean_score = scores.iter().sum::<f64>() / n_folds as f64;
        let variance = scores.iter().map(|s| (s - mean_score).powi(2)).sum::<f64>() / n_folds as f64;
        Self {
            scores,
            mean_score,
            std_score: variance.sqrt(),
            n_folds,
        }
    }
}

/// Fit a fresh copy of `template` on each training fold and score R² on the held-out fold.
pub fn cross_val_score(
    template: &Estimator,
    x: &Array2<f64>,
    y: &Array1<f64>,
    cv: &CrossValidator,
) -> Result<CVResults> {
    let scores = cv
        .split(x.nrows())?
        .iter()
        .map(|split| {
            let mut model = template.clone();
            let x_train = x.select(Axis(0), &split.train_indices);
            let y_train = y.select(Axis(0), &split.train_indices);
            model.fit(&x_train, &y_train)?;

            let x_val = x.select(Axis(0), &split.test_indices);
            let y_val = y.select(Axis(0), &split.test_indices);
            r2_score(&y_val, &model.predict(&x_val)?)
        })
        .collect::<Result<Vec<f64>>>()?;
    Ok(CVResults::from_scores(scores))
}
