//! K-nearest-neighbours regression

use crate::error::{PipelineError, Result};
use ndarray::{Array1, Array2, ArrayView1};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum WeightScheme {
    /// Plain mean of the neighbours
    #[default]
    Uniform,
    /// Inverse-distance weighted mean
    Distance,
}

impl FromStr for WeightScheme {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "uniform" => Ok(WeightScheme::Uniform),
            "distance" => Ok(WeightScheme::Distance),
            other => Err(PipelineError::InvalidParameter {
                name: "weights".to_string(),
                value: other.to_string(),
                reason: "expected 'uniform' or 'distance'".to_string(),
            }),
        }
    }
}

/// Max-heap entry ordered by (distance, training row)
#[derive(Debug, PartialEq)]
struct Neighbour {
    dist: f64,
    row: usize,
}

impl Eq for Neighbour {}

impl PartialOrd for Neighbour {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Neighbour {
    fn cmp(&self, other: &Self) -> Ordering {
        self.dist
            .partial_cmp(&other.dist)
            .unwrap_or(Ordering::Equal)
            .then(self.row.cmp(&other.row))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KNNRegressor {
    pub n_neighbors: usize,
    pub weights: WeightScheme,
    x_train: Option<Array2<f64>>,
    y_train: Option<Array1<f64>>,
}

impl Default for KNNRegressor {
    fn default() -> Self {
        Self::new(5)
    }
}

impl KNNRegressor {
    pub fn new(n_neighbors: usize) -> Self {
        Self {
            n_neighbors,
            weights: WeightScheme::Uniform,
            x_train: None,
            y_train: None,
        }
    }

    pub fn with_weights(mut self, weights: WeightScheme) -> Self {
        self.weights = weights;
        self
    }

    /// Memorize the training set.
    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<&mut Self> {
        if x.nrows() != y.len() {
            return Err(PipelineError::ShapeError {
                expected: format!("y length = {}", x.nrows()),
                actual: format!("y length = {}", y.len()),
            });
        }
        if self.n_neighbors == 0 || self.n_neighbors > x.nrows() {
            return Err(PipelineError::InvalidParameter {
                name: "n_neighbors".to_string(),
                value: self.n_neighbors.to_string(),
                reason: format!("must be in 1..={} for this training set", x.nrows()),
            });
        }
        self.x_train = Some(x.clone());
        self.y_train = Some(y.clone());
        Ok(self)
    }

    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let (x_train, y_train) = match (&self.x_train, &self.y_train) {
            (Some(xt), Some(yt)) => (xt, yt),
            _ => return Err(PipelineError::ModelNotFitted),
        };
        if x.ncols() != x_train.ncols() {
            return Err(PipelineError::ShapeError {
                expected: format!("{} features", x_train.ncols()),
                actual: format!("{} features", x.ncols()),
            });
        }

        let predictions: Vec<f64> = (0..x.nrows())
            .into_par_iter()
            .map(|i| {
                let neighbours = self.k_nearest(x.row(i), x_train);
                self.aggregate(&neighbours, y_train)
            })
            .collect();
        Ok(Array1::from_vec(predictions))
    }

    /// The k closest training rows, nearest first
    fn k_nearest(&self, point: ArrayView1<f64>, x_train: &Array2<f64>) -> Vec<Neighbour> {
        let k = self.n_neighbors;
        let mut heap = BinaryHeap::with_capacity(k + 1);
        for (row, train_row) in x_train.rows().into_iter().enumerate() {
            let dist = point
                .iter()
                .zip(train_row.iter())
                .map(|(a, b)| (a - b) * (a - b))
                .sum::<f64>()
                .sqrt();
            let candidate = Neighbour { dist, row };
            if heap.len() < k {
                heap.push(candidate);
            } else if heap.peek().map_or(false, |top| candidate < *top) {
                heap.pop();
                heap.push(candidate);
            }
        }
        heap.into_sorted_vec()
    }

    fn aggregate(&self, neighbours: &[Neighbour], y_train: &Array1<f64>) -> f64 {
        match self.weights {
            WeightScheme::Uniform => {
                neighbours.iter().map(|n| y_train[n.row]).sum::<f64>() / neighbours.len() as f64
            }
            WeightScheme::Distance => {
                // an exact match dominates, as with infinite inverse-distance weight
                let exact: Vec<f64> = neighbours
                    .iter()
                    .filter(|n| n.dist == 0.0)
                    .map(|n| y_train[n.row])
                    .collect();
                if !exact.is_empty() {
                    return exact.iter().sum::<f64>() / exact.len() as f64;
                }
                let (num, den) = neighbours.iter().fold((0.0, 0.0), |(num, den), n| {
                    let w = 1.0 / n.dist;
                    (num + w * y_train[n.row], den + w)
                });
                num / den
            }
        }
    }
}
