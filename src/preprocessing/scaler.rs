//! Standard scaling: `(x - mean) / std` per feature

use crate::error::{PipelineError, Result};
use ndarray::{Array1, Array2, ArrayView1, Axis};
use serde::{Deserialize, Serialize};

/// Per-feature standardization fitted on one partition and replayed on others
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    feature_names: Vec<String>,
    mean: Option<Array1<f64>>,
    /// Population standard deviation, 1.0 where a feature is constant
    scale: Option<Array1<f64>>,
}

impl StandardScaler {
    pub fn new(feature_names: Vec<String>) -> Self {
        Self {
            feature_names,
            mean: None,
            scale: None,
        }
    }

    /// Learn mean and std from `x` only.
    pub fn fit(&mut self, x: &Array2<f64>) -> Result<&mut Self> {
        if x.ncols() != self.feature_names.len() {
            return Err(PipelineError::ShapeError {
                expected: format!("{} columns", self.feature_names.len()),
                actual: format!("{} columns", x.ncols()),
            });
        }
        let mean = x.mean_axis(Axis(0)).ok_or_else(|| {
            PipelineError::TransformError("cannot fit scaler on zero rows".to_string())
        })?;
        let scale = x
            .std_axis(Axis(0), 0.0)
            .mapv(|s| if s > f64::EPSILON && s.is_finite() { s } else { 1.0 });

        self.mean = Some(mean);
        self.scale = Some(scale);
        Ok(self)
    }

    pub fn transform(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        let (mean, scale) = self.params()?;
        self.check_width(x.ncols())?;
        Ok((x - &mean.view().insert_axis(Axis(0))) / &scale.view().insert_axis(Axis(0)))
    }

    pub fn fit_transform(&mut self, x: &Array2<f64>) -> Result<Array2<f64>> {
        self.fit(x)?;
        self.transform(x)
    }

    /// Scale a single record given in feature order
    pub fn transform_row(&self, row: ArrayView1<f64>) -> Result<Array1<f64>> {
        let (mean, scale) = self.params()?;
        self.check_width(row.len())?;
        Ok((&row - mean) / scale)
    }

    pub fn inverse_transform(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        let (mean, scale) = self.params()?;
        self.check_width(x.ncols())?;
        Ok(x * &scale.view().insert_axis(Axis(0)) + &mean.view().insert_axis(Axis(0)))
    }

    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    pub fn mean(&self) -> Option<&Array1<f64>> {
        self.mean.as_ref()
    }

    pub fn scale(&self) -> Option<&Array1<f64>> {
        self.scale.as_ref()
    }

    pub fn is_fitted(&self) -> bool {
        self.mean.is_some() && self.scale.is_some()
    }

    fn params(&self) -> Result<(&Array1<f64>, &Array1<f64>)> {
        match (&self.mean, &self.scale) {
            (Some(m), Some(s)) => Ok((m, s)),
            _ => Err(PipelineError::ModelNotFitted),
        }
    }

    fn check_width(&self, width: usize) -> Result<()> {
        if width != self.feature_names.len() {
            return Err(PipelineError::ShapeError {
                expected: format!("{} features", self.feature_names.len()),
                actual: format!("{} features", width),
            });
        }
        Ok(())
    }
}
