//! Tabular data: the diabetes feature table, CSV IO and ingestion

mod cohort;
mod ingestion;
mod loader;

pub use cohort::DiabetesCohort;
pub use ingestion::{DataIngestion, IngestionSource};
pub use loader::{DataLoader, DataSaver};

use crate::error::{PipelineError, Result};
use ndarray::{Array1, Array2, Axis};
use polars::prelude::*;

/// The ten physiological/serum features, in canonical order
pub const FEATURE_COLUMNS: [&str; 10] = [
    "age", "sex", "bmi", "bp", "s1", "s2", "s3", "s4", "s5", "s6",
];

/// Disease progression one year after baseline
pub const TARGET_COLUMN: &str = "target";

/// Feature matrix plus target vector, rows aligned
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    pub feature_names: Vec<String>,
    pub features: Array2<f64>,
    pub target: Array1<f64>,
}

impl Dataset {
    pub fn new(feature_names: Vec<String>, features: Array2<f64>, target: Array1<f64>) -> Result<Self> {
        if features.nrows() != target.len() {
            return Err(PipelineError::ShapeError {
                expected: format!("{} targets", features.nrows()),
                actual: format!("{} targets", target.len()),
            });
        }
        if features.ncols() != feature_names.len() {
            return Err(PipelineError::ShapeError {
                expected: format!("{} feature names", features.ncols()),
                actual: format!("{} feature names", feature_names.len()),
            });
        }
        Ok(Self {
            feature_names,
            features,
            target,
        })
    }

    /// Every column except `target_column`, in frame order, becomes a feature.
    pub fn from_frame(df: &DataFrame, target_column: &str) -> Result<Self> {
        let target_col = df.column(target_column).map_err(|_| {
            PipelineError::DataError(format!("target column '{}' not found", target_column))
        })?;
        let target = column_to_f64(target_col)?;

        let feature_cols: Vec<&Column> = df
            .get_columns()
            .iter()
            .filter(|c| c.name().as_str() != target_column)
            .collect();
        if feature_cols.is_empty() {
            return Err(PipelineError::DataError("frame has no feature columns".to_string()));
        }

        let feature_names = feature_cols.iter().map(|c| c.name().to_string()).collect();
        let columns: Vec<Vec<f64>> = feature_cols
            .iter()
            .map(|c| column_to_f64(c).map(|a| a.to_vec()))
            .collect::<Result<_>>()?;

        let n_rows = df.height();
        let features = Array2::from_shape_fn((n_rows, columns.len()), |(i, j)| columns[j][i]);
        Self::new(feature_names, features, target)
    }

    /// Inverse of [`Dataset::from_frame`]: features followed by the target column.
    pub fn to_frame(&self, target_column: &str) -> Result<DataFrame> {
        let mut columns: Vec<Column> = self
            .feature_names
            .iter()
            .enumerate()
            .map(|(j, name)| {
                Series::new(name.as_str().into(), self.features.column(j).to_vec()).into()
            })
            .collect();
        columns.push(Series::new(target_column.into(), self.target.to_vec()).into());
        Ok(DataFrame::new(columns)?)
    }

    pub fn n_samples(&self) -> usize {
        self.target.len()
    }

    pub fn n_features(&self) -> usize {
        self.feature_names.len()
    }

    /// Rows at `indices`, in the given order
    pub fn select_rows(&self, indices: &[usize]) -> Self {
        Self {
            feature_names: self.feature_names.clone(),
            features: self.features.select(Axis(0), indices),
            target: self.target.select(Axis(0), indices),
        }
    }
}

/// Cast a column to `f64`, rejecting nulls
pub fn column_to_f64(column: &Column) -> Result<Array1<f64>> {
    let name = column.name().to_string();
    if column.null_count() > 0 {
        return Err(PipelineError::DataError(format!(
            "column '{}' has {} missing values",
            name,
            column.null_count()
        )));
    }
    let cast = column
        .cast(&DataType::Float64)
        .map_err(|e| PipelineError::DataError(format!("column '{}' is not numeric: {}", name, e)))?;
    let values = cast.as_materialized_series().f64()?;
    values
        .into_iter()
        .map(|v| {
            v.ok_or_else(|| {
                PipelineError::DataError(format!("column '{}' has non-numeric values", name))
            })
        })
        .collect::<Result<Vec<f64>>>()
        .map(Array1::from_vec)
}
