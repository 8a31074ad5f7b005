//! Transformation stage: split, scale, persist

use super::{train_test_split, StandardScaler};
use crate::config::PipelineConfig;
use crate::data::{DataLoader, DataSaver, Dataset};
use crate::error::Result;
use crate::utils::save_object;
use ndarray::{Array1, Array2};
use std::path::PathBuf;
use tracing::info;

/// Scaled partitions handed to the trainer
#[derive(Debug, Clone)]
pub struct TransformedData {
    pub feature_names: Vec<String>,
    pub x_train: Array2<f64>,
    pub x_test: Array2<f64>,
    pub y_train: Array1<f64>,
    pub y_test: Array1<f64>,
}

pub struct DataTransformation {
    raw_path: PathBuf,
    processed_dir: PathBuf,
    scaler_path: PathBuf,
    target_column: String,
    test_size: f64,
    seed: u64,
}

impl DataTransformation {
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            raw_path: config.data.raw_path.clone(),
            processed_dir: config.data.processed_dir.clone(),
            scaler_path: config.artifacts.scaler_path(),
            target_column: config.data.target_column.clone(),
            test_size: config.data.test_size,
            seed: config.data.random_state,
        }
    }

    pub fn train_path(&self) -> PathBuf {
        self.processed_dir.join("train.csv")
    }

    pub fn test_path(&self) -> PathBuf {
        self.processed_dir.join("test.csv")
    }

    /// Run the stage. Every failure comes back as `TransformError`.
    pub fn initiate(&self) -> Result<TransformedData> {
        self.run().map_err(|e| e.into_transform())
    }

    fn run(&self) -> Result<TransformedData> {
        let df = DataLoader::new().load_csv(&self.raw_path)?;
        let dataset = Dataset::from_frame(&df, &self.target_column)?;
        self.transform_dataset(&dataset)
    }

    /// Split and scale an in-memory dataset, persisting scaler and partitions.
    pub fn transform_dataset(&self, dataset: &Dataset) -> Result<TransformedData> {
        let split = train_test_split(dataset.n_samples(), self.test_size, self.seed)?;
        let train = dataset.select_rows(&split.train);
        let test = dataset.select_rows(&split.test);

        let mut scaler = StandardScaler::new(dataset.feature_names.clone());
        let x_train = scaler.fit_transform(&train.features)?;
        let x_test = scaler.transform(&test.features)?;

        save_object(&self.scaler_path, &scaler)?;

        let scaled_train = Dataset::new(train.feature_names.clone(), x_train, train.target)?;
        let scaled_test = Dataset::new(test.feature_names.clone(), x_test, test.target)?;
        DataSaver::save_csv(&mut scaled_train.to_frame(&self.target_column)?, self.train_path())?;
        DataSaver::save_csv(&mut scaled_test.to_frame(&self.target_column)?, self.test_path())?;

        info!(
            train_rows = scaled_train.n_samples(),
            test_rows = scaled_test.n_samples(),
            features = scaled_train.n_features(),
            scaler = %self.scaler_path.display(),
            "Transformation finished"
        );

        Ok(TransformedData {
            feature_names: scaled_train.feature_names,
            x_train: scaled_train.features,
            x_test: scaled_test.features,
            y_train: scaled_train.target,
            y_test: scaled_test.target,
        })
    }
}
