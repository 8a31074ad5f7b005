//! Integration tests for the split/scale stage

mod common;

use diabetes_mlops::data::{DataIngestion, DataLoader, Dataset, TARGET_COLUMN};
use diabetes_mlops::error::PipelineError;
use diabetes_mlops::preprocessing::{train_test_split, DataTransformation, StandardScaler};
use diabetes_mlops::utils::load_object;
use ndarray::Axis;
use tempfile::TempDir;

fn raw_dataset(config: &diabetes_mlops::config::PipelineConfig) -> Dataset {
    let df = DataLoader::new().load_csv(&config.data.raw_path).unwrap();
    Dataset::from_frame(&df, TARGET_COLUMN).unwrap()
}

#[test]
fn test_scaler_is_fitted_on_train_rows_only() {
    let dir = TempDir::new().unwrap();
    let config = common::config(dir.path());
    DataIngestion::new(&config.data).initiate().unwrap();

    let data = DataTransformation::new(&config).initiate().unwrap();
    assert_eq!(data.x_train.nrows(), 160);
    assert_eq!(data.x_test.nrows(), 40);

    let raw = raw_dataset(&config);
    let split = train_test_split(raw.n_samples(), config.data.test_size, config.data.random_state).unwrap();
    let train = raw.select_rows(&split.train);
    let test = raw.select_rows(&split.test);

    let scaler: StandardScaler = load_object(config.artifacts.scaler_path()).unwrap();
    let train_mean = train.features.mean_axis(Axis(0)).unwrap();
    let train_std = train.features.std_axis(Axis(0), 0.0);
    for j in 0..raw.n_features() {
        assert!((scaler.mean().unwrap()[j] - train_mean[j]).abs() < 1e-9);
        assert!((scaler.scale().unwrap()[j] - train_std[j]).abs() < 1e-9);
        for i in 0..test.n_samples() {
            let expected = (test.features[[i, j]] - train_mean[j]) / train_std[j];
            assert!((data.x_test[[i, j]] - expected).abs() < 1e-9);
        }
    }
    assert_eq!(data.y_test, test.target);
}

#[test]
fn test_test_rows_do_not_move_the_scaler() {
    let dir = TempDir::new().unwrap();
    let config = common::config(dir.path());
    DataIngestion::new(&config.data).initiate().unwrap();
    let raw = raw_dataset(&config);
    let stage = DataTransformation::new(&config);

    stage.transform_dataset(&raw).unwrap();
    let before: StandardScaler = load_object(config.artifacts.scaler_path()).unwrap();

    let split = train_test_split(raw.n_samples(), config.data.test_size, config.data.random_state).unwrap();
    let mut poisoned = raw.clone();
    for &row in &split.test {
        poisoned.features.row_mut(row).mapv_inplace(|v| v * 1000.0 + 1.0e6);
    }
    stage.transform_dataset(&poisoned).unwrap();
    let after: StandardScaler = load_object(config.artifacts.scaler_path()).unwrap();

    assert_eq!(before, after);
}

#[test]
fn test_transformation_is_repeatable() {
    let dir = TempDir::new().unwrap();
    let config = common::config(dir.path());
    DataIngestion::new(&config.data).initiate().unwrap();

    let stage = DataTransformation::new(&config);
    let a = stage.initiate().unwrap();
    let b = stage.initiate().unwrap();
    assert_eq!(a.x_train, b.x_train);
    assert_eq!(a.y_test, b.y_test);
}

#[test]
fn test_processed_partitions_are_written() {
    let dir = TempDir::new().unwrap();
    let config = common::config(dir.path());
    DataIngestion::new(&config.data).initiate().unwrap();

    let stage = DataTransformation::new(&config);
    let data = stage.initiate().unwrap();

    let train = DataLoader::new().load_csv(stage.train_path()).unwrap();
    let test = DataLoader::new().load_csv(stage.test_path()).unwrap();
    assert_eq!(train.height(), 160);
    assert_eq!(test.height(), 40);
    assert_eq!(train.width(), 11);

    let reloaded = Dataset::from_frame(&test, TARGET_COLUMN).unwrap();
    assert_eq!(reloaded.target, data.y_test);
}

#[test]
fn test_missing_raw_file_is_transform_error() {
    let dir = TempDir::new().unwrap();
    let config = common::config(dir.path());
    let err = DataTransformation::new(&config).initiate().unwrap_err();
    assert!(matches!(err, PipelineError::TransformError(_)));
}
