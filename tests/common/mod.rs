//! Shared fixtures for the integration tests

#![allow(dead_code)]

use diabetes_mlops::config::{PipelineConfig, Schema};
use std::path::{Path, PathBuf};

pub const SCHEMA_YAML: &str = "COLUMNS:
  age: float64
  sex: float64
  bmi: float64
  bp: float64
  s1: float64
  s2: float64
  s3: float64
  s4: float64
  s5: float64
  s6: float64
  target: float64
";

/// Config rooted at `root` with a menu small enough for debug-build tests.
pub fn config_yaml(root: &Path) -> String {
    format!(
        r#"
data:
  raw_path: {root}/data/raw/diabetes.csv
  processed_dir: {root}/data/processed
  test_size: 0.2
  n_samples: 200
artifacts:
  model_dir: {root}/models
mlflow:
  tracking_uri: file://{root}/mlruns
  experiment_name: diabetes-test
  model_name: DiabetesProgressionModel
training:
  cv_folds: 3
  models:
    - family: linear_regression
    - family: ridge
      grid:
        alpha: [0.1, 10.0]
    - family: decision_tree
      grid:
        max_depth: [3]
    - family: knn
      grid:
        n_neighbors: [10]
"#,
        root = root.display()
    )
}

pub fn config(root: &Path) -> PipelineConfig {
    let config = PipelineConfig::from_yaml_str(&config_yaml(root)).unwrap();
    config.validate().unwrap();
    config
}

pub fn schema() -> Schema {
    Schema::from_yaml_str(SCHEMA_YAML).unwrap()
}

/// Write config and schema files under `root`, returning their paths.
pub fn write_config_files(root: &Path) -> (PathBuf, PathBuf) {
    let config_path = root.join("config.yaml");
    let schema_path = root.join("schema.yaml");
    std::fs::write(&config_path, config_yaml(root)).unwrap();
    std::fs::write(&schema_path, SCHEMA_YAML).unwrap();
    (config_path, schema_path)
}
