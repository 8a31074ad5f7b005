//! Pipeline configuration
//!
//! `configs/config.yaml` is deserialized into [`PipelineConfig`]. The `data`,
//! `artifacts` and `mlflow` sections are required; `training` and `serving`
//! fall back to defaults. Loading validates ranges and applies environment
//! overrides, so a config that comes back from [`PipelineConfig::from_yaml_file`]
//! is ready to drive every stage.

mod schema;

pub use schema::Schema;

use crate::error::{PipelineError, Result};
use crate::tracking::Stage;
use crate::training::{default_model_menu, ModelSpec};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Environment variable overriding `mlflow.tracking_uri`
pub const TRACKING_URI_ENV: &str = "MLFLOW_TRACKING_URI";

/// Complete, validated pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub data: DataConfig,
    pub artifacts: ArtifactsConfig,
    pub mlflow: TrackingConfig,
    #[serde(default)]
    pub training: TrainingSettings,
    #[serde(default)]
    pub serving: ServingSettings,
}

/// `data.*` keys
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataConfig {
    /// Where ingestion writes the raw CSV and downstream stages read it
    pub raw_path: PathBuf,
    /// Fraction of rows held out for testing, strictly between 0 and 1
    pub test_size: f64,
    #[serde(default = "default_processed_dir")]
    pub processed_dir: PathBuf,
    #[serde(default = "default_target_column")]
    pub target_column: String,
    #[serde(default = "default_random_state")]
    pub random_state: u64,
    /// Rows produced by the built-in cohort source
    #[serde(default = "default_n_samples")]
    pub n_samples: usize,
    /// Optional CSV to ingest instead of the built-in cohort
    #[serde(default)]
    pub source: Option<PathBuf>,
}

/// `artifacts.*` keys
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactsConfig {
    pub model_dir: PathBuf,
    #[serde(default = "default_status_file")]
    pub status_file: PathBuf,
    #[serde(default = "default_model_file")]
    pub model_file: String,
    #[serde(default = "default_scaler_file")]
    pub scaler_file: String,
}

impl ArtifactsConfig {
    /// Local fallback copy of the champion model
    pub fn model_path(&self) -> PathBuf {
        self.model_dir.join(&self.model_file)
    }

    /// Fitted scaler, never hosted by the registry
    pub fn scaler_path(&self) -> PathBuf {
        self.model_dir.join(&self.scaler_file)
    }

    /// Validation status file. Relative paths live under `model_dir`.
    pub fn status_path(&self) -> PathBuf {
        if self.status_file.is_absolute() {
            self.status_file.clone()
        } else {
            self.model_dir.join(&self.status_file)
        }
    }
}

/// `mlflow.*` keys: experiment tracking and registry addressing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackingConfig {
    pub tracking_uri: String,
    pub experiment_name: String,
    pub model_name: String,
    /// Registry stage serving resolves
    #[serde(default = "default_stage")]
    pub stage: String,
}

/// `training.*` keys
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingSettings {
    #[serde(default = "default_cv_folds")]
    pub cv_folds: usize,
    /// Model families to evaluate, in tie-break order
    #[serde(default = "default_model_menu")]
    pub models: Vec<ModelSpec>,
}

impl Default for TrainingSettings {
    fn default() -> Self {
        Self {
            cv_folds: default_cv_folds(),
            models: default_model_menu(),
        }
    }
}

/// `serving.*` keys
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServingSettings {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServingSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_processed_dir() -> PathBuf {
    PathBuf::from("data/processed")
}
fn default_target_column() -> String {
    crate::data::TARGET_COLUMN.to_string()
}
fn default_random_state() -> u64 {
    42
}
fn default_n_samples() -> usize {
    442
}
fn default_status_file() -> PathBuf {
    PathBuf::from("status.txt")
}
fn default_model_file() -> String {
    "model.bin".to_string()
}
fn default_scaler_file() -> String {
    "scaler.bin".to_string()
}
fn default_stage() -> String {
    "Production".to_string()
}
fn default_cv_folds() -> usize {
    5
}
fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8000
}

impl PipelineConfig {
    /// Read, parse, override from the environment and validate a YAML config file.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            PipelineError::ConfigError(format!("cannot read {}: {}", path.display(), e))
        })?;
        let mut config = Self::from_yaml_str(&contents)?;
        config.apply_env_overrides();
        config.validate()?;
        info!(
            path = %path.display(),
            raw_path = %config.data.raw_path.display(),
            experiment = %config.mlflow.experiment_name,
            families = config.training.models.len(),
            "Loaded pipeline configuration"
        );
        Ok(config)
    }

    /// Parse without touching the environment. Validation is left to the caller.
    pub fn from_yaml_str(contents: &str) -> Result<Self> {
        serde_yaml::from_str(contents).map_err(|e| PipelineError::ConfigError(e.to_string()))
    }

    /// `MLFLOW_TRACKING_URI`, `API_HOST` and `API_PORT` take precedence over the file.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(uri) = std::env::var(TRACKING_URI_ENV) {
            if !uri.trim().is_empty() {
                debug!(tracking_uri = %uri, "Tracking URI overridden from environment");
                self.mlflow.tracking_uri = uri;
            }
        }
        if let Ok(host) = std::env::var("API_HOST") {
            self.serving.host = host;
        }
        if let Some(port) = std::env::var("API_PORT").ok().and_then(|p| p.parse().ok()) {
            self.serving.port = port;
        }
    }

    /// Fail fast on values serde accepts but the pipeline cannot use.
    pub fn validate(&self) -> Result<()> {
        let ts = self.data.test_size;
        if !(ts > 0.0 && ts < 1.0) {
            return Err(PipelineError::ConfigError(format!(
                "data.test_size must be in (0, 1), got {}",
                ts
            )));
        }

        let required = [
            ("data.raw_path", self.data.raw_path.as_os_str().is_empty()),
            ("artifacts.model_dir", self.artifacts.model_dir.as_os_str().is_empty()),
            ("mlflow.tracking_uri", self.mlflow.tracking_uri.trim().is_empty()),
            ("mlflow.experiment_name", self.mlflow.experiment_name.trim().is_empty()),
            ("mlflow.model_name", self.mlflow.model_name.trim().is_empty()),
        ];
        for (key, empty) in required {
            if empty {
                return Err(PipelineError::ConfigError(format!("{} must not be empty", key)));
            }
        }

        if self.training.cv_folds < 2 {
            return Err(PipelineError::ConfigError(format!(
                "training.cv_folds must be at least 2, got {}",
                self.training.cv_folds
            )));
        }
        if self.training.models.is_empty() {
            return Err(PipelineError::ConfigError(
                "training.models must list at least one model family".to_string(),
            ));
        }
        self.mlflow
            .stage
            .parse::<Stage>()
            .map_err(|e| PipelineError::ConfigError(format!("mlflow.stage: {}", e)))?;

        let mut seen = HashSet::new();
        for spec in &self.training.models {
            if !seen.insert(spec.family) {
                return Err(PipelineError::ConfigError(format!(
                    "model family '{}' listed more than once",
                    spec.family
                )));
            }
        }

        Ok(())
    }
}
