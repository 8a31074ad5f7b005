//! Two-tier model resolution: registry first, local file second

use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result};
use crate::preprocessing::StandardScaler;
use crate::tracking::{parse_tracking_uri, ModelRegistry, Stage};
use crate::training::PublishedModel;
use crate::utils::load_object;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Anything that can hand out the bytes of a staged model version
pub trait RegistrySource: Send + Sync {
    /// Returns the version number and the serialized model.
    fn fetch(&self, name: &str, stage: Stage) -> Result<(u32, Vec<u8>)>;
}

impl RegistrySource for ModelRegistry {
    fn fetch(&self, name: &str, stage: Stage) -> Result<(u32, Vec<u8>)> {
        let (version, bytes) = self.load_model_bytes(name, stage)?;
        Ok((version.version, bytes))
    }
}

/// Stands in when the registry could not be opened. Every fetch fails.
#[derive(Debug, Clone)]
pub struct UnreachableRegistry {
    reason: String,
}

impl UnreachableRegistry {
    pub fn new(reason: impl Into<String>) -> Self {
        Self { reason: reason.into() }
    }
}

impl RegistrySource for UnreachableRegistry {
    fn fetch(&self, _name: &str, _stage: Stage) -> Result<(u32, Vec<u8>)> {
        Err(PipelineError::RegistryError(self.reason.clone()))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ModelSource {
    Registry { version: u32 },
    Local { path: PathBuf },
}

impl std::fmt::Display for ModelSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModelSource::Registry { version } => write!(f, "registry:v{}", version),
            ModelSource::Local { path } => write!(f, "local:{}", path.display()),
        }
    }
}

#[derive(Debug)]
pub enum ModelResolution {
    Loaded { model: PublishedModel, source: ModelSource },
    Failed { reason: String },
}

pub struct ArtifactResolver {
    registry: Box<dyn RegistrySource>,
    model_name: String,
    stage: Stage,
    model_path: PathBuf,
    scaler_path: PathBuf,
}

impl ArtifactResolver {
    pub fn new(
        registry: Box<dyn RegistrySource>,
        model_name: impl Into<String>,
        stage: Stage,
        model_path: impl Into<PathBuf>,
        scaler_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            registry,
            model_name: model_name.into(),
            stage,
            model_path: model_path.into(),
            scaler_path: scaler_path.into(),
        }
    }

    /// Open the configured registry. Failing to open it is not fatal: the
    /// resolver then relies on the local artifacts alone.
    pub fn from_config(config: &PipelineConfig) -> Self {
        let registry: Box<dyn RegistrySource> =
            match parse_tracking_uri(&config.mlflow.tracking_uri).and_then(ModelRegistry::open) {
                Ok(registry) => Box::new(registry),
                Err(e) => {
                    warn!(error = %e, "Model registry unavailable, serving from local artifacts only");
                    Box::new(UnreachableRegistry::new(e.to_string()))
                }
            };
        let stage = config.mlflow.stage.parse().unwrap_or(Stage::Production);
        Self::new(
            registry,
            config.mlflow.model_name.clone(),
            stage,
            config.artifacts.model_path(),
            config.artifacts.scaler_path(),
        )
    }

    pub fn model_path(&self) -> &Path {
        &self.model_path
    }

    pub fn scaler_path(&self) -> &Path {
        &self.scaler_path
    }

    pub fn from_registry(&self) -> Result<(PublishedModel, ModelSource)> {
        let (version, bytes) = self.registry.fetch(&self.model_name, self.stage)?;
        let model = PublishedModel::from_bytes(&bytes)?;
        Ok((model, ModelSource::Registry { version }))
    }

    pub fn from_local(&self) -> Result<(PublishedModel, ModelSource)> {
        let model: PublishedModel = load_object(&self.model_path)?;
        Ok((
            model,
            ModelSource::Local {
                path: self.model_path.clone(),
            },
        ))
    }

    /// Registry first; the local file is tried only if that fails.
    pub fn resolve_model(&self) -> ModelResolution {
        let registry_err = match self.from_registry() {
            Ok((model, source)) => {
                info!(model = %self.model_name, stage = %self.stage, source = %source, "Loaded model from registry");
                return ModelResolution::Loaded { model, source };
            }
            Err(e) => e,
        };
        warn!(
            model = %self.model_name,
            stage = %self.stage,
            error = %registry_err,
            "Registry load failed, falling back to local model file"
        );

        match self.from_local() {
            Ok((model, source)) => {
                info!(source = %source, "Loaded model from local file");
                ModelResolution::Loaded { model, source }
            }
            Err(local_err) => ModelResolution::Failed {
                reason: format!("registry: {}; local: {}", registry_err, local_err),
            },
        }
    }

    /// The scaler only ever comes from the local artifact.
    pub fn load_scaler(&self) -> Result<StandardScaler> {
        let scaler: StandardScaler = load_object(&self.scaler_path).map_err(|e| {
            PipelineError::ArtifactUnavailable(format!("scaler {}: {}", self.scaler_path.display(), e))
        })?;
        if !scaler.is_fitted() {
            return Err(PipelineError::ArtifactUnavailable(format!(
                "scaler {} is not fitted",
                self.scaler_path.display()
            )));
        }
        Ok(scaler)
    }
}
