//! Serving context: the loaded model/scaler pair and its state machine

use super::artifacts::{ArtifactResolver, ModelResolution, ModelSource};
use super::schema::DiabetesInput;
use crate::error::{PipelineError, Result};
use crate::preprocessing::StandardScaler;
use crate::training::PublishedModel;
use ndarray::Array1;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactState {
    /// Nothing attempted yet
    Unloaded,
    /// Model and scaler both in memory
    Loaded,
    /// A load was attempted and at least one artifact is missing
    Degraded,
}

#[derive(Debug)]
pub struct LoadedArtifacts {
    pub state: ArtifactState,
    pub model: Option<Arc<PublishedModel>>,
    pub scaler: Option<Arc<StandardScaler>>,
    pub model_source: Option<ModelSource>,
    pub last_error: Option<String>,
}

impl Default for LoadedArtifacts {
    fn default() -> Self {
        Self {
            state: ArtifactState::Unloaded,
            model: None,
            scaler: None,
            model_source: None,
            last_error: None,
        }
    }
}

/// Point-in-time view for the health endpoint
#[derive(Debug, Clone, Serialize)]
pub struct ArtifactStatus {
    pub state: ArtifactState,
    pub model_source: Option<String>,
    pub model_family: Option<String>,
    pub last_error: Option<String>,
}

pub struct ServingContext {
    resolver: ArtifactResolver,
    artifacts: RwLock<LoadedArtifacts>,
}

impl ServingContext {
    pub fn new(resolver: ArtifactResolver) -> Self {
        Self {
            resolver,
            artifacts: RwLock::new(LoadedArtifacts::default()),
        }
    }

    pub async fn state(&self) -> ArtifactState {
        self.artifacts.read().await.state
    }

    pub async fn status(&self) -> ArtifactStatus {
        let guard = self.artifacts.read().await;
        ArtifactStatus {
            state: guard.state,
            model_source: guard.model_source.as_ref().map(ToString::to_string),
            model_family: guard.model.as_ref().map(|m| m.family.to_string()),
            last_error: guard.last_error.clone(),
        }
    }

    /// Load whichever artifacts are missing. Ends `Loaded` only if both are present.
    pub async fn load(&self) -> ArtifactState {
        let mut guard = self.artifacts.write().await;
        let mut errors = Vec::new();

        if guard.model.is_none() {
            match self.resolver.resolve_model() {
                ModelResolution::Loaded { model, source } => {
                    guard.model = Some(Arc::new(model));
                    guard.model_source = Some(source);
                }
                ModelResolution::Failed { reason } => errors.push(format!("model: {}", reason)),
            }
        }
        if guard.scaler.is_none() {
            match self.resolver.load_scaler() {
                Ok(scaler) => guard.scaler = Some(Arc::new(scaler)),
                Err(e) => errors.push(e.to_string()),
            }
        }

        if guard.model.is_some() && guard.scaler.is_some() {
            guard.state = ArtifactState::Loaded;
            guard.last_error = None;
            info!(source = ?guard.model_source, "Model and scaler loaded");
        } else {
            guard.state = ArtifactState::Degraded;
            let reason = errors.join("; ");
            warn!(error = %reason, "Artifact load incomplete");
            guard.last_error = Some(reason);
        }
        guard.state
    }

    /// Predict one record. A context that is not `Loaded` gets exactly one
    /// reload attempt first.
    pub async fn predict(&self, input: &DiabetesInput) -> Result<f64> {
        if self.state().await != ArtifactState::Loaded {
            self.load().await;
        }

        let (model, scaler) = {
            let guard = self.artifacts.read().await;
            match (guard.state, &guard.model, &guard.scaler) {
                (ArtifactState::Loaded, Some(model), Some(scaler)) => (Arc::clone(model), Arc::clone(scaler)),
                _ => {
                    return Err(PipelineError::ArtifactUnavailable(
                        guard
                            .last_error
                            .clone()
                            .unwrap_or_else(|| "model or scaler not loaded".to_string()),
                    ))
                }
            }
        };

        infer(&model, &scaler, input).map_err(PipelineError::into_inference)
    }
}

fn infer(model: &PublishedModel, scaler: &StandardScaler, input: &DiabetesInput) -> Result<f64> {
    if model.feature_names != scaler.feature_names() {
        return Err(PipelineError::InferenceError(format!(
            "model expects {:?} but scaler provides {:?}",
            model.feature_names,
            scaler.feature_names()
        )));
    }
    let row = scaler
        .feature_names()
        .iter()
        .map(|name| {
            input
                .feature_value(name)
                .ok_or_else(|| PipelineError::InferenceError(format!("no input field for feature '{}'", name)))
        })
        .collect::<Result<Array1<f64>>>()?;

    let scaled = scaler.transform_row(row.view())?;
    let prediction = model.predict_row(scaled.view())?;
    if !prediction.is_finite() {
        return Err(PipelineError::InferenceError(format!(
            "model produced a non-finite prediction ({})",
            prediction
        )));
    }
    Ok(prediction)
}
