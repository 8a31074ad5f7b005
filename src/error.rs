//! Error types for the diabetes MLOps pipeline

use thiserror::Error;

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Main error type for every pipeline stage and the serving layer
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Malformed or missing configuration/schema. Fatal at startup.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Dataset does not match the declared schema. Halts the pipeline before transformation.
    #[error("Validation failure: {0}")]
    ValidationFailure(String),

    #[error("Transformation error: {0}")]
    TransformError(String),

    #[error("Training error: {0}")]
    TrainingError(String),

    /// Neither the registry nor the local copy could be loaded at serving time.
    #[error("Artifacts unavailable: {0}")]
    ArtifactUnavailable(String),

    #[error("Inference error: {0}")]
    InferenceError(String),

    #[error("Data error: {0}")]
    DataError(String),

    #[error("Tracking error: {0}")]
    TrackingError(String),

    #[error("Registry error: {0}")]
    RegistryError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Invalid shape: expected {expected}, got {actual}")]
    ShapeError { expected: String, actual: String },

    #[error("Model not fitted")]
    ModelNotFitted,

    #[error("Invalid parameter: {name} = {value}, {reason}")]
    InvalidParameter {
        name: String,
        value: String,
        reason: String,
    },

    #[error("Computation error: {0}")]
    ComputationError(String),
}

impl PipelineError {
    /// Re-tag any error raised inside the transformation stage.
    pub fn into_transform(self) -> Self {
        match self {
            e @ PipelineError::TransformError(_) => e,
            other => PipelineError::TransformError(other.to_string()),
        }
    }

    /// Re-tag any error raised inside the training stage.
    pub fn into_training(self) -> Self {
        match self {
            e @ PipelineError::TrainingError(_) => e,
            other => PipelineError::TrainingError(other.to_string()),
        }
    }

    /// Re-tag a failure on the prediction path. Unavailability keeps its own kind.
    pub fn into_inference(self) -> Self {
        match self {
            e @ (PipelineError::InferenceError(_) | PipelineError::ArtifactUnavailable(_)) => e,
            other => PipelineError::InferenceError(other.to_string()),
        }
    }
}

impl From<polars::error::PolarsError> for PipelineError {
    fn from(err: polars::error::PolarsError) -> Self {
        PipelineError::DataError(err.to_string())
    }
}

impl From<serde_json::Error> for PipelineError {
    fn from(err: serde_json::Error) -> Self {
        PipelineError::SerializationError(err.to_string())
    }
}

impl From<serde_yaml::Error> for PipelineError {
    fn from(err: serde_yaml::Error) -> Self {
        PipelineError::ConfigError(err.to_string())
    }
}

impl From<bincode::Error> for PipelineError {
    fn from(err: bincode::Error) -> Self {
        PipelineError::SerializationError(err.to_string())
    }
}

impl From<ndarray::ShapeError> for PipelineError {
    fn from(err: ndarray::ShapeError) -> Self {
        PipelineError::ShapeError {
            expected: "valid shape".to_string(),
            actual: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_retagging_keeps_message() {
        let err = PipelineError::DataError("column s1 missing".to_string()).into_transform();
        assert!(matches!(err, PipelineError::TransformError(ref m) if m.contains("column s1 missing")));

        let err = PipelineError::TrainingError("boom".to_string()).into_training();
        assert_eq!(err.to_string(), "Training error: boom");
    }

    #[test]
    fn test_io_error_converts() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: PipelineError = io.into();
        assert!(matches!(err, PipelineError::IoError(_)));
    }
}
