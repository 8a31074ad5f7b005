//! HTTP-facing error type

use crate::error::PipelineError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ServerError {
    /// Model or scaler could not be loaded, even after a reload
    #[error("Artifacts unavailable: {0}")]
    Unavailable(String),

    #[error("Inference failed: {0}")]
    Inference(String),

    /// Request body missing, not JSON, or not a valid record
    #[error("Unprocessable request: {0}")]
    UnprocessableEntity(String),
}

impl From<PipelineError> for ServerError {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::ArtifactUnavailable(msg) => ServerError::Unavailable(msg),
            PipelineError::InferenceError(msg) => ServerError::Inference(msg),
            other => ServerError::Inference(other.to_string()),
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            ServerError::Unavailable(msg) => {
                tracing::warn!(detail = %msg, "Prediction requested while artifacts are unavailable");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    json!({ "detail": format!("Model not available: {}", msg) }),
                )
            }
            ServerError::Inference(msg) => {
                tracing::error!(detail = %msg, "Inference error");
                (StatusCode::INTERNAL_SERVER_ERROR, json!({ "error": msg }))
            }
            ServerError::UnprocessableEntity(msg) => {
                (StatusCode::UNPROCESSABLE_ENTITY, json!({ "detail": msg }))
            }
        };
        (status, Json(body)).into_response()
    }
}

pub type Result<T> = std::result::Result<T, ServerError>;
