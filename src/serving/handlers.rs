//! Request handlers

use super::error::{Result, ServerError};
use super::schema::{DiabetesInput, PredictionResponse};
use super::state::ServingContext;
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::debug;

pub async fn root() -> Json<Value> {
    Json(json!({ "message": "Diabetes progression prediction API is running" }))
}

pub async fn health(State(ctx): State<Arc<ServingContext>>) -> Json<Value> {
    let status = ctx.status().await;
    Json(json!({
        "status": "healthy",
        "artifacts": status.state,
        "model_source": status.model_source,
        "model_family": status.model_family,
        "last_error": status.last_error,
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

pub async fn predict(
    State(ctx): State<Arc<ServingContext>>,
    payload: std::result::Result<Json<DiabetesInput>, JsonRejection>,
) -> Result<Json<PredictionResponse>> {
    let Json(input) = payload.map_err(|rejection| ServerError::UnprocessableEntity(rejection.body_text()))?;
    let prediction = ctx.predict(&input).await?;
    debug!(prediction, "Prediction served");
    Ok(Json(PredictionResponse { prediction }))
}
