//! HTTP tests for the prediction service

mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use diabetes_mlops::config::PipelineConfig;
use diabetes_mlops::pipeline::Pipeline;
use diabetes_mlops::serving::{create_router, ArtifactResolver, DiabetesInput, ServingContext};
use serde_json::{json, Value};
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;

fn app(config: &PipelineConfig) -> Router {
    let ctx = Arc::new(ServingContext::new(ArtifactResolver::from_config(config)));
    create_router(ctx)
}

fn train(root: &Path) -> PipelineConfig {
    let config = common::config(root);
    Pipeline::new(config.clone(), common::schema()).run().unwrap();
    config
}

fn predict_request(body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/predict")
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn example_body() -> String {
    serde_json::to_string(&DiabetesInput::default()).unwrap()
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), 1024 * 64).await.unwrap();
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, json)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

// ============================================================================
// Liveness
// ============================================================================

#[tokio::test]
async fn test_root_reports_running() {
    let dir = TempDir::new().unwrap();
    let app = app(&common::config(dir.path()));
    let (status, json) = send(&app, get("/")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["message"], "Diabetes progression prediction API is running");
}

#[tokio::test]
async fn test_health_is_healthy_without_artifacts() {
    let dir = TempDir::new().unwrap();
    let app = app(&common::config(dir.path()));
    let (status, json) = send(&app, get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["artifacts"], "unloaded");
    assert!(json["model_source"].is_null());
}

#[tokio::test]
async fn test_unknown_route_is_404() {
    let dir = TempDir::new().unwrap();
    let app = app(&common::config(dir.path()));
    let (status, json) = send(&app, get("/metrics")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(json["detail"].is_string());
}

// ============================================================================
// Prediction
// ============================================================================

#[tokio::test]
async fn test_predict_without_artifacts_is_503() {
    let dir = TempDir::new().unwrap();
    let app = app(&common::config(dir.path()));
    let (status, json) = send(&app, predict_request(&example_body())).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert!(json["detail"].as_str().unwrap().starts_with("Model not available"));

    let (_, health) = send(&app, get("/health")).await;
    assert_eq!(health["artifacts"], "degraded");
    assert!(health["last_error"].is_string());
}

#[tokio::test]
async fn test_predict_after_training_is_finite_and_repeatable() {
    let dir = TempDir::new().unwrap();
    let config = train(dir.path());
    let app = app(&config);

    let (status, first) = send(&app, predict_request(&example_body())).await;
    assert_eq!(status, StatusCode::OK);
    let prediction = first["prediction"].as_f64().unwrap();
    assert!(prediction.is_finite());

    let (_, second) = send(&app, predict_request(&example_body())).await;
    assert_eq!(second["prediction"].as_f64().unwrap(), prediction);

    let (_, health) = send(&app, get("/health")).await;
    assert_eq!(health["artifacts"], "loaded");
    assert_eq!(health["model_source"], "registry:v1");
    assert!(health["model_family"].is_string());
}

#[tokio::test]
async fn test_request_repairs_a_degraded_service() {
    let dir = TempDir::new().unwrap();
    let config = common::config(dir.path());
    let app = app(&config);

    let (status, _) = send(&app, predict_request(&example_body())).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

    Pipeline::new(config, common::schema()).run().unwrap();
    let (status, json) = send(&app, predict_request(&example_body())).await;
    assert_eq!(status, StatusCode::OK);
    assert!(json["prediction"].as_f64().unwrap().is_finite());
}

#[tokio::test]
async fn test_local_file_used_when_registry_is_empty() {
    let dir = TempDir::new().unwrap();
    let config = train(dir.path());
    let (_, from_registry) = send(&app(&config), predict_request(&example_body())).await;

    std::fs::remove_dir_all(dir.path().join("mlruns")).unwrap();
    let app = app(&config);
    let (status, from_local) = send(&app, predict_request(&example_body())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(from_local["prediction"], from_registry["prediction"]);

    let (_, health) = send(&app, get("/health")).await;
    let source = health["model_source"].as_str().unwrap();
    assert!(source.starts_with("local:"), "{}", source);
}

#[tokio::test]
async fn test_missing_scaler_is_503_even_with_a_model() {
    let dir = TempDir::new().unwrap();
    let config = train(dir.path());
    std::fs::remove_file(config.artifacts.scaler_path()).unwrap();

    let app = app(&config);
    let (status, json) = send(&app, predict_request(&example_body())).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert!(json["detail"].as_str().unwrap().contains("scaler"));
}

// ============================================================================
// Request validation
// ============================================================================

#[tokio::test]
async fn test_missing_field_is_422() {
    let dir = TempDir::new().unwrap();
    let app = app(&common::config(dir.path()));
    let body = json!({
        "age": 59.0, "sex": 2.0, "bmi": 32.1, "bp": 101.0, "s1": 157.0,
        "s2": 93.2, "s3": 38.0, "s4": 4.0, "s5": 4.85
    });
    let (status, json) = send(&app, predict_request(&body.to_string())).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(json["detail"].as_str().unwrap().contains("s6"));
}

#[tokio::test]
async fn test_non_numeric_field_is_422() {
    let dir = TempDir::new().unwrap();
    let app = app(&common::config(dir.path()));
    let body = example_body().replace("\"bmi\":32.1", "\"bmi\":\"heavy\"");
    assert!(body.contains("heavy"));
    let (status, _) = send(&app, predict_request(&body)).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_malformed_json_is_422() {
    let dir = TempDir::new().unwrap();
    let app = app(&common::config(dir.path()));
    let (status, json) = send(&app, predict_request("{\"age\": 59.0,")).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(json["detail"].is_string());
}

#[tokio::test]
async fn test_missing_content_type_is_422() {
    let dir = TempDir::new().unwrap();
    let app = app(&common::config(dir.path()));
    let request = Request::builder()
        .method("POST")
        .uri("/predict")
        .body(Body::from(example_body()))
        .unwrap();
    let (status, _) = send(&app, request).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}
