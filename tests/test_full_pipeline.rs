//! Integration test: end-to-end pipeline
//! Tests: config files → ingest → validate → transform → train → serve → client

mod common;

use diabetes_mlops::client::{ClientError, PredictionClient};
use diabetes_mlops::config::{PipelineConfig, Schema};
use diabetes_mlops::pipeline::Pipeline;
use diabetes_mlops::serving::{create_router, ArtifactResolver, DiabetesInput, ServingContext};
use diabetes_mlops::tracking::{ModelRegistry, Stage};
use std::sync::Arc;
use tempfile::TempDir;

fn load(dir: &TempDir) -> (PipelineConfig, Schema) {
    let (config_path, schema_path) = common::write_config_files(dir.path());
    (
        PipelineConfig::from_yaml_file(config_path).unwrap(),
        Schema::from_yaml_file(schema_path).unwrap(),
    )
}

/// Serve `config`'s artifacts on an ephemeral port and return the base URL.
async fn spawn_server(config: &PipelineConfig) -> String {
    let ctx = Arc::new(ServingContext::new(ArtifactResolver::from_config(config)));
    ctx.load().await;
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, create_router(ctx)).await.unwrap();
    });
    format!("http://{}", addr)
}

#[test]
fn test_pipeline_from_config_files() {
    let dir = TempDir::new().unwrap();
    let (config, schema) = load(&dir);
    let summary = Pipeline::new(config.clone(), schema).run().unwrap();

    assert!(summary.raw_path.is_file());
    assert!(summary.validation.status);
    assert_eq!(summary.n_train, 160);
    assert_eq!(summary.n_test, 40);
    assert_eq!(summary.training.registry_version, 1);
    assert_eq!(summary.training.candidates.len(), 4);

    assert!(config.artifacts.model_path().is_file());
    assert!(config.artifacts.scaler_path().is_file());
    assert!(config.data.processed_dir.join("train.csv").is_file());
    assert!(config.data.processed_dir.join("test.csv").is_file());
}

#[test]
fn test_rerun_promotes_a_new_version() {
    let dir = TempDir::new().unwrap();
    let (config, schema) = load(&dir);
    let pipeline = Pipeline::new(config.clone(), schema);
    pipeline.run().unwrap();
    let second = pipeline.run().unwrap();
    assert_eq!(second.training.registry_version, 2);

    let registry = ModelRegistry::open(dir.path().join("mlruns")).unwrap();
    let model = registry.get_registered_model(&config.mlflow.model_name).unwrap();
    let stages: Vec<(u32, Stage)> = model.versions.iter().map(|v| (v.version, v.stage)).collect();
    assert_eq!(stages, vec![(1, Stage::Archived), (2, Stage::Production)]);

    let (_, bytes) = registry
        .load_model_bytes(&config.mlflow.model_name, Stage::Production)
        .unwrap();
    assert_eq!(bytes, std::fs::read(config.artifacts.model_path()).unwrap());
}

#[tokio::test]
async fn test_client_round_trip_against_live_server() {
    let dir = TempDir::new().unwrap();
    let (config, schema) = load(&dir);
    let pipeline_config = config.clone();
    tokio::task::spawn_blocking(move || Pipeline::new(pipeline_config, schema).run().unwrap())
        .await
        .unwrap();

    let url = spawn_server(&config).await;
    let client = PredictionClient::new(&url).unwrap();
    let prediction = client.predict(&DiabetesInput::default()).await.unwrap();
    assert!(prediction.is_finite());
    let again = client.predict(&DiabetesInput::default()).await.unwrap();
    assert_eq!(prediction, again);
}

#[tokio::test]
async fn test_client_surfaces_unavailable_model() {
    let dir = TempDir::new().unwrap();
    let (config, _) = load(&dir);
    let url = spawn_server(&config).await;

    let client = PredictionClient::new(&url).unwrap();
    let err = client.predict(&DiabetesInput::default()).await.unwrap_err();
    match err {
        ClientError::Api { status, message } => {
            assert_eq!(status, 503);
            assert!(message.starts_with("Model not available"), "{}", message);
        }
        other => panic!("expected API error, got {:?}", other),
    }
}
