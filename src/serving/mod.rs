//! Prediction service
//!
//! Serves the published champion over HTTP. Artifacts are resolved through
//! [`ArtifactResolver`] (registry, then local file) and held by a
//! [`ServingContext`], which reloads on demand when a request finds them
//! missing.

mod api;
mod artifacts;
mod error;
mod handlers;
mod schema;
mod state;

pub use api::create_router;
pub use artifacts::{ArtifactResolver, ModelResolution, ModelSource, RegistrySource, UnreachableRegistry};
pub use error::ServerError;
pub use schema::{DiabetesInput, PredictionResponse};
pub use state::{ArtifactState, ArtifactStatus, LoadedArtifacts, ServingContext};

use crate::config::PipelineConfig;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn from_pipeline(config: &PipelineConfig) -> Self {
        Self {
            host: config.serving.host.clone(),
            port: config.serving.port,
        }
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }
}

/// Load artifacts, bind and serve until ctrl-c.
pub async fn run_server(pipeline: &PipelineConfig, config: ServerConfig) -> anyhow::Result<()> {
    let start_time = chrono::Utc::now();
    let ctx = Arc::new(ServingContext::new(ArtifactResolver::from_config(pipeline)));

    match ctx.load().await {
        ArtifactState::Loaded => info!("Artifacts loaded at startup"),
        state => warn!(?state, "Starting without artifacts, requests will trigger a reload"),
    }

    let app = create_router(ctx);
    let listener = tokio::net::TcpListener::bind((config.host.as_str(), config.port)).await?;
    let addr: SocketAddr = listener.local_addr()?;
    info!(
        address = %addr,
        pid = std::process::id(),
        started_at = %start_time.to_rfc3339(),
        "Prediction server listening"
    );

    let shutdown_signal = async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Could not install ctrl-c handler");
            std::future::pending::<()>().await;
        }
        let uptime = chrono::Utc::now().signed_duration_since(start_time);
        info!(uptime_secs = uptime.num_seconds(), "Shutdown signal received, stopping server gracefully");
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal)
        .await?;

    info!("Server shut down cleanly");
    Ok(())
}
