//! File-backed experiment tracking and model registry
//!
//! Layout under the tracking root:
//!
//! ```text
//! experiments.json
//! <experiment_id>/<run_id>/run.json
//! <experiment_id>/<run_id>/artifacts/...
//! models/<model_name>/registered_model.json
//! models/<model_name>/v<N>/model.bin
//! ```

mod registry;
mod tracker;

pub use registry::{ModelRegistry, ModelVersion, RegisteredModel, Stage};
pub use tracker::{ActiveRun, Experiment, ExperimentTracker, RunRecord, RunStatus};

use crate::error::{PipelineError, Result};
use std::path::PathBuf;

/// Resolve a tracking URI to a local directory.
///
/// Accepts `file:///abs/path`, `file:relative/path` and bare paths. Network
/// schemes are rejected.
pub fn parse_tracking_uri(uri: &str) -> Result<PathBuf> {
    let uri = uri.trim();
    if uri.is_empty() {
        return Err(PipelineError::TrackingError("tracking URI is empty".to_string()));
    }

    let path = if let Some(rest) = uri.strip_prefix("file://") {
        // file://localhost/abs is the same as file:///abs
        rest.strip_prefix("localhost").unwrap_or(rest)
    } else if let Some(rest) = uri.strip_prefix("file:") {
        rest
    } else if let Some((scheme, _)) = uri.split_once("://") {
        return Err(PipelineError::TrackingError(format!(
            "unsupported tracking scheme '{}' in '{}', only local stores are available",
            scheme, uri
        )));
    } else {
        uri
    };

    if path.is_empty() {
        return Err(PipelineError::TrackingError(format!("no path in tracking URI '{}'", uri)));
    }
    Ok(PathBuf::from(path))
}
