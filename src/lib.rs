//! Diabetes MLOps - train, publish and serve a disease progression model
//!
//! The pipeline ingests the diabetes cohort, validates it against a column
//! schema, splits and scales it, grid-searches several regression families,
//! publishes the champion to a file-backed registry plus a local copy, and
//! serves predictions over HTTP.
//!
//! # Modules
//!
//! ## Pipeline stages
//! - [`data`] - Dataset type, CSV IO, ingestion
//! - [`validation`] - Schema validation and status recording
//! - [`preprocessing`] - Train/test split, standard scaling
//! - [`training`] - Regression families, cross-validation, grid search, trainer/selector
//! - [`pipeline`] - End-to-end driver
//!
//! ## Infrastructure
//! - [`config`] - Typed configuration and column schema
//! - [`tracking`] - Experiment runs and model registry
//! - [`utils`] - Artifact persistence
//!
//! ## Services
//! - [`serving`] - Artifact resolution and HTTP API
//! - [`client`] - Prediction client
//! - [`cli`] - Command-line interface

// Core error handling
pub mod error;

// Configuration
pub mod config;

// Pipeline stages
pub mod data;
pub mod validation;
pub mod preprocessing;
pub mod training;
pub mod pipeline;

// Infrastructure
pub mod tracking;
pub mod utils;

// Services
pub mod serving;
pub mod client;
pub mod cli;

pub use error::{PipelineError, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::{PipelineConfig, Schema};
    pub use crate::data::{DataIngestion, Dataset, FEATURE_COLUMNS, TARGET_COLUMN};
    pub use crate::error::{PipelineError, Result};
    pub use crate::pipeline::{Pipeline, PipelineSummary};
    pub use crate::preprocessing::{DataTransformation, StandardScaler, TransformedData};
    pub use crate::serving::{create_router, ArtifactResolver, DiabetesInput, ServingContext};
    pub use crate::tracking::{ExperimentTracker, ModelRegistry, Stage};
    pub use crate::training::{ModelFamily, ModelTrainer, PublishedModel, TrainingReport};
    pub use crate::validation::{DataValidation, ValidationReport};
}
