//! End-to-end driver: ingest, validate, transform, train

use crate::config::{PipelineConfig, Schema};
use crate::data::DataIngestion;
use crate::error::Result;
use crate::preprocessing::DataTransformation;
use crate::training::{ModelTrainer, TrainingReport};
use crate::validation::{DataValidation, ValidationReport};
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::{error, info};

#[derive(Debug)]
pub struct PipelineSummary {
    pub raw_path: PathBuf,
    pub validation: ValidationReport,
    pub n_train: usize,
    pub n_test: usize,
    pub training: TrainingReport,
    pub elapsed: Duration,
}

pub struct Pipeline {
    config: PipelineConfig,
    schema: Schema,
}

impl Pipeline {
    pub fn new(config: PipelineConfig, schema: Schema) -> Self {
        Self { config, schema }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run every stage in order. The first failing stage stops the run.
    pub fn run(&self) -> Result<PipelineSummary> {
        let start = Instant::now();
        info!(experiment = %self.config.mlflow.experiment_name, "Pipeline started");

        let result = self.run_stages(start);
        match &result {
            Ok(summary) => info!(
                champion = %summary.training.champion.family,
                r2 = summary.training.champion.metrics.r2,
                version = summary.training.registry_version,
                elapsed_ms = summary.elapsed.as_millis() as u64,
                "Pipeline finished"
            ),
            Err(e) => error!(error = %e, "Pipeline halted"),
        }
        result
    }

    fn run_stages(&self, start: Instant) -> Result<PipelineSummary> {
        let raw_path = DataIngestion::new(&self.config.data).initiate()?;

        let validation = DataValidation::new(&self.config, self.schema.clone())
            .validate_all_columns()?
            .into_result()?;

        let data = DataTransformation::new(&self.config).initiate()?;
        let training = ModelTrainer::new(&self.config).initiate_model_trainer(&data)?;

        Ok(PipelineSummary {
            raw_path,
            validation,
            n_train: data.x_train.nrows(),
            n_test: data.x_test.nrows(),
            training,
            elapsed: start.elapsed(),
        })
    }
}
