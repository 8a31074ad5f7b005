//! Ingestion stage: materialize the raw dataset at `data.raw_path`

use super::{DataLoader, DataSaver, DiabetesCohort};
use crate::config::DataConfig;
use crate::error::Result;
use std::path::PathBuf;
use tracing::info;

/// Where raw records come from
#[derive(Debug, Clone)]
pub enum IngestionSource {
    /// Built-in seeded cohort
    Cohort { n_samples: usize, seed: u64 },
    /// Existing CSV, re-emitted as-is
    Csv(PathBuf),
}

pub struct DataIngestion {
    source: IngestionSource,
    raw_path: PathBuf,
    target_column: String,
}

impl DataIngestion {
    pub fn new(config: &DataConfig) -> Self {
        let source = match &config.source {
            Some(path) => IngestionSource::Csv(path.clone()),
            None => IngestionSource::Cohort {
                n_samples: config.n_samples,
                seed: config.random_state,
            },
        };
        Self {
            source,
            raw_path: config.raw_path.clone(),
            target_column: config.target_column.clone(),
        }
    }

    pub fn with_source(mut self, source: IngestionSource) -> Self {
        self.source = source;
        self
    }

    /// Write the raw CSV and return its path.
    pub fn initiate(&self) -> Result<PathBuf> {
        let mut df = match &self.source {
            IngestionSource::Cohort { n_samples, seed } => {
                info!(n_samples, seed, "Generating diabetes cohort");
                DiabetesCohort::new(*n_samples, *seed)
                    .generate()?
                    .to_frame(&self.target_column)?
            }
            IngestionSource::Csv(path) => {
                info!(source = %path.display(), "Ingesting CSV source");
                DataLoader::new().load_csv(path)?
            }
        };

        DataSaver::save_csv(&mut df, &self.raw_path)?;
        info!(
            path = %self.raw_path.display(),
            rows = df.height(),
            columns = df.width(),
            "Raw dataset ingested"
        );
        Ok(self.raw_path.clone())
    }
}
