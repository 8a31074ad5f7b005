//! CSV loading and saving

use crate::error::{PipelineError, Result};
use polars::prelude::*;
use std::fs::File;
use std::path::Path;
use tracing::debug;

/// Reads tabular files into polars frames
#[derive(Debug, Clone)]
pub struct DataLoader {
    infer_schema_length: Option<usize>,
}

impl Default for DataLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl DataLoader {
    pub fn new() -> Self {
        Self {
            infer_schema_length: Some(10_000),
        }
    }

    /// Rows scanned for dtype inference. `None` scans the whole file.
    pub fn with_infer_schema_length(mut self, rows: Option<usize>) -> Self {
        self.infer_schema_length = rows;
        self
    }

    /// Load a CSV file with a header row
    pub fn load_csv(&self, path: impl AsRef<Path>) -> Result<DataFrame> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| {
            PipelineError::DataError(format!("cannot open {}: {}", path.display(), e))
        })?;

        let df = CsvReadOptions::default()
            .with_has_header(true)
            .with_infer_schema_length(self.infer_schema_length)
            .into_reader_with_file_handle(file)
            .finish()
            .map_err(|e| PipelineError::DataError(format!("{}: {}", path.display(), e)))?;

        debug!(path = %path.display(), rows = df.height(), columns = df.width(), "Loaded CSV");
        Ok(df)
    }
}

/// Writes polars frames to disk
pub struct DataSaver;

impl DataSaver {
    /// Write `df` as CSV with a header, creating parent directories.
    pub fn save_csv(df: &mut DataFrame, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let mut file = File::create(path)?;
        CsvWriter::new(&mut file)
            .include_header(true)
            .finish(df)
            .map_err(|e| PipelineError::DataError(format!("{}: {}", path.display(), e)))?;
        debug!(path = %path.display(), rows = df.height(), "Saved CSV");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_csv_roundtrip_creates_parents() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested/deeper/frame.csv");
        let mut df = df!(
            "age" => &[59.0, 48.0],
            "target" => &[151.0, 75.0]
        )
        .unwrap();

        DataSaver::save_csv(&mut df, &path).unwrap();
        let loaded = DataLoader::new().load_csv(&path).unwrap();
        assert_eq!(loaded.shape(), (2, 2));
        assert_eq!(loaded.column("age").unwrap().dtype(), &DataType::Float64);
    }

    #[test]
    fn test_missing_file_is_data_error() {
        let err = DataLoader::new().load_csv("/definitely/not/here.csv").unwrap_err();
        assert!(matches!(err, PipelineError::DataError(_)));
    }
}
