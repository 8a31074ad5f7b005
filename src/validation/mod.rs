//! Schema validation
//!
//! Every dataset column is checked against the schema and every failure is
//! reported. The overall status is the AND of all checks, and a frame with
//! no columns never passes. The decision is written to the status file so
//! later stages (and operators) can consult it.

use crate::config::{PipelineConfig, Schema};
use crate::data::DataLoader;
use crate::error::{PipelineError, Result};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

const STATUS_PREFIX: &str = "Validation status:";

/// Why a single column failed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FailureKind {
    /// Dataset column the schema does not declare
    NotInSchema { actual: String },
    /// Declared and present, but with a different dtype
    TypeMismatch { expected: String, actual: String },
    /// Declared by the schema but absent from the dataset
    MissingFromDataset { expected: String },
    /// Present with nulls
    MissingValues { count: usize },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnFailure {
    pub column: String,
    #[serde(flatten)]
    pub kind: FailureKind,
}

impl fmt::Display for ColumnFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            FailureKind::NotInSchema { actual } => write!(
                f,
                "column '{}' ({}) is not declared in the schema",
                self.column, actual
            ),
            FailureKind::TypeMismatch { expected, actual } => write!(
                f,
                "column '{}' expected {}, found {}",
                self.column, expected, actual
            ),
            FailureKind::MissingFromDataset { expected } => write!(
                f,
                "column '{}' ({}) is missing from the dataset",
                self.column, expected
            ),
            FailureKind::MissingValues { count } => {
                write!(f, "column '{}' has {} missing values", self.column, count)
            }
        }
    }
}

/// Outcome of validating one dataset
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub status: bool,
    pub checked_columns: usize,
    pub failures: Vec<ColumnFailure>,
}

impl ValidationReport {
    /// All failure messages joined, for error propagation
    pub fn summary(&self) -> String {
        if self.failures.is_empty() && self.checked_columns == 0 {
            return "dataset has no columns".to_string();
        }
        self.failures
            .iter()
            .map(|f| f.to_string())
            .collect::<Vec<_>>()
            .join("; ")
    }

    /// Turn a failing report into a `ValidationFailure` error
    pub fn into_result(self) -> Result<Self> {
        if self.status {
            Ok(self)
        } else {
            Err(PipelineError::ValidationFailure(self.summary()))
        }
    }
}

/// Schema-style dtype name for a polars dtype (`float64`, `int64`, `object`, ...)
pub fn dtype_name(dtype: &DataType) -> String {
    match dtype {
        DataType::Float64 => "float64".to_string(),
        DataType::Float32 => "float32".to_string(),
        DataType::Int64 => "int64".to_string(),
        DataType::Int32 => "int32".to_string(),
        DataType::Int16 => "int16".to_string(),
        DataType::Int8 => "int8".to_string(),
        DataType::UInt64 => "uint64".to_string(),
        DataType::UInt32 => "uint32".to_string(),
        DataType::UInt16 => "uint16".to_string(),
        DataType::UInt8 => "uint8".to_string(),
        DataType::Boolean => "bool".to_string(),
        DataType::String => "object".to_string(),
        DataType::Date | DataType::Datetime(_, _) => "datetime64".to_string(),
        other => other.to_string().to_lowercase(),
    }
}

/// Validate `df` against `schema` without side effects.
pub fn validate_frame(df: &DataFrame, schema: &Schema) -> ValidationReport {
    let mut failures = Vec::new();

    for column in df.get_columns() {
        let name = column.name().to_string();
        let actual = dtype_name(column.dtype());
        match schema.dtype_of(&name) {
            None => failures.push(ColumnFailure {
                column: name.clone(),
                kind: FailureKind::NotInSchema { actual },
            }),
            Some(expected) if expected != actual => failures.push(ColumnFailure {
                column: name.clone(),
                kind: FailureKind::TypeMismatch {
                    expected: expected.to_string(),
                    actual,
                },
            }),
            Some(_) => {}
        }
        let nulls = column.null_count();
        if nulls > 0 {
            failures.push(ColumnFailure {
                column: name,
                kind: FailureKind::MissingValues { count: nulls },
            });
        }
    }

    for (name, expected) in schema.columns() {
        if df.column(name).is_err() {
            failures.push(ColumnFailure {
                column: name.to_string(),
                kind: FailureKind::MissingFromDataset {
                    expected: expected.to_string(),
                },
            });
        }
    }

    let checked_columns = df.width();
    ValidationReport {
        status: checked_columns > 0 && failures.is_empty(),
        checked_columns,
        failures,
    }
}

/// Validation stage bound to a pipeline configuration
pub struct DataValidation {
    raw_path: PathBuf,
    status_file: PathBuf,
    schema: Schema,
}

impl DataValidation {
    pub fn new(config: &PipelineConfig, schema: Schema) -> Self {
        Self {
            raw_path: config.data.raw_path.clone(),
            status_file: config.artifacts.status_path(),
            schema,
        }
    }

    /// Load the raw dataset, validate every column, record the status.
    pub fn validate_all_columns(&self) -> Result<ValidationReport> {
        let df = DataLoader::new().load_csv(&self.raw_path)?;
        let report = validate_frame(&df, &self.schema);

        for failure in &report.failures {
            error!(column = %failure.column, reason = %failure, "Column failed validation");
        }
        if report.checked_columns == 0 {
            error!(path = %self.raw_path.display(), "Dataset has no columns");
        }

        write_status(&self.status_file, report.status)?;
        info!(
            status = report.status,
            columns = report.checked_columns,
            failures = report.failures.len(),
            status_file = %self.status_file.display(),
            "Validation finished"
        );
        Ok(report)
    }

    /// Previously recorded decision, if any
    pub fn read_status(&self) -> Result<Option<bool>> {
        read_status(&self.status_file)
    }
}

pub fn write_status(path: &Path, status: bool) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    std::fs::write(path, format!("{} {}", STATUS_PREFIX, status))?;
    Ok(())
}

pub fn read_status(path: &Path) -> Result<Option<bool>> {
    if !path.exists() {
        return Ok(None);
    }
    let contents = std::fs::read_to_string(path)?;
    let value = contents
        .trim()
        .strip_prefix(STATUS_PREFIX)
        .map(str::trim)
        .ok_or_else(|| {
            PipelineError::DataError(format!("unrecognised status file {}", path.display()))
        })?;
    match value {
        "true" | "True" => Ok(Some(true)),
        "false" | "False" => Ok(Some(false)),
        other => Err(PipelineError::DataError(format!(
            "unrecognised validation status '{}'",
            other
        ))),
    }
}

/// Gate for stages run on their own. A recorded failure stops them with
/// `ValidationFailure`; a missing status file only warns, since validation
/// may simply not have been run yet.
pub fn ensure_validated(path: &Path) -> Result<()> {
    match read_status(path)? {
        Some(true) => Ok(()),
        Some(false) => Err(PipelineError::ValidationFailure(format!(
            "recorded validation status in {} is false",
            path.display()
        ))),
        None => {
            warn!(path = %path.display(), "No validation status recorded, continuing without it");
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema(cols: &[(&str, &str)]) -> Schema {
        Schema::new(cols.iter().map(|(n, d)| (n.to_string(), d.to_string())).collect())
    }

    #[test]
    fn test_matching_frame_passes() {
        let df = df!("age" => &[59.0, 48.0], "target" => &[151.0, 75.0]).unwrap();
        let report = validate_frame(&df, &schema(&[("age", "float64"), ("target", "float64")]));
        assert!(report.status);
        assert_eq!(report.checked_columns, 2);
        assert!(report.failures.is_empty());
    }

    #[test]
    fn test_every_failure_reported() {
        let df = df!(
            "age" => &[59i64, 48],
            "extra" => &["a", "b"],
            "target" => &[151.0, 75.0]
        )
        .unwrap();
        let report = validate_frame(
            &df,
            &schema(&[("age", "float64"), ("bmi", "float64"), ("target", "float64")]),
        );
        assert!(!report.status);
        assert_eq!(report.failures.len(), 3);
        assert_eq!(
            report.failures[0],
            ColumnFailure {
                column: "age".to_string(),
                kind: FailureKind::TypeMismatch {
                    expected: "float64".to_string(),
                    actual: "int64".to_string()
                },
            }
        );
        assert!(matches!(report.failures[1].kind, FailureKind::NotInSchema { ref actual } if actual == "object"));
        assert!(matches!(report.failures[2].kind, FailureKind::MissingFromDataset { .. }));
    }

    #[test]
    fn test_failure_before_last_column_still_fails() {
        let df = df!("age" => &["x"], "target" => &[1.0]).unwrap();
        let report = validate_frame(&df, &schema(&[("age", "float64"), ("target", "float64")]));
        assert!(!report.status);
    }

    #[test]
    fn test_zero_columns_fails() {
        let df = DataFrame::empty();
        let report = validate_frame(&df, &schema(&[("age", "float64")]));
        assert!(!report.status);
        assert_eq!(report.checked_columns, 0);
    }

    #[test]
    fn test_nulls_fail() {
        let df = df!("age" => &[Some(1.0), None]).unwrap();
        let report = validate_frame(&df, &schema(&[("age", "float64")]));
        assert!(!report.status);
        assert!(matches!(report.failures[0].kind, FailureKind::MissingValues { count: 1 }));
    }

    #[test]
    fn test_status_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("artifacts/status.txt");
        assert_eq!(read_status(&path).unwrap(), None);
        write_status(&path, false).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "Validation status: false");
        assert_eq!(read_status(&path).unwrap(), Some(false));
        write_status(&path, true).unwrap();
        assert_eq!(read_status(&path).unwrap(), Some(true));
    }

    #[test]
    fn test_into_result() {
        let report = ValidationReport {
            status: false,
            checked_columns: 1,
            failures: vec![ColumnFailure {
                column: "bp".to_string(),
                kind: FailureKind::MissingValues { count: 2 },
            }],
        };
        let err = report.into_result().unwrap_err();
        assert!(matches!(err, PipelineError::ValidationFailure(ref m) if m.contains("bp")));
    }

    #[test]
    fn test_ensure_validated_follows_recorded_status() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("status.txt");
        assert!(ensure_validated(&path).is_ok());

        write_status(&path, true).unwrap();
        assert!(ensure_validated(&path).is_ok());

        write_status(&path, false).unwrap();
        let err = ensure_validated(&path).unwrap_err();
        assert!(matches!(err, PipelineError::ValidationFailure(_)));
    }
}
