//! Column schema (`configs/schema.yaml`)

use crate::error::{PipelineError, Result};
use serde_yaml::Value;
use std::path::Path;

/// Expected column name → dtype name, in declaration order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    columns: Vec<(String, String)>,
}

impl Schema {
    pub fn new(columns: Vec<(String, String)>) -> Self {
        Self { columns }
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            PipelineError::ConfigError(format!("cannot read schema {}: {}", path.display(), e))
        })?;
        Self::from_yaml_str(&contents)
    }

    /// Parse a document whose top-level `COLUMNS` key maps names to dtype strings.
    pub fn from_yaml_str(contents: &str) -> Result<Self> {
        let doc: Value = serde_yaml::from_str(contents)?;
        let mapping = doc
            .get("COLUMNS")
            .and_then(Value::as_mapping)
            .ok_or_else(|| {
                PipelineError::ConfigError("schema has no COLUMNS mapping".to_string())
            })?;

        let mut columns = Vec::with_capacity(mapping.len());
        for (name, dtype) in mapping {
            let name = name.as_str().ok_or_else(|| {
                PipelineError::ConfigError(format!("schema column name {:?} is not a string", name))
            })?;
            let dtype = dtype.as_str().ok_or_else(|| {
                PipelineError::ConfigError(format!("dtype for column '{}' is not a string", name))
            })?;
            columns.push((name.to_string(), dtype.trim().to_lowercase()));
        }

        if columns.is_empty() {
            return Err(PipelineError::ConfigError("schema COLUMNS is empty".to_string()));
        }
        Ok(Self { columns })
    }

    /// Declared dtype for `column`, if the schema knows it
    pub fn dtype_of(&self, column: &str) -> Option<&str> {
        self.columns
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, dtype)| dtype.as_str())
    }

    pub fn columns(&self) -> impl Iterator<Item = (&str, &str)> {
        self.columns.iter().map(|(n, d)| (n.as_str(), d.as_str()))
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}
