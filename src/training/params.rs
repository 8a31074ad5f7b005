//! Hyperparameter values and search grids

use crate::error::{PipelineError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// One hyperparameter value as written in YAML (`null`, `true`, `5`, `0.1`, `"distance"`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Null => write!(f, "None"),
            ParamValue::Bool(b) => write!(f, "{}", b),
            ParamValue::Int(i) => write!(f, "{}", i),
            ParamValue::Float(x) => write!(f, "{}", x),
            ParamValue::Str(s) => write!(f, "{}", s),
        }
    }
}

/// A concrete hyperparameter assignment for one candidate
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Hyperparameters(BTreeMap<String, ParamValue>);

impl Hyperparameters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: &str, value: ParamValue) -> Self {
        self.0.insert(name.to_string(), value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.0.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Parameters rendered as strings, the form experiment tracking stores
    pub fn to_string_map(&self) -> BTreeMap<String, String> {
        self.0.iter().map(|(k, v)| (k.clone(), v.to_string())).collect()
    }

    pub fn f64_or(&self, name: &str, default: f64) -> Result<f64> {
        match self.get(name) {
            None => Ok(default),
            Some(ParamValue::Float(x)) => Ok(*x),
            Some(ParamValue::Int(i)) => Ok(*i as f64),
            Some(other) => Err(invalid(name, other, "expected a number")),
        }
    }

    pub fn usize_or(&self, name: &str, default: usize) -> Result<usize> {
        match self.get(name) {
            None => Ok(default),
            Some(ParamValue::Int(i)) if *i >= 0 => Ok(*i as usize),
            Some(other) => Err(invalid(name, other, "expected a non-negative integer")),
        }
    }

    /// `null` or absent means "no limit"
    pub fn opt_usize(&self, name: &str) -> Result<Option<usize>> {
        match self.get(name) {
            None | Some(ParamValue::Null) => Ok(None),
            Some(ParamValue::Int(i)) if *i > 0 => Ok(Some(*i as usize)),
            Some(other) => Err(invalid(name, other, "expected null or a positive integer")),
        }
    }

    pub fn str_or<'a>(&'a self, name: &str, default: &'a str) -> Result<&'a str> {
        match self.get(name) {
            None => Ok(default),
            Some(ParamValue::Str(s)) => Ok(s.as_str()),
            Some(other) => Err(invalid(name, other, "expected a string")),
        }
    }

    /// Reject names a family does not understand.
    pub fn ensure_known(&self, known: &[&str]) -> Result<()> {
        for (name, value) in &self.0 {
            if !known.contains(&name.as_str()) {
                return Err(invalid(
                    name,
                    value,
                    &format!("unknown parameter, expected one of {:?}", known),
                ));
            }
        }
        Ok(())
    }
}

impl fmt::Display for Hyperparameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, (k, v)) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}={}", k, v)?;
        }
        write!(f, "}}")
    }
}

fn invalid(name: &str, value: &ParamValue, reason: &str) -> PipelineError {
    PipelineError::InvalidParameter {
        name: name.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

/// Candidate values per hyperparameter
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParamGrid(BTreeMap<String, Vec<ParamValue>>);

impl ParamGrid {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(mut self, name: &str, values: Vec<ParamValue>) -> Self {
        self.0.insert(name.to_string(), values);
        self
    }

    /// Cartesian product in deterministic order: parameter names sorted,
    /// the last name varying fastest, values in declaration order.
    /// An empty grid yields a single empty assignment.
    pub fn combinations(&self) -> Result<Vec<Hyperparameters>> {
        let mut combos = vec![Hyperparameters::new()];
        for (name, values) in &self.0 {
            if values.is_empty() {
                return Err(PipelineError::InvalidParameter {
                    name: name.clone(),
                    value: "[]".to_string(),
                    reason: "grid entry has no candidate values".to_string(),
                });
            }
            combos = combos
                .into_iter()
                .flat_map(|base| {
                    values
                        .iter()
                        .map(move |v| base.clone().with(name, v.clone()))
                })
                .collect();
        }
        Ok(combos)
    }

    pub fn len(&self) -> usize {
        self.0.values().map(Vec::len).product()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
