//! Experiments and runs persisted as pretty JSON

use crate::error::{PipelineError, Result};
use crate::utils::write_atomic;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const EXPERIMENTS_FILE: &str = "experiments.json";
const RUN_FILE: &str = "run.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Experiment {
    pub experiment_id: String,
    pub name: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RunStatus {
    Running,
    Finished,
    Failed,
}

/// Everything recorded for one run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub run_id: String,
    pub experiment_id: String,
    pub run_name: String,
    pub parent_run_id: Option<String>,
    pub status: RunStatus,
    pub params: BTreeMap<String, String>,
    pub metrics: BTreeMap<String, f64>,
    pub tags: BTreeMap<String, String>,
    /// Artifact paths relative to the run's `artifacts/` directory
    pub artifacts: Vec<String>,
    pub start_time: String,
    pub end_time: Option<String>,
}

/// Local experiment store rooted at a directory
#[derive(Debug, Clone)]
pub struct ExperimentTracker {
    root: PathBuf,
}

impl ExperimentTracker {
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|e| {
            PipelineError::TrackingError(format!("cannot create tracking root {}: {}", root.display(), e))
        })?;
        Ok(Self { root })
    }

    pub fn list_experiments(&self) -> Result<Vec<Experiment>> {
        let path = self.root.join(EXPERIMENTS_FILE);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let contents = fs::read_to_string(&path)?;
        serde_json::from_str(&contents)
            .map_err(|e| PipelineError::TrackingError(format!("corrupt {}: {}", path.display(), e)))
    }

    pub fn get_experiment_by_name(&self, name: &str) -> Result<Option<Experiment>> {
        Ok(self.list_experiments()?.into_iter().find(|e| e.name == name))
    }

    /// Return the experiment called `name`, creating it if needed.
    pub fn set_experiment(&self, name: &str) -> Result<Experiment> {
        if name.trim().is_empty() {
            return Err(PipelineError::TrackingError("experiment name is empty".to_string()));
        }
        let mut experiments = self.list_experiments()?;
        if let Some(existing) = experiments.iter().find(|e| e.name == name) {
            return Ok(existing.clone());
        }

        let next_id = experiments
            .iter()
            .filter_map(|e| e.experiment_id.parse::<u64>().ok())
            .max()
            .map_or(0, |id| id + 1);
        let experiment = Experiment {
            experiment_id: next_id.to_string(),
            name: name.to_string(),
            created_at: Utc::now().to_rfc3339(),
        };
        experiments.push(experiment.clone());
        write_atomic(
            &self.root.join(EXPERIMENTS_FILE),
            serde_json::to_string_pretty(&experiments)?.as_bytes(),
        )?;
        debug!(experiment = %name, id = %experiment.experiment_id, "created experiment");
        Ok(experiment)
    }

    /// Open a new run. Pass `parent_run_id` to nest it under another run.
    pub fn start_run(
        &self,
        experiment: &Experiment,
        run_name: &str,
        parent_run_id: Option<&str>,
    ) -> Result<ActiveRun> {
        let run_id = uuid::Uuid::new_v4().simple().to_string();
        let dir = self.root.join(&experiment.experiment_id).join(&run_id);
        let mut tags = BTreeMap::new();
        if let Some(parent) = parent_run_id {
            tags.insert("parent_run_id".to_string(), parent.to_string());
        }
        let run = ActiveRun {
            record: RunRecord {
                run_id,
                experiment_id: experiment.experiment_id.clone(),
                run_name: run_name.to_string(),
                parent_run_id: parent_run_id.map(str::to_string),
                status: RunStatus::Running,
                params: BTreeMap::new(),
                metrics: BTreeMap::new(),
                tags,
                artifacts: Vec::new(),
                start_time: Utc::now().to_rfc3339(),
                end_time: None,
            },
            dir,
        };
        run.persist()?;
        Ok(run)
    }

    pub fn get_run(&self, experiment_id: &str, run_id: &str) -> Result<RunRecord> {
        let path = self.root.join(experiment_id).join(run_id).join(RUN_FILE);
        let contents = fs::read_to_string(&path).map_err(|e| {
            PipelineError::TrackingError(format!("run {} not found: {}", run_id, e))
        })?;
        Ok(serde_json::from_str(&contents)?)
    }

    /// All runs of an experiment, oldest first.
    pub fn list_runs(&self, experiment_id: &str) -> Result<Vec<RunRecord>> {
        let dir = self.root.join(experiment_id);
        if !dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut runs = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let path = entry?.path().join(RUN_FILE);
            if path.is_file() {
                runs.push(serde_json::from_str::<RunRecord>(&fs::read_to_string(&path)?)?);
            }
        }
        runs.sort_by(|a, b| a.start_time.cmp(&b.start_time).then_with(|| a.run_id.cmp(&b.run_id)));
        Ok(runs)
    }
}

/// A run in progress. Every mutation is written through to `run.json`.
#[derive(Debug)]
pub struct ActiveRun {
    record: RunRecord,
    dir: PathBuf,
}

impl ActiveRun {
    pub fn run_id(&self) -> &str {
        &self.record.run_id
    }

    pub fn log_param(&mut self, key: &str, value: impl ToString) -> Result<()> {
        self.record.params.insert(key.to_string(), value.to_string());
        self.persist()
    }

    pub fn log_params(&mut self, params: &BTreeMap<String, String>) -> Result<()> {
        self.record
            .params
            .extend(params.iter().map(|(k, v)| (k.clone(), v.clone())));
        self.persist()
    }

    /// Non-finite values cannot be stored in JSON and are dropped with a warning.
    pub fn log_metric(&mut self, key: &str, value: f64) -> Result<()> {
        if !value.is_finite() {
            warn!(run_id = %self.record.run_id, metric = %key, value, "dropping non-finite metric");
            return Ok(());
        }
        self.record.metrics.insert(key.to_string(), value);
        self.persist()
    }

    pub fn set_tag(&mut self, key: &str, value: impl ToString) -> Result<()> {
        self.record.tags.insert(key.to_string(), value.to_string());
        self.persist()
    }

    /// Store `bytes` under the run's artifact directory.
    pub fn log_artifact(&mut self, rel_path: &str, bytes: &[u8]) -> Result<PathBuf> {
        let rel = Path::new(rel_path);
        if rel.is_absolute() || rel.components().any(|c| matches!(c, std::path::Component::ParentDir)) {
            return Err(PipelineError::TrackingError(format!(
                "artifact path '{}' must stay inside the run directory",
                rel_path
            )));
        }
        let path = self.dir.join("artifacts").join(rel);
        write_atomic(&path, bytes)?;
        if !self.record.artifacts.iter().any(|a| a == rel_path) {
            self.record.artifacts.push(rel_path.to_string());
        }
        self.persist()?;
        Ok(path)
    }

    pub fn finish(mut self, status: RunStatus) -> Result<RunRecord> {
        self.record.status = status;
        self.record.end_time = Some(Utc::now().to_rfc3339());
        self.persist()?;
        Ok(self.record)
    }

    fn persist(&self) -> Result<()> {
        write_atomic(
            &self.dir.join(RUN_FILE),
            serde_json::to_string_pretty(&self.record)?.as_bytes(),
        )
        .map_err(|e| PipelineError::TrackingError(format!("cannot persist run {}: {}", self.record.run_id, e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_set_experiment_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let tracker = ExperimentTracker::open(dir.path()).unwrap();
        let a = tracker.set_experiment("diabetes").unwrap();
        let b = tracker.set_experiment("diabetes").unwrap();
        let c = tracker.set_experiment("other").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.experiment_id, "0");
        assert_eq!(c.experiment_id, "1");
        assert_eq!(tracker.list_experiments().unwrap().len(), 2);
    }

    #[test]
    fn test_run_lifecycle_is_persisted() {
        let dir = TempDir::new().unwrap();
        let tracker = ExperimentTracker::open(dir.path()).unwrap();
        let exp = tracker.set_experiment("diabetes").unwrap();

        let mut parent = tracker.start_run(&exp, "session", None).unwrap();
        let mut child = tracker.start_run(&exp, "ridge", Some(parent.run_id())).unwrap();
        child.log_param("alpha", 1.0).unwrap();
        child.log_metric("r2", 0.45).unwrap();
        child.log_metric("broken", f64::NAN).unwrap();
        child.set_tag("family", "ridge").unwrap();
        let child = child.finish(RunStatus::Finished).unwrap();
        parent.log_metric("n_families", 1.0).unwrap();
        let parent_id = parent.run_id().to_string();
        parent.finish(RunStatus::Finished).unwrap();

        let loaded = tracker.get_run(&exp.experiment_id, &child.run_id).unwrap();
        assert_eq!(loaded.parent_run_id.as_deref(), Some(parent_id.as_str()));
        assert_eq!(loaded.params["alpha"], "1");
        assert_eq!(loaded.metrics["r2"], 0.45);
        assert!(!loaded.metrics.contains_key("broken"));
        assert_eq!(loaded.status, RunStatus::Finished);
        assert!(loaded.end_time.is_some());
        assert_eq!(tracker.list_runs(&exp.experiment_id).unwrap().len(), 2);
    }

    #[test]
    fn test_artifacts_stay_inside_run() {
        let dir = TempDir::new().unwrap();
        let tracker = ExperimentTracker::open(dir.path()).unwrap();
        let exp = tracker.set_experiment("diabetes").unwrap();
        let mut run = tracker.start_run(&exp, "champion", None).unwrap();

        let path = run.log_artifact("model/model.bin", b"abc").unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"abc");
        assert!(run.log_artifact("../escape.bin", b"x").is_err());
        let record = run.finish(RunStatus::Finished).unwrap();
        assert_eq!(record.artifacts, vec!["model/model.bin".to_string()]);
    }
}
