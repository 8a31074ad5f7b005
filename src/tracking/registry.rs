//! Versioned model registry with stage labels

use crate::error::{PipelineError, Result};
use crate::utils::write_atomic;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::info;

const INDEX_FILE: &str = "registered_model.json";
const BLOB_FILE: &str = "model.bin";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Stage {
    None,
    Staging,
    Production,
    Archived,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::None => "None",
            Stage::Staging => "Staging",
            Stage::Production => "Production",
            Stage::Archived => "Archived",
        };
        f.write_str(s)
    }
}

impl FromStr for Stage {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" => Ok(Stage::None),
            "staging" => Ok(Stage::Staging),
            "production" => Ok(Stage::Production),
            "archived" => Ok(Stage::Archived),
            other => Err(PipelineError::RegistryError(format!("unknown stage '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelVersion {
    pub name: String,
    pub version: u32,
    pub run_id: String,
    pub stage: Stage,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegisteredModel {
    pub name: String,
    pub created_at: String,
    /// Highest version number ever assigned, including deleted ones
    #[serde(default)]
    pub last_version: u32,
    pub versions: Vec<ModelVersion>,
}

impl RegisteredModel {
    fn version_mut(&mut self, version: u32) -> Result<&mut ModelVersion> {
        let name = self.name.clone();
        self.versions
            .iter_mut()
            .find(|v| v.version == version)
            .ok_or_else(|| PipelineError::RegistryError(format!("{} has no version {}", name, version)))
    }
}

/// Registry stored under `<tracking root>/models`
#[derive(Debug, Clone)]
pub struct ModelRegistry {
    root: PathBuf,
}

impl ModelRegistry {
    pub fn open(tracking_root: impl AsRef<Path>) -> Result<Self> {
        let root = tracking_root.as_ref().join("models");
        fs::create_dir_all(&root).map_err(|e| {
            PipelineError::RegistryError(format!("cannot create registry at {}: {}", root.display(), e))
        })?;
        Ok(Self { root })
    }

    fn model_dir(&self, name: &str) -> Result<PathBuf> {
        let invalid = name.trim().is_empty()
            || name.contains(['/', '\\'])
            || name == "."
            || name == "..";
        if invalid {
            return Err(PipelineError::RegistryError(format!("invalid model name '{}'", name)));
        }
        Ok(self.root.join(name))
    }

    fn blob_path(&self, name: &str, version: u32) -> Result<PathBuf> {
        Ok(self.model_dir(name)?.join(format!("v{}", version)).join(BLOB_FILE))
    }

    /// Index of `name`, or `None` when it was never registered. An index that
    /// exists but cannot be read or parsed is an error.
    fn load_index(&self, name: &str) -> Result<Option<RegisteredModel>> {
        let path = self.model_dir(name)?.join(INDEX_FILE);
        if !path.exists() {
            return Ok(None);
        }
        let contents = fs::read_to_string(&path).map_err(|e| {
            PipelineError::RegistryError(format!("cannot read index for '{}': {}", name, e))
        })?;
        serde_json::from_str(&contents)
            .map(Some)
            .map_err(|e| PipelineError::RegistryError(format!("corrupt index for '{}': {}", name, e)))
    }

    pub fn get_registered_model(&self, name: &str) -> Result<RegisteredModel> {
        self.load_index(name)?
            .ok_or_else(|| PipelineError::RegistryError(format!("registered model '{}' not found", name)))
    }

    /// Names of every registered model, sorted.
    pub fn list_models(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if entry.path().join(INDEX_FILE).is_file() {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        names.sort();
        Ok(names)
    }

    fn save(&self, model: &RegisteredModel) -> Result<()> {
        let path = self.model_dir(&model.name)?.join(INDEX_FILE);
        write_atomic(&path, serde_json::to_string_pretty(model)?.as_bytes())
    }

    /// Store a new version (stage `None`). Version numbers start at 1 and never repeat.
    pub fn register_model(&self, name: &str, run_id: &str, bytes: &[u8]) -> Result<ModelVersion> {
        let mut model = match self.load_index(name)? {
            Some(model) => model,
            None => RegisteredModel {
                name: name.to_string(),
                created_at: Utc::now().to_rfc3339(),
                last_version: 0,
                versions: Vec::new(),
            },
        };
        let version = model
            .versions
            .iter()
            .map(|v| v.version)
            .max()
            .unwrap_or(0)
            .max(model.last_version)
            + 1;
        model.last_version = version;
        write_atomic(&self.blob_path(name, version)?, bytes)?;

        let entry = ModelVersion {
            name: name.to_string(),
            version,
            run_id: run_id.to_string(),
            stage: Stage::None,
            created_at: Utc::now().to_rfc3339(),
        };
        model.versions.push(entry.clone());
        self.save(&model)?;
        info!(model = %name, version, "registered model version");
        Ok(entry)
    }

    /// Move `version` to `stage`. With `archive_existing`, any other version
    /// holding that stage becomes `Archived`.
    pub fn transition_stage(
        &self,
        name: &str,
        version: u32,
        stage: Stage,
        archive_existing: bool,
    ) -> Result<ModelVersion> {
        let mut model = self.get_registered_model(name)?;
        let updated = {
            let target = model.version_mut(version)?;
            target.stage = stage;
            target.clone()
        };
        if archive_existing && matches!(stage, Stage::Staging | Stage::Production) {
            for other in model.versions.iter_mut() {
                if other.version != version && other.stage == stage {
                    other.stage = Stage::Archived;
                }
            }
        }
        self.save(&model)?;
        info!(model = %name, version, stage = %stage, "transitioned model version");
        Ok(updated)
    }

    /// Highest version in `stage`, or the highest overall when `stage` is `None`.
    pub fn latest_version(&self, name: &str, stage: Option<Stage>) -> Result<ModelVersion> {
        let model = self.get_registered_model(name)?;
        model
            .versions
            .into_iter()
            .filter(|v| stage.map_or(true, |s| v.stage == s))
            .max_by_key(|v| v.version)
            .ok_or_else(|| {
                PipelineError::RegistryError(match stage {
                    Some(s) => format!("'{}' has no version in stage {}", name, s),
                    None => format!("'{}' has no versions", name),
                })
            })
    }

    /// Current holder of `stage`. `None` when the model is unregistered or the
    /// stage is empty; unreadable indexes still fail.
    pub fn stage_holder(&self, name: &str, stage: Stage) -> Result<Option<ModelVersion>> {
        Ok(self.load_index(name)?.and_then(|model| {
            model
                .versions
                .into_iter()
                .filter(|v| v.stage == stage)
                .max_by_key(|v| v.version)
        }))
    }

    /// Bytes of the latest version in `stage`.
    pub fn load_model_bytes(&self, name: &str, stage: Stage) -> Result<(ModelVersion, Vec<u8>)> {
        let version = self.latest_version(name, Some(stage))?;
        let path = self.blob_path(name, version.version)?;
        let bytes = fs::read(&path).map_err(|e| {
            PipelineError::RegistryError(format!(
                "blob for {} v{} unreadable: {}",
                name, version.version, e
            ))
        })?;
        Ok((version, bytes))
    }

    pub fn delete_version(&self, name: &str, version: u32) -> Result<()> {
        let mut model = self.get_registered_model(name)?;
        let before = model.versions.len();
        model.versions.retain(|v| v.version != version);
        if model.versions.len() == before {
            return Err(PipelineError::RegistryError(format!("{} has no version {}", name, version)));
        }
        let dir = self.model_dir(name)?.join(format!("v{}", version));
        if dir.exists() {
            fs::remove_dir_all(&dir)?;
        }
        self.save(&model)?;
        info!(model = %name, version, "deleted model version");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_stage_parsing_is_case_insensitive() {
        assert_eq!("production".parse::<Stage>().unwrap(), Stage::Production);
        assert_eq!(" STAGING ".parse::<Stage>().unwrap(), Stage::Staging);
        assert!("live".parse::<Stage>().is_err());
    }

    #[test]
    fn test_versions_and_stage_transitions() {
        let dir = TempDir::new().unwrap();
        let registry = ModelRegistry::open(dir.path()).unwrap();

        let v1 = registry.register_model("m", "run-a", b"one").unwrap();
        let v2 = registry.register_model("m", "run-b", b"two").unwrap();
        assert_eq!((v1.version, v2.version), (1, 2));
        assert_eq!(v2.stage, Stage::None);
        assert!(registry.load_model_bytes("m", Stage::Production).is_err());

        registry.transition_stage("m", 1, Stage::Production, true).unwrap();
        registry.transition_stage("m", 2, Stage::Production, true).unwrap();
        let (prod, bytes) = registry.load_model_bytes("m", Stage::Production).unwrap();
        assert_eq!(prod.version, 2);
        assert_eq!(bytes, b"two");
        assert_eq!(
            registry.latest_version("m", Some(Stage::Archived)).unwrap().version,
            1
        );
    }

    #[test]
    fn test_delete_never_reuses_numbers() {
        let dir = TempDir::new().unwrap();
        let registry = ModelRegistry::open(dir.path()).unwrap();
        registry.register_model("m", "r", b"1").unwrap();
        registry.register_model("m", "r", b"2").unwrap();
        registry.delete_version("m", 2).unwrap();
        assert!(registry.delete_version("m", 2).is_err());

        let v = registry.register_model("m", "r", b"3").unwrap();
        assert_eq!(v.version, 3);
        assert_eq!(registry.get_registered_model("m").unwrap().versions.len(), 2);
        assert_eq!(registry.list_models().unwrap(), vec!["m".to_string()]);
    }

    #[test]
    fn test_corrupt_index_is_not_overwritten() {
        let dir = TempDir::new().unwrap();
        let registry = ModelRegistry::open(dir.path()).unwrap();
        registry.register_model("m", "run-a", b"one").unwrap();
        registry.transition_stage("m", 1, Stage::Production, true).unwrap();

        let model_dir = dir.path().join("models").join("m");
        std::fs::write(model_dir.join(INDEX_FILE), "{\"name\": \"m\", \"vers").unwrap();

        let err = registry.register_model("m", "run-b", b"two").unwrap_err();
        assert!(matches!(err, PipelineError::RegistryError(ref m) if m.contains("corrupt")));
        assert!(registry.stage_holder("m", Stage::Production).is_err());
        assert_eq!(std::fs::read(model_dir.join("v1").join(BLOB_FILE)).unwrap(), b"one");
        assert!(!model_dir.join("v2").exists());
    }

    #[test]
    fn test_stage_holder() {
        let dir = TempDir::new().unwrap();
        let registry = ModelRegistry::open(dir.path()).unwrap();
        assert_eq!(registry.stage_holder("m", Stage::Production).unwrap(), None);
        registry.register_model("m", "r", b"1").unwrap();
        assert_eq!(registry.stage_holder("m", Stage::Production).unwrap(), None);
        registry.transition_stage("m", 1, Stage::Production, true).unwrap();
        assert_eq!(registry.stage_holder("m", Stage::Production).unwrap().unwrap().version, 1);
    }

    #[test]
    fn test_invalid_names_rejected() {
        let dir = TempDir::new().unwrap();
        let registry = ModelRegistry::open(dir.path()).unwrap();
        assert!(registry.register_model("../x", "r", b"").is_err());
        assert!(registry.get_registered_model("missing").is_err());
    }
}
