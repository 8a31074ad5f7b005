//! Trainer/selector: per-family grid search, champion selection, publication

use super::cross_validation::CrossValidator;
use super::grid_search::GridSearchCV;
use super::metrics::RegressionMetrics;
use super::models::{Estimator, ModelFamily, ModelSpec, PublishedModel};
use super::params::Hyperparameters;
use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result};
use crate::preprocessing::TransformedData;
use crate::tracking::{
    parse_tracking_uri, ActiveRun, Experiment, ExperimentTracker, ModelRegistry, ModelVersion, RunStatus,
    Stage,
};
use crate::utils::write_atomic;
use chrono::Utc;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

/// Test-partition outcome of one family's best candidate
#[derive(Debug, Clone)]
pub struct FamilyOutcome {
    pub family: ModelFamily,
    pub params: Hyperparameters,
    /// Mean k-fold R² of the chosen hyperparameters
    pub cv_r2: f64,
    pub metrics: RegressionMetrics,
    pub run_id: String,
}

#[derive(Debug, Clone)]
pub struct TrainingReport {
    pub champion: FamilyOutcome,
    /// Every family in menu order
    pub candidates: Vec<FamilyOutcome>,
    pub champion_run_id: String,
    pub registry_version: u32,
    pub model_path: PathBuf,
}

/// Index of the champion: strictly highest finite R², earliest wins ties.
pub fn select_champion(candidates: &[FamilyOutcome]) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (idx, candidate) in candidates.iter().enumerate() {
        let r2 = candidate.metrics.r2;
        if !r2.is_finite() {
            continue;
        }
        match best {
            Some((_, current)) if r2 <= current => {}
            _ => best = Some((idx, r2)),
        }
    }
    best.map(|(idx, _)| idx)
}

pub struct ModelTrainer {
    menu: Vec<ModelSpec>,
    cv_folds: usize,
    seed: u64,
    tracking_uri: String,
    experiment_name: String,
    model_name: String,
    stage: String,
    model_path: PathBuf,
}

impl ModelTrainer {
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            menu: config.training.models.clone(),
            cv_folds: config.training.cv_folds,
            seed: config.data.random_state,
            tracking_uri: config.mlflow.tracking_uri.clone(),
            experiment_name: config.mlflow.experiment_name.clone(),
            model_name: config.mlflow.model_name.clone(),
            stage: config.mlflow.stage.clone(),
            model_path: config.artifacts.model_path(),
        }
    }

    pub fn with_menu(mut self, menu: Vec<ModelSpec>) -> Self {
        self.menu = menu;
        self
    }

    /// Train every family, publish the champion. Any failure comes back as
    /// `TrainingError` and leaves no new registry version behind.
    pub fn initiate_model_trainer(&self, data: &TransformedData) -> Result<TrainingReport> {
        self.run(data).map_err(|e| {
            error!(error = %e, "Model training failed");
            e.into_training()
        })
    }

    fn run(&self, data: &TransformedData) -> Result<TrainingReport> {
        if self.menu.is_empty() {
            return Err(PipelineError::TrainingError("model menu is empty".to_string()));
        }
        let stage: Stage = self.stage.parse()?;
        let root = parse_tracking_uri(&self.tracking_uri)?;
        let tracker = ExperimentTracker::open(&root)?;
        let registry = ModelRegistry::open(&root)?;
        let experiment = tracker.set_experiment(&self.experiment_name)?;

        info!(
            experiment = %experiment.name,
            families = self.menu.len(),
            train_rows = data.x_train.nrows(),
            test_rows = data.x_test.nrows(),
            "Starting model training"
        );

        let mut session = tracker.start_run(&experiment, "training_session", None)?;
        let result = self.train_session(&tracker, &registry, &experiment, &mut session, stage, data);
        let status = if result.is_ok() { RunStatus::Finished } else { RunStatus::Failed };
        if let Err(e) = session.finish(status) {
            warn!(error = %e, "could not close the training session run");
        }
        result
    }

    fn train_session(
        &self,
        tracker: &ExperimentTracker,
        registry: &ModelRegistry,
        experiment: &Experiment,
        session: &mut ActiveRun,
        stage: Stage,
        data: &TransformedData,
    ) -> Result<TrainingReport> {
        session.log_param("cv_folds", self.cv_folds)?;
        session.log_param("random_state", self.seed)?;
        session.log_param("n_train", data.x_train.nrows())?;
        session.log_param("n_test", data.x_test.nrows())?;

        let mut candidates = Vec::with_capacity(self.menu.len());
        let mut estimators = Vec::with_capacity(self.menu.len());
        for spec in &self.menu {
            let (outcome, estimator) = self.evaluate_family(tracker, experiment, session.run_id(), spec, data)?;
            candidates.push(outcome);
            estimators.push(estimator);
        }

        let champion_idx = select_champion(&candidates).ok_or_else(|| {
            PipelineError::TrainingError("no model family produced a finite test R²".to_string())
        })?;
        let champion = candidates[champion_idx].clone();
        session.set_tag("champion_family", champion.family)?;
        session.log_metric("champion_r2", champion.metrics.r2)?;
        info!(
            family = %champion.family,
            params = %champion.params,
            r2 = champion.metrics.r2,
            rmse = champion.metrics.rmse,
            "Champion selected"
        );

        let published = PublishedModel {
            name: self.model_name.clone(),
            family: champion.family,
            params: champion.params.to_string_map(),
            estimator: estimators.swap_remove(champion_idx),
            feature_names: data.feature_names.clone(),
            metrics: champion.metrics,
            run_id: String::new(),
            trained_at: Utc::now().to_rfc3339(),
        };
        let (champion_run_id, version) =
            self.publish(tracker, registry, experiment, session.run_id(), stage, published)?;

        Ok(TrainingReport {
            champion,
            candidates,
            champion_run_id,
            registry_version: version.version,
            model_path: self.model_path.clone(),
        })
    }

    fn evaluate_family(
        &self,
        tracker: &ExperimentTracker,
        experiment: &Experiment,
        session_id: &str,
        spec: &ModelSpec,
        data: &TransformedData,
    ) -> Result<(FamilyOutcome, Estimator)> {
        let mut run = tracker.start_run(experiment, spec.family.name(), Some(session_id))?;
        let evaluated = Self::search_and_score(&mut run, spec, self.cv_folds, self.seed, data);
        match evaluated {
            Ok((params, cv_r2, metrics, estimator)) => {
                info!(
                    family = %spec.family,
                    params = %params,
                    cv_r2,
                    r2 = metrics.r2,
                    rmse = metrics.rmse,
                    mae = metrics.mae,
                    "Family evaluated"
                );
                let outcome = FamilyOutcome {
                    family: spec.family,
                    params,
                    cv_r2,
                    metrics,
                    run_id: run.run_id().to_string(),
                };
                run.finish(RunStatus::Finished)?;
                Ok((outcome, estimator))
            }
            Err(e) => {
                error!(family = %spec.family, error = %e, "Family failed");
                if let Err(fe) = run.finish(RunStatus::Failed) {
                    warn!(error = %fe, "could not close failed family run");
                }
                Err(e)
            }
        }
    }

    fn search_and_score(
        run: &mut ActiveRun,
        spec: &ModelSpec,
        cv_folds: usize,
        seed: u64,
        data: &TransformedData,
    ) -> Result<(Hyperparameters, f64, RegressionMetrics, Estimator)> {
        run.set_tag("family", spec.family)?;
        let search = GridSearchCV::new(spec.family, spec.grid.clone())
            .with_cv(CrossValidator::k_fold(cv_folds))
            .with_seed(seed)
            .fit(&data.x_train, &data.y_train)?;

        let predictions = search.best_estimator.predict(&data.x_test)?;
        let metrics = RegressionMetrics::compute(&data.y_test, &predictions)?;

        run.log_params(&search.best_params.to_string_map())?;
        for (key, value) in metrics.as_pairs() {
            run.log_metric(key, value)?;
        }
        run.log_metric("cv_r2", search.best_score)?;
        Ok((search.best_params, search.best_score, metrics, search.best_estimator))
    }

    fn publish(
        &self,
        tracker: &ExperimentTracker,
        registry: &ModelRegistry,
        experiment: &Experiment,
        session_id: &str,
        stage: Stage,
        mut model: PublishedModel,
    ) -> Result<(String, ModelVersion)> {
        let mut run = tracker.start_run(experiment, "champion", None)?;
        model.run_id = run.run_id().to_string();
        match self.publish_in_run(&mut run, registry, session_id, stage, &model) {
            Ok(version) => {
                let run_id = run.run_id().to_string();
                run.finish(RunStatus::Finished)?;
                info!(
                    model = %self.model_name,
                    version = version.version,
                    stage = %stage,
                    path = %self.model_path.display(),
                    "Champion published"
                );
                Ok((run_id, version))
            }
            Err(e) => {
                if let Err(fe) = run.finish(RunStatus::Failed) {
                    warn!(error = %fe, "could not close failed champion run");
                }
                Err(e)
            }
        }
    }

    fn publish_in_run(
        &self,
        run: &mut ActiveRun,
        registry: &ModelRegistry,
        session_id: &str,
        stage: Stage,
        model: &PublishedModel,
    ) -> Result<ModelVersion> {
        run.set_tag("family", model.family)?;
        run.set_tag("session_run_id", session_id)?;
        run.log_params(&model.params)?;
        for (key, value) in model.metrics.as_pairs() {
            run.log_metric(key, value)?;
        }
        let bytes = model.to_bytes()?;
        run.log_artifact("model/model.bin", &bytes)?;

        let previous = registry.stage_holder(&self.model_name, stage)?;
        let version = registry.register_model(&self.model_name, run.run_id(), &bytes)?;

        let staged = self.model_path.with_extension(format!("tmp-{}", uuid::Uuid::new_v4().simple()));
        let finished = write_atomic(&staged, &bytes)
            .and_then(|_| registry.transition_stage(&self.model_name, version.version, stage, true))
            .and_then(|v| {
                run.set_tag("registry_version", v.version)?;
                Ok(v)
            })
            // Rename last: a rollback must never leave this champion as the local copy
            .and_then(|v| {
                std::fs::rename(&staged, &self.model_path)?;
                Ok(v)
            });

        match finished {
            Ok(v) => Ok(v),
            Err(e) => {
                self.roll_back(registry, &staged, version.version, previous.as_ref(), stage);
                Err(e)
            }
        }
    }

    fn roll_back(
        &self,
        registry: &ModelRegistry,
        staged: &Path,
        version: u32,
        previous: Option<&ModelVersion>,
        stage: Stage,
    ) {
        warn!(model = %self.model_name, version, "Rolling back publication");
        let _ = std::fs::remove_file(staged);
        if let Err(e) = registry.delete_version(&self.model_name, version) {
            error!(error = %e, version, "could not delete registry version during rollback");
        }
        if let Some(prev) = previous {
            if let Err(e) = registry.transition_stage(&self.model_name, prev.version, stage, false) {
                error!(error = %e, version = prev.version, "could not restore previous stage holder");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::training::params::{ParamGrid, ParamValue};
    use ndarray::{Array1, Array2};
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;
    use tempfile::TempDir;

    fn outcome(family: ModelFamily, r2: f64) -> FamilyOutcome {
        FamilyOutcome {
            family,
            params: Hyperparameters::new(),
            cv_r2: r2,
            metrics: RegressionMetrics { rmse: 1.0, mae: 1.0, r2 },
            run_id: String::new(),
        }
    }

    #[test]
    fn test_champion_ties_go_to_first() {
        let c = vec![
            outcome(ModelFamily::Ridge, 0.4),
            outcome(ModelFamily::Lasso, 0.5),
            outcome(ModelFamily::Knn, 0.5),
        ];
        assert_eq!(select_champion(&c), Some(1));
    }

    #[test]
    fn test_champion_skips_non_finite() {
        let c = vec![outcome(ModelFamily::Ridge, f64::NAN), outcome(ModelFamily::Lasso, -3.0)];
        assert_eq!(select_champion(&c), Some(1));
        assert_eq!(select_champion(&[outcome(ModelFamily::Ridge, f64::NAN)]), None);
        assert_eq!(select_champion(&[]), None);
    }

    fn config_in(dir: &Path) -> PipelineConfig {
        let yaml = format!(
            r#"
data:
  raw_path: {root}/data/raw.csv
  test_size: 0.2
artifacts:
  model_dir: {root}/models
mlflow:
  tracking_uri: file://{root}/mlruns
  experiment_name: trainer-test
  model_name: TestModel
training:
  cv_folds: 3
  models:
    - family: linear_regression
    - family: ridge
      grid:
        alpha: [0.1, 1.0]
"#,
            root = dir.display()
        );
        PipelineConfig::from_yaml_str(&yaml).unwrap()
    }

    fn data() -> TransformedData {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let make = |rng: &mut ChaCha8Rng, n: usize| {
            let x = Array2::from_shape_fn((n, 2), |_| rng.gen_range(-2.0..2.0));
            let y: Array1<f64> = x
                .rows()
                .into_iter()
                .map(|r| 10.0 + 3.0 * r[0] - 2.0 * r[1] + rng.gen_range(-0.1..0.1))
                .collect();
            (x, y)
        };
        let (x_train, y_train) = make(&mut rng, 40);
        let (x_test, y_test) = make(&mut rng, 10);
        TransformedData {
            feature_names: vec!["a".to_string(), "b".to_string()],
            x_train,
            x_test,
            y_train,
            y_test,
        }
    }

    #[test]
    fn test_publishes_registry_version_and_local_copy() {
        let dir = TempDir::new().unwrap();
        let config = config_in(dir.path());
        let report = ModelTrainer::new(&config).initiate_model_trainer(&data()).unwrap();

        assert_eq!(report.candidates.len(), 2);
        assert_eq!(report.registry_version, 1);
        assert!(report.champion.metrics.r2 > 0.9);

        let registry = ModelRegistry::open(dir.path().join("mlruns")).unwrap();
        let (version, bytes) = registry.load_model_bytes("TestModel", Stage::Production).unwrap();
        assert_eq!(version.version, 1);
        let local = std::fs::read(config.artifacts.model_path()).unwrap();
        assert_eq!(bytes, local);
        let model = PublishedModel::from_bytes(&local).unwrap();
        assert_eq!(model.family, report.champion.family);
        assert_eq!(model.run_id, report.champion_run_id);
    }

    #[test]
    fn test_second_run_archives_previous_production() {
        let dir = TempDir::new().unwrap();
        let config = config_in(dir.path());
        let trainer = ModelTrainer::new(&config);
        trainer.initiate_model_trainer(&data()).unwrap();
        let report = trainer.initiate_model_trainer(&data()).unwrap();
        assert_eq!(report.registry_version, 2);

        let registry = ModelRegistry::open(dir.path().join("mlruns")).unwrap();
        assert_eq!(registry.latest_version("TestModel", Some(Stage::Production)).unwrap().version, 2);
        assert_eq!(registry.latest_version("TestModel", Some(Stage::Archived)).unwrap().version, 1);
    }

    #[test]
    fn test_failed_publication_leaves_no_version() {
        let dir = TempDir::new().unwrap();
        let config = config_in(dir.path());
        // A plain file where the model directory should be makes the local write fail
        std::fs::write(dir.path().join("models"), b"not a directory").unwrap();

        let err = ModelTrainer::new(&config).initiate_model_trainer(&data()).unwrap_err();
        assert!(matches!(err, PipelineError::TrainingError(_)));

        let registry = ModelRegistry::open(dir.path().join("mlruns")).unwrap();
        assert!(registry.get_registered_model("TestModel").unwrap().versions.is_empty());

        let tracker = ExperimentTracker::open(dir.path().join("mlruns")).unwrap();
        let exp = tracker.get_experiment_by_name("trainer-test").unwrap().unwrap();
        let runs = tracker.list_runs(&exp.experiment_id).unwrap();
        let champion = runs.iter().find(|r| r.run_name == "champion").unwrap();
        assert_eq!(champion.status, RunStatus::Failed);
        let session = runs.iter().find(|r| r.run_name == "training_session").unwrap();
        assert_eq!(session.status, RunStatus::Failed);
    }

    #[test]
    fn test_failed_republication_keeps_previous_champion() {
        let dir = TempDir::new().unwrap();
        let config = config_in(dir.path());
        let trainer = ModelTrainer::new(&config);
        trainer.initiate_model_trainer(&data()).unwrap();

        let model_path = config.artifacts.model_path();
        let published = std::fs::read(&model_path).unwrap();
        // A non-empty directory at the model path makes the final rename fail
        std::fs::remove_file(&model_path).unwrap();
        std::fs::create_dir_all(model_path.join("blocker")).unwrap();

        let err = trainer.initiate_model_trainer(&data()).unwrap_err();
        assert!(matches!(err, PipelineError::TrainingError(_)));

        let registry = ModelRegistry::open(dir.path().join("mlruns")).unwrap();
        let model = registry.get_registered_model("TestModel").unwrap();
        assert_eq!(model.versions.len(), 1);
        let (holder, bytes) = registry.load_model_bytes("TestModel", Stage::Production).unwrap();
        assert_eq!(holder.version, 1);
        assert_eq!(bytes, published);
        assert!(model_path.join("blocker").is_dir());
        let leftovers = std::fs::read_dir(config.artifacts.model_dir.clone())
            .unwrap()
            .filter(|e| e.as_ref().unwrap().file_name().to_string_lossy().contains("tmp-"))
            .count();
        assert_eq!(leftovers, 0);
    }

    #[test]
    fn test_corrupt_registry_index_aborts_publication() {
        let dir = TempDir::new().unwrap();
        let config = config_in(dir.path());
        let trainer = ModelTrainer::new(&config);
        trainer.initiate_model_trainer(&data()).unwrap();
        let published = std::fs::read(config.artifacts.model_path()).unwrap();

        let index = dir.path().join("mlruns/models/TestModel/registered_model.json");
        std::fs::write(&index, "{").unwrap();

        let err = trainer.initiate_model_trainer(&data()).unwrap_err();
        assert!(matches!(err, PipelineError::TrainingError(_)));
        assert_eq!(std::fs::read(config.artifacts.model_path()).unwrap(), published);
        assert_eq!(
            std::fs::read(dir.path().join("mlruns/models/TestModel/v1/model.bin")).unwrap(),
            published
        );
    }

    #[test]
    fn test_network_tracking_uri_is_a_training_error() {
        let dir = TempDir::new().unwrap();
        let mut config = config_in(dir.path());
        config.mlflow.tracking_uri = "http://localhost:5000".to_string();
        let err = ModelTrainer::new(&config).initiate_model_trainer(&data()).unwrap_err();
        assert!(matches!(err, PipelineError::TrainingError(_)));
    }

    #[test]
    fn test_family_failure_aborts_training() {
        let dir = TempDir::new().unwrap();
        let config = config_in(dir.path());
        let menu = vec![
            ModelSpec::with_default_grid(ModelFamily::LinearRegression),
            ModelSpec::new(
                ModelFamily::Knn,
                ParamGrid::new().add("n_neighbors", vec![ParamValue::Int(500)]),
            ),
        ];
        let err = ModelTrainer::new(&config)
            .with_menu(menu)
            .initiate_model_trainer(&data())
            .unwrap_err();
        assert!(matches!(err, PipelineError::TrainingError(_)));
        assert!(!config.artifacts.model_path().exists());
    }
}
