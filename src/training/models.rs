//! Model families, the fitted-estimator enum and the published artifact

use super::decision_tree::DecisionTreeRegressor;
use super::gradient_boosting::{GradientBoostingConfig, GradientBoostingRegressor};
use super::knn::KNNRegressor;
use super::linear_models::{ElasticNetRegression, LinearRegression, RidgeRegression};
use super::metrics::RegressionMetrics;
use super::params::{Hyperparameters, ParamGrid, ParamValue};
use super::random_forest::RandomForestRegressor;
use crate::error::{PipelineError, Result};
use ndarray::{Array1, Array2, ArrayView1, Axis};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Regression families the trainer can search over
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelFamily {
    LinearRegression,
    Ridge,
    Lasso,
    ElasticNet,
    DecisionTree,
    RandomForest,
    GradientBoosting,
    Knn,
}

impl ModelFamily {
    pub const ALL: [ModelFamily; 8] = [
        ModelFamily::LinearRegression,
        ModelFamily::Ridge,
        ModelFamily::Lasso,
        ModelFamily::ElasticNet,
        ModelFamily::DecisionTree,
        ModelFamily::RandomForest,
        ModelFamily::GradientBoosting,
        ModelFamily::Knn,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ModelFamily::LinearRegression => "linear_regression",
            ModelFamily::Ridge => "ridge",
            ModelFamily::Lasso => "lasso",
            ModelFamily::ElasticNet => "elastic_net",
            ModelFamily::DecisionTree => "decision_tree",
            ModelFamily::RandomForest => "random_forest",
            ModelFamily::GradientBoosting => "gradient_boosting",
            ModelFamily::Knn => "knn",
        }
    }

    /// Hyperparameter names this family accepts
    pub fn known_params(&self) -> &'static [&'static str] {
        match self {
            ModelFamily::LinearRegression => &[],
            ModelFamily::Ridge => &["alpha"],
            ModelFamily::Lasso => &["alpha", "max_iter"],
            ModelFamily::ElasticNet => &["alpha", "l1_ratio", "max_iter"],
            ModelFamily::DecisionTree => &["max_depth", "min_samples_split", "min_samples_leaf"],
            ModelFamily::RandomForest => &["n_estimators", "max_depth", "min_samples_leaf", "bootstrap"],
            ModelFamily::GradientBoosting => &[
                "n_estimators",
                "learning_rate",
                "max_depth",
                "min_samples_leaf",
                "subsample",
            ],
            ModelFamily::Knn => &["n_neighbors", "weights"],
        }
    }

    /// Search space used when the configuration does not override the menu
    pub fn default_grid(&self) -> ParamGrid {
        use ParamValue::{Float, Int, Null, Str};
        match self {
            ModelFamily::LinearRegression => ParamGrid::new(),
            ModelFamily::Ridge => ParamGrid::new().add("alpha", vec![Float(0.1), Float(1.0), Float(10.0)]),
            ModelFamily::Lasso => ParamGrid::new().add("alpha", vec![Float(0.01), Float(0.1), Float(1.0)]),
            ModelFamily::ElasticNet => ParamGrid::new()
                .add("alpha", vec![Float(0.01), Float(0.1), Float(1.0)])
                .add("l1_ratio", vec![Float(0.2), Float(0.5), Float(0.8)]),
            ModelFamily::DecisionTree => ParamGrid::new()
                .add("max_depth", vec![Int(3), Int(5), Null])
                .add("min_samples_leaf", vec![Int(1), Int(10)]),
            ModelFamily::RandomForest => ParamGrid::new()
                .add("n_estimators", vec![Int(50), Int(100)])
                .add("max_depth", vec![Null, Int(5), Int(10)]),
            ModelFamily::GradientBoosting => ParamGrid::new()
                .add("n_estimators", vec![Int(50), Int(100)])
                .add("learning_rate", vec![Float(0.05), Float(0.1)])
                .add("max_depth", vec![Int(3)]),
            ModelFamily::Knn => ParamGrid::new()
                .add("n_neighbors", vec![Int(5), Int(10), Int(20)])
                .add("weights", vec![Str("uniform".to_string()), Str("distance".to_string())]),
        }
    }

    /// Instantiate an unfitted estimator. `seed` drives any randomness.
    pub fn build(&self, params: &Hyperparameters, seed: u64) -> Result<Estimator> {
        params.ensure_known(self.known_params())?;
        let estimator = match self {
            ModelFamily::LinearRegression => Estimator::LinearRegression(LinearRegression::new()),
            ModelFamily::Ridge => {
                Estimator::Ridge(RidgeRegression::new(non_negative(params, "alpha", 1.0)?))
            }
            ModelFamily::Lasso => Estimator::Lasso(
                ElasticNetRegression::lasso(non_negative(params, "alpha", 1.0)?)
                    .with_max_iter(params.usize_or("max_iter", 1000)?),
            ),
            ModelFamily::ElasticNet => {
                let l1_ratio = params.f64_or("l1_ratio", 0.5)?;
                if !(0.0..=1.0).contains(&l1_ratio) {
                    return Err(PipelineError::InvalidParameter {
                        name: "l1_ratio".to_string(),
                        value: l1_ratio.to_string(),
                        reason: "must be in [0, 1]".to_string(),
                    });
                }
                Estimator::ElasticNet(
                    ElasticNetRegression::new(non_negative(params, "alpha", 1.0)?, l1_ratio)
                        .with_max_iter(params.usize_or("max_iter", 1000)?),
                )
            }
            ModelFamily::DecisionTree => Estimator::DecisionTree(
                DecisionTreeRegressor::new()
                    .with_max_depth(params.opt_usize("max_depth")?)
                    .with_min_samples_split(params.usize_or("min_samples_split", 2)?)
                    .with_min_samples_leaf(params.usize_or("min_samples_leaf", 1)?),
            ),
            ModelFamily::RandomForest => {
                let bootstrap = match params.get("bootstrap") {
                    None => true,
                    Some(ParamValue::Bool(b)) => *b,
                    Some(other) => {
                        return Err(PipelineError::InvalidParameter {
                            name: "bootstrap".to_string(),
                            value: other.to_string(),
                            reason: "expected a boolean".to_string(),
                        })
                    }
                };
                Estimator::RandomForest(
                    RandomForestRegressor::new(params.usize_or("n_estimators", 100)?)
                        .with_max_depth(params.opt_usize("max_depth")?)
                        .with_min_samples_leaf(params.usize_or("min_samples_leaf", 1)?)
                        .with_bootstrap(bootstrap)
                        .with_random_state(seed),
                )
            }
            ModelFamily::GradientBoosting => {
                let max_depth = match params.get("max_depth") {
                    None => Some(3),
                    Some(_) => params.opt_usize("max_depth")?,
                };
                Estimator::GradientBoosting(GradientBoostingRegressor::new(GradientBoostingConfig {
                    n_estimators: params.usize_or("n_estimators", 100)?,
                    learning_rate: non_negative(params, "learning_rate", 0.1)?,
                    max_depth,
                    min_samples_leaf: params.usize_or("min_samples_leaf", 1)?,
                    subsample: params.f64_or("subsample", 1.0)?,
                    random_state: seed,
                }))
            }
            ModelFamily::Knn => Estimator::Knn(
                KNNRegressor::new(params.usize_or("n_neighbors", 5)?)
                    .with_weights(params.str_or("weights", "uniform")?.parse()?),
            ),
        };
        Ok(estimator)
    }
}

fn non_negative(params: &Hyperparameters, name: &str, default: f64) -> Result<f64> {
    let value = params.f64_or(name, default)?;
    if value < 0.0 || !value.is_finite() {
        return Err(PipelineError::InvalidParameter {
            name: name.to_string(),
            value: value.to_string(),
            reason: "must be a finite non-negative number".to_string(),
        });
    }
    Ok(value)
}

impl fmt::Display for ModelFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ModelFamily {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        ModelFamily::ALL
            .iter()
            .copied()
            .find(|f| f.name() == s.trim().to_ascii_lowercase())
            .ok_or_else(|| PipelineError::ConfigError(format!("unknown model family '{}'", s)))
    }
}

/// One menu entry: a family and the grid to search for it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSpec {
    pub family: ModelFamily,
    #[serde(default)]
    pub grid: ParamGrid,
}

impl ModelSpec {
    pub fn new(family: ModelFamily, grid: ParamGrid) -> Self {
        Self { family, grid }
    }

    pub fn with_default_grid(family: ModelFamily) -> Self {
        Self::new(family, family.default_grid())
    }
}

/// Every family with its default grid, in tie-break order
pub fn default_model_menu() -> Vec<ModelSpec> {
    ModelFamily::ALL.iter().map(|&f| ModelSpec::with_default_grid(f)).collect()
}

/// A concrete estimator of any family
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Estimator {
    LinearRegression(LinearRegression),
    Ridge(RidgeRegression),
    Lasso(ElasticNetRegression),
    ElasticNet(ElasticNetRegression),
    DecisionTree(DecisionTreeRegressor),
    RandomForest(RandomForestRegressor),
    GradientBoosting(GradientBoostingRegressor),
    Knn(KNNRegressor),
}

impl Estimator {
    pub fn family(&self) -> ModelFamily {
        match self {
            Estimator::LinearRegression(_) => ModelFamily::LinearRegression,
            Estimator::Ridge(_) => ModelFamily::Ridge,
            Estimator::Lasso(_) => ModelFamily::Lasso,
            Estimator::ElasticNet(_) => ModelFamily::ElasticNet,
            Estimator::DecisionTree(_) => ModelFamily::DecisionTree,
            Estimator::RandomForest(_) => ModelFamily::RandomForest,
            Estimator::GradientBoosting(_) => ModelFamily::GradientBoosting,
            Estimator::Knn(_) => ModelFamily::Knn,
        }
    }

    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        match self {
            Estimator::LinearRegression(m) => m.fit(x, y).map(|_| ()),
            Estimator::Ridge(m) => m.fit(x, y).map(|_| ()),
            Estimator::Lasso(m) | Estimator::ElasticNet(m) => m.fit(x, y).map(|_| ()),
            Estimator::DecisionTree(m) => m.fit(x, y).map(|_| ()),
            Estimator::RandomForest(m) => m.fit(x, y).map(|_| ()),
            Estimator::GradientBoosting(m) => m.fit(x, y).map(|_| ()),
            Estimator::Knn(m) => m.fit(x, y).map(|_| ()),
        }
    }

    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        match self {
            Estimator::LinearRegression(m) => m.predict(x),
            Estimator::Ridge(m) => m.predict(x),
            Estimator::Lasso(m) | Estimator::ElasticNet(m) => m.predict(x),
            Estimator::DecisionTree(m) => m.predict(x),
            Estimator::RandomForest(m) => m.predict(x),
            Estimator::GradientBoosting(m) => m.predict(x),
            Estimator::Knn(m) => m.predict(x),
        }
    }
}

/// The champion as written to the registry and the local fallback file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublishedModel {
    pub name: String,
    pub family: ModelFamily,
    pub params: BTreeMap<String, String>,
    pub estimator: Estimator,
    /// Column order the estimator expects
    pub feature_names: Vec<String>,
    pub metrics: RegressionMetrics,
    pub run_id: String,
    pub trained_at: String,
}

impl PublishedModel {
    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        self.estimator.predict(x)
    }

    /// Predict one already-scaled record
    pub fn predict_row(&self, row: ArrayView1<f64>) -> Result<f64> {
        let x = row.insert_axis(Axis(0)).to_owned();
        let prediction = self.estimator.predict(&x)?;
        prediction
            .first()
            .copied()
            .ok_or_else(|| PipelineError::InferenceError("model returned no prediction".to_string()))
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(bincode::deserialize(bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_family_names_roundtrip() {
        for family in ModelFamily::ALL {
            assert_eq!(family.name().parse::<ModelFamily>().unwrap(), family);
            let yaml = serde_yaml::to_string(&family).unwrap();
            assert_eq!(yaml.trim(), family.name());
        }
        assert!("svm".parse::<ModelFamily>().is_err());
    }

    #[test]
    fn test_every_default_grid_builds() {
        for spec in default_model_menu() {
            for params in spec.grid.combinations().unwrap() {
                let est = spec.family.build(&params, 42).unwrap();
                assert_eq!(est.family(), spec.family);
            }
        }
    }

    #[test]
    fn test_unknown_and_bad_params_rejected() {
        let p = Hyperparameters::new().with("gamma", ParamValue::Float(1.0));
        assert!(ModelFamily::Ridge.build(&p, 0).is_err());

        let p = Hyperparameters::new().with("alpha", ParamValue::Float(-1.0));
        assert!(ModelFamily::Ridge.build(&p, 0).is_err());

        let p = Hyperparameters::new().with("l1_ratio", ParamValue::Float(1.5));
        assert!(ModelFamily::ElasticNet.build(&p, 0).is_err());

        let p = Hyperparameters::new().with("weights", ParamValue::Str("cosine".to_string()));
        assert!(ModelFamily::Knn.build(&p, 0).is_err());
    }

    #[test]
    fn test_published_model_bytes_roundtrip() {
        let x = array![[0.0], [1.0], [2.0], [3.0]];
        let y = array![1.0, 3.0, 5.0, 7.0];
        let mut estimator = ModelFamily::LinearRegression
            .build(&Hyperparameters::new(), 42)
            .unwrap();
        estimator.fit(&x, &y).unwrap();

        let model = PublishedModel {
            name: "DiabetesProgressionModel".to_string(),
            family: ModelFamily::LinearRegression,
            params: BTreeMap::new(),
            estimator,
            feature_names: vec!["x".to_string()],
            metrics: RegressionMetrics { rmse: 0.0, mae: 0.0, r2: 1.0 },
            run_id: "run".to_string(),
            trained_at: "2024-01-01T00:00:00Z".to_string(),
        };
        let back = PublishedModel::from_bytes(&model.to_bytes().unwrap()).unwrap();
        assert_eq!(back, model);
        let p = back.predict_row(array![4.0].view()).unwrap();
        assert!((p - 9.0).abs() < 1e-9);
    }
}
