//! Model training and selection
//!
//! Native ndarray implementations of the regression families the trainer
//! searches over:
//! - Linear models (OLS, Ridge, Lasso, ElasticNet)
//! - Decision trees and Random Forests
//! - Gradient boosting
//! - K-Nearest Neighbors
//!
//! plus k-fold cross-validation, grid search and the trainer/selector that
//! publishes the champion.

pub mod cross_validation;
pub mod decision_tree;
pub mod gradient_boosting;
mod grid_search;
pub mod knn;
pub mod linear_models;
mod metrics;
mod models;
mod params;
pub mod random_forest;
mod trainer;

pub use cross_validation::{cross_val_score, CVResults, CVSplit, CrossValidator};
pub use decision_tree::{DecisionTreeRegressor, TreeNode};
pub use gradient_boosting::{GradientBoostingConfig, GradientBoostingRegressor};
pub use grid_search::{CandidateScore, GridSearchCV, GridSearchResult};
pub use knn::{KNNRegressor, WeightScheme};
pub use linear_models::{ElasticNetRegression, LinearRegression, RidgeRegression};
pub use metrics::{r2_score, RegressionMetrics};
pub use models::{default_model_menu, Estimator, ModelFamily, ModelSpec, PublishedModel};
pub use params::{Hyperparameters, ParamGrid, ParamValue};
pub use random_forest::RandomForestRegressor;
pub use trainer::{select_champion, FamilyOutcome, ModelTrainer, TrainingReport};
