//! Estimator collaborator: fits candidate models with cross-validated
//! scoring and ranks feature importances.

pub mod inputs;
pub mod sklearn;

use std::fmt;
use std::str::FromStr;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use crate::data::types::Frame;
use crate::error::AutomlError;

pub use inputs::{ModelInputs, Prepared, Target};
pub use sklearn::SklearnEstimator;

pub const DEFAULT_FOLDS: usize = 3;
pub const DEFAULT_SEED: u64 = 42;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskType {
    Classification,
    Regression,
}

impl TaskType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskType::Classification => "classification",
            TaskType::Regression => "regression",
        }
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskType {
    type Err = AutomlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "classification" => Ok(TaskType::Classification),
            "regression" => Ok(TaskType::Regression),
            other => Err(AutomlError::config(format!("unknown task type '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    LogisticRegression,
    #[serde(rename = "decision_tree_clf")]
    DecisionTreeClassifier,
    MlpClassifier,
    LinearRegression,
    #[serde(rename = "decision_tree_reg")]
    DecisionTreeRegressor,
    MlpRegressor,
}

impl ModelKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelKind::LogisticRegression => "logistic_regression",
            ModelKind::DecisionTreeClassifier => "decision_tree_clf",
            ModelKind::MlpClassifier => "mlp_classifier",
            ModelKind::LinearRegression => "linear_regression",
            ModelKind::DecisionTreeRegressor => "decision_tree_reg",
            ModelKind::MlpRegressor => "mlp_regressor",
        }
    }

    pub fn task(&self) -> TaskType {
        match self {
            ModelKind::LogisticRegression
            | ModelKind::DecisionTreeClassifier
            | ModelKind::MlpClassifier => TaskType::Classification,
            ModelKind::LinearRegression
            | ModelKind::DecisionTreeRegressor
            | ModelKind::MlpRegressor => TaskType::Regression,
        }
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModelKind {
    type Err = AutomlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "logistic_regression" => Ok(ModelKind::LogisticRegression),
            "decision_tree_clf" => Ok(ModelKind::DecisionTreeClassifier),
            "mlp_classifier" => Ok(ModelKind::MlpClassifier),
            "linear_regression" => Ok(ModelKind::LinearRegression),
            "decision_tree_reg" => Ok(ModelKind::DecisionTreeRegressor),
            "mlp_regressor" => Ok(ModelKind::MlpRegressor),
            other => Err(AutomlError::config(format!("unknown estimator kind '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    Accuracy,
    R2,
}

impl Metric {
    pub fn for_task(task: TaskType) -> Self {
        match task {
            TaskType::Classification => Metric::Accuracy,
            TaskType::Regression => Metric::R2,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Metric::Accuracy => "accuracy",
            Metric::R2 => "r2",
        }
    }
}

/// Shuffled k-fold splitting, stratified by class for classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CvStrategy {
    pub n_splits: usize,
    pub seed: u64,
    pub stratified: bool,
    pub metric: Metric,
}

impl CvStrategy {
    pub fn for_task(task: TaskType) -> Self {
        Self {
            n_splits: DEFAULT_FOLDS,
            seed: DEFAULT_SEED,
            stratified: task == TaskType::Classification,
            metric: Metric::for_task(task),
        }
    }

    /// Fewer rows than folds is a configuration error.
    pub fn check_rows(&self, rows: usize) -> Result<(), AutomlError> {
        if rows < self.n_splits {
            return Err(AutomlError::config(format!(
                "{} rows is too few for {}-fold cross-validation",
                rows, self.n_splits
            )));
        }
        Ok(())
    }
}

/// Cross-validated score of one candidate.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CvScore {
    pub mean: f64,
    pub std: f64,
    pub scores: Vec<f64>,
    pub metric: String,
}

impl CvScore {
    /// Mean and population standard deviation of per-fold scores.
    pub fn from_folds(scores: Vec<f64>, metric: Metric) -> Self {
        let n = scores.len().max(1) as f64;
        let mean = scores.iter().sum::<f64>() / n;
        let std = (scores.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / n).sqrt();
        Self {
            mean,
            std,
            scores,
            metric: metric.as_str().to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureImportance {
    pub feature: String,
    pub importance: f64,
    pub importance_norm: f64,
}

/// Pair raw importances with feature names, normalise to sum 1 and sort
/// descending.
pub fn rank_importances(names: &[String], raw: &[f64]) -> Vec<FeatureImportance> {
    let total: f64 = raw.iter().sum();
    let mut ranked: Vec<FeatureImportance> = names
        .iter()
        .zip(raw)
        .map(|(feature, &importance)| FeatureImportance {
            feature: feature.clone(),
            importance,
            importance_norm: if total > 0.0 { importance / total } else { 0.0 },
        })
        .collect();
    ranked.sort_by(|a, b| b.importance.total_cmp(&a.importance));
    ranked
}

/// A candidate estimator kind with its fixed parameters.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlannedModel {
    pub kind: ModelKind,
    pub params: Value,
}

/// The fixed candidate set for a task type.
pub fn plan_models(task: TaskType) -> Vec<PlannedModel> {
    let plan = match task {
        TaskType::Classification => vec![
            (ModelKind::LogisticRegression, json!({"max_iter": 10000})),
            (ModelKind::DecisionTreeClassifier, json!({"max_depth": 5})),
            (
                ModelKind::MlpClassifier,
                json!({"hidden_layer_sizes": [64], "max_iter": 10000}),
            ),
        ],
        TaskType::Regression => vec![
            (ModelKind::LinearRegression, json!({})),
            (ModelKind::DecisionTreeRegressor, json!({"max_depth": 5})),
            (
                ModelKind::MlpRegressor,
                json!({"hidden_layer_sizes": [64], "max_iter": 35}),
            ),
        ],
    };
    plan.into_iter()
        .map(|(kind, params)| PlannedModel { kind, params })
        .collect()
}

/// Trainable-estimator abstraction. Calls are blocking.
pub trait Estimator: Send + Sync {
    /// Fit preprocessing (imputation, encoding, scaling, optional reduction
    /// to `reduce_to` components) on `frame` and build the model inputs.
    fn prepare(
        &self,
        frame: &Frame,
        target_column: &str,
        task: TaskType,
        reduce_to: Option<usize>,
    ) -> Result<Prepared>;

    fn fit_and_score(
        &self,
        model: &PlannedModel,
        data: &Prepared,
        cv: &CvStrategy,
    ) -> Result<CvScore>;

    /// Fit on every row of `data`.
    fn fit(&self, model: &PlannedModel, data: &Prepared) -> Result<Box<dyn FittedModel>>;

    /// Ranked importances; empty when the model defines none.
    fn importances(&self, fitted: &dyn FittedModel, names: &[String]) -> Result<Vec<FeatureImportance>> {
        match fitted.raw_importances()? {
            Some(raw) => Ok(rank_importances(names, &raw)),
            None => {
                debug!(model = %fitted.kind(), "model defines no importances");
                Ok(Vec::new())
            }
        }
    }
}

/// A trained candidate.
pub trait FittedModel: Send + Sync {
    fn kind(&self) -> ModelKind;

    /// Per-column importance, or `None` when the model defines none.
    fn raw_importances(&self) -> Result<Option<Vec<f64>>>;
}
