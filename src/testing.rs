//! Test doubles and fixtures shared by unit tests.

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use crate::data::types::{ColumnData, Frame};
use crate::data::SnapshotStore;
use crate::llm::{CallSite, Oracle, Prompt};
use crate::ml::{
    CvScore, CvStrategy, Estimator, FittedModel, ModelInputs, ModelKind, PlannedModel, Prepared,
    TaskType,
};
use crate::pipeline::RefinementLoop;
use crate::state::{RunnerConfig, Session};

pub const TARGET_LABEL: &str = r#"{"target_column": "label", "task_type": "classification", "use_dimensionality_reduction": false, "reduced_dimension": null, "rationale": "binary outcome"}"#;
pub const PLAN_STOP: &str = r#"{"apply": false, "rationale": "nothing to add", "transformations": []}"#;
pub const PLAN_MORE: &str = r#"Here you go: {"apply": true, "rationale": "try a sum", "transformations": [{"name": "numeric_sum", "description": "x1 + x2", "params": {"source_columns": ["x1", "x2"], "target_column": "x_sum"}}]}"#;

#[derive(Default)]
struct Script {
    queued: HashMap<CallSite, VecDeque<String>>,
    fallback: HashMap<CallSite, String>,
    calls: HashMap<CallSite, usize>,
    prompts: Vec<Prompt>,
}

/// Oracle answering from per-call-site queues. When a queue runs dry the
/// site's fallback answers; with neither, the call fails.
#[derive(Default, Clone)]
pub struct ScriptedOracle {
    script: Arc<Mutex<Script>>,
}

impl ScriptedOracle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(self, site: CallSite, response: impl Into<String>) -> Self {
        self.script
            .lock()
            .unwrap()
            .queued
            .entry(site)
            .or_default()
            .push_back(response.into());
        self
    }

    pub fn always(self, site: CallSite, response: impl Into<String>) -> Self {
        self.script
            .lock()
            .unwrap()
            .fallback
            .insert(site, response.into());
        self
    }

    pub fn calls(&self, site: CallSite) -> usize {
        self.script
            .lock()
            .unwrap()
            .calls
            .get(&site)
            .copied()
            .unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.script.lock().unwrap().calls.values().sum()
    }

    /// User parts of every prompt sent for `site`, in order.
    pub fn prompts(&self, site: CallSite) -> Vec<String> {
        self.script
            .lock()
            .unwrap()
            .prompts
            .iter()
            .filter(|p| p.site == site)
            .map(|p| p.user.clone())
            .collect()
    }
}

#[async_trait]
impl Oracle for ScriptedOracle {
    async fn complete(&self, prompt: &Prompt) -> Result<String> {
        let mut script = self.script.lock().unwrap();
        *script.calls.entry(prompt.site).or_default() += 1;
        script.prompts.push(prompt.clone());
        if let Some(next) = script.queued.get_mut(&prompt.site).and_then(|q| q.pop_front()) {
            return Ok(next);
        }
        script
            .fallback
            .get(&prompt.site)
            .cloned()
            .ok_or_else(|| anyhow!("no scripted response for {}", prompt.site))
    }
}

/// Deterministic estimator for loop tests. Numeric columns pass through
/// unscaled (missing as 0), categorical columns are left out, and reduction
/// keeps the first `k` columns. Scores depend only on the model kind and
/// the feature count; importances follow column order and are empty for
/// perceptrons.
#[derive(Debug, Default, Clone, Copy)]
pub struct StubEstimator;

impl Estimator for StubEstimator {
    fn prepare(
        &self,
        frame: &Frame,
        target_column: &str,
        task: TaskType,
        reduce_to: Option<usize>,
    ) -> Result<Prepared> {
        let inputs = ModelInputs::from_frame(frame, target_column, task)?;
        let numeric: Vec<(&str, &Vec<Option<f64>>)> = inputs
            .features
            .iter()
            .filter_map(|c| match &c.data {
                ColumnData::Numeric(v) => Some((c.name.as_str(), v)),
                ColumnData::Text(_) => None,
            })
            .collect();
        let keep = reduce_to.filter(|&k| k > 0).map_or(numeric.len(), |k| k.min(numeric.len()));
        let x = (0..inputs.target.len())
            .map(|i| numeric[..keep].iter().map(|(_, v)| v[i].unwrap_or(0.0)).collect())
            .collect();
        let feature_names = match reduce_to {
            Some(_) => (1..=keep).map(|i| format!("pc{}", i)).collect(),
            None => numeric[..keep].iter().map(|(n, _)| n.to_string()).collect(),
        };
        Ok(Prepared {
            x,
            used_features: inputs.used_features(),
            y: inputs.target,
            feature_names,
            reduced: reduce_to.is_some(),
            dropped_rows: inputs.dropped_rows,
        })
    }

    fn fit_and_score(&self, model: &PlannedModel, data: &Prepared, cv: &CvStrategy) -> Result<CvScore> {
        cv.check_rows(data.n_rows())?;
        let base = match model.kind {
            ModelKind::LogisticRegression | ModelKind::LinearRegression => 0.80,
            ModelKind::DecisionTreeClassifier | ModelKind::DecisionTreeRegressor => 0.75,
            ModelKind::MlpClassifier | ModelKind::MlpRegressor => 0.70,
        };
        let mean = base + 0.01 * data.n_features() as f64;
        Ok(CvScore::from_folds(vec![mean - 0.02, mean, mean + 0.02], cv.metric))
    }

    fn fit(&self, model: &PlannedModel, data: &Prepared) -> Result<Box<dyn FittedModel>> {
        Ok(Box::new(StubModel {
            kind: model.kind,
            n_features: data.n_features(),
        }))
    }
}

struct StubModel {
    kind: ModelKind,
    n_features: usize,
}

impl FittedModel for StubModel {
    fn kind(&self) -> ModelKind {
        self.kind
    }

    fn raw_importances(&self) -> Result<Option<Vec<f64>>> {
        if matches!(self.kind, ModelKind::MlpClassifier | ModelKind::MlpRegressor) {
            return Ok(None);
        }
        Ok(Some((0..self.n_features).map(|i| (self.n_features - i) as f64).collect()))
    }
}

/// Two numeric features and a yes/no label, 30 rows.
pub fn write_fixture(dir: &Path) -> PathBuf {
    let mut csv = String::from("x1,x2,label\n");
    for i in 0..30 {
        let x1 = i as f64;
        let x2 = ((i * 7) % 11) as f64;
        let label = if x1 + 0.3 * x2 > 16.0 { "yes" } else { "no" };
        csv.push_str(&format!("{},{},{}\n", x1, x2, label));
    }
    let path = dir.join("fixture.csv");
    std::fs::write(&path, csv).unwrap();
    path
}

pub fn refinement_loop(oracle: &ScriptedOracle, temp_dir: &Path) -> RefinementLoop {
    RefinementLoop::new(
        Arc::new(oracle.clone()),
        Arc::new(StubEstimator),
        Arc::new(SnapshotStore::new(temp_dir)),
    )
}

/// Shell session over the fixture dataset with `max_iterations` 3.
pub fn session_with(oracle: ScriptedOracle, dir: &Path) -> Session {
    let config = RunnerConfig {
        dataset: write_fixture(dir),
        max_iterations: 3,
        temp_dir: dir.join("snaps"),
    };
    Session::new(Arc::new(oracle), Arc::new(StubEstimator), config)
}

pub fn session(dir: &Path) -> Session {
    session_with(ScriptedOracle::new(), dir)
}
