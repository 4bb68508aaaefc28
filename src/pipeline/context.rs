use std::path::PathBuf;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::data::schema::Schema;
use crate::data::transform::TransformationSpec;
use crate::data::types::Frame;
use crate::error::AutomlError;
use crate::ml::{CvScore, FeatureImportance, ModelKind, PlannedModel, Prepared, TaskType};

use super::extract::null_as_default;
use super::lineage::Lineage;

/// Transformations kept from a single proposal or critique.
pub const MAX_PLAN_TRANSFORMATIONS: usize = 3;

/// A proposal or critique decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    pub apply: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub rationale: String,
    #[serde(default, alias = "proposed_transformations", deserialize_with = "null_as_default")]
    pub transformations: Vec<TransformationSpec>,
}

impl Plan {
    pub fn stop(rationale: impl Into<String>) -> Self {
        Self {
            apply: false,
            rationale: rationale.into(),
            transformations: Vec::new(),
        }
    }

    /// Keep at most [`MAX_PLAN_TRANSFORMATIONS`].
    pub fn truncated(mut self) -> Self {
        self.transformations.truncate(MAX_PLAN_TRANSFORMATIONS);
        self
    }

    /// Force `apply=false` with no transformations, noting why.
    pub fn force_stop(&mut self, note: &str) {
        self.apply = false;
        self.transformations.clear();
        if self.rationale.is_empty() {
            self.rationale = note.trim_start().to_string();
        } else {
            self.rationale.push_str(note);
        }
    }
}

/// Target/task/reduction choice, locked once made.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TargetChoice {
    pub target_column: String,
    pub task_type: TaskType,
    pub use_reduction: bool,
    /// 0 when reduction is off.
    pub reduced_dimension: usize,
    pub rationale: String,
}

impl TargetChoice {
    /// Whether two choices agree on everything downstream stages read.
    pub fn same_decision(&self, other: &TargetChoice) -> bool {
        self.target_column == other.target_column
            && self.task_type == other.task_type
            && self.use_reduction == other.use_reduction
            && self.reduced_dimension == other.reduced_dimension
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelResult {
    pub model: ModelKind,
    pub params: Value,
    pub score: CvScore,
}

/// Importances of the best candidate refit on the full data.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureMetrics {
    pub iteration: u32,
    pub best_model: ModelKind,
    pub metric: String,
    pub mean_score: f64,
    pub importances: Vec<FeatureImportance>,
}

/// Summary of one completed pass.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IterationRecord {
    pub iteration: u32,
    pub snapshot: PathBuf,
    pub used_features: Vec<String>,
    pub transforms_applied: Vec<TransformationSpec>,
    pub model_results: Vec<ModelResult>,
    pub feature_metrics: Option<FeatureMetrics>,
}

impl IterationRecord {
    pub fn best(&self) -> Option<&ModelResult> {
        best_result(&self.model_results)
    }
}

/// Highest mean score; the first wins a tie.
pub fn best_result(results: &[ModelResult]) -> Option<&ModelResult> {
    results.iter().fold(None, |best: Option<&ModelResult>, r| match best {
        Some(b) if b.score.mean >= r.score.mean => Some(b),
        _ => Some(r),
    })
}

/// State of one workflow run, threaded through every stage by the loop
/// that owns it.
#[derive(Debug)]
pub struct RunContext {
    run_id: String,
    question: String,
    started_at: DateTime<Utc>,
    lineage: Lineage,
    target: Option<TargetChoice>,
    iteration: u32,
    max_iterations: u32,
    history: Vec<IterationRecord>,
    final_answer: Option<String>,

    /// Rebuilt from the current snapshot at the start of every pass.
    pub schema: Option<Schema>,
    pub pending_feature_plan: Option<Plan>,
    pub pending_critic_plan: Option<Plan>,
    pub last_transforms_applied: Vec<TransformationSpec>,

    // Working state of the current pass.
    pub frame: Option<Frame>,
    pub prepared: Option<Prepared>,
    pub planned_models: Vec<PlannedModel>,
}

impl RunContext {
    /// A fresh context. `max_iterations` of 0 is a configuration error.
    pub fn new(
        question: impl Into<String>,
        dataset: impl Into<PathBuf>,
        max_iterations: u32,
    ) -> Result<Self, AutomlError> {
        if max_iterations == 0 {
            return Err(AutomlError::config("max_iterations must be at least 1"));
        }
        let question = question.into();
        let started_at = Utc::now();

        let mut hasher = blake3::Hasher::new();
        hasher.update(question.as_bytes());
        hasher.update(started_at.to_rfc3339().as_bytes());
        let digest = hasher.finalize().to_hex().to_string();
        let run_id = digest[..16].to_string();

        Ok(Self {
            run_id,
            question,
            started_at,
            lineage: Lineage::seed(dataset),
            target: None,
            iteration: 0,
            max_iterations,
            history: Vec::new(),
            final_answer: None,
            schema: None,
            pending_feature_plan: None,
            pending_critic_plan: None,
            last_transforms_applied: Vec::new(),
            frame: None,
            prepared: None,
            planned_models: Vec::new(),
        })
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn question(&self) -> &str {
        &self.question
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn lineage(&self) -> &Lineage {
        &self.lineage
    }

    pub fn push_snapshot(&mut self, snapshot: PathBuf) {
        self.lineage.push(snapshot);
    }

    pub fn target(&self) -> Option<&TargetChoice> {
        self.target.as_ref()
    }

    /// Target and task, or a configuration error if selection has not run.
    pub fn require_target(&self) -> Result<&TargetChoice, AutomlError> {
        self.target
            .as_ref()
            .ok_or_else(|| AutomlError::config("target column has not been selected"))
    }

    /// Lock the target choice. Setting an identical choice again is a
    /// no-op; a different one is refused.
    pub fn set_target(&mut self, choice: TargetChoice) -> Result<(), AutomlError> {
        match &self.target {
            Some(current) if current.same_decision(&choice) => Ok(()),
            Some(current) => Err(AutomlError::config(format!(
                "target already locked to '{}' ({}), refusing '{}' ({})",
                current.target_column, current.task_type, choice.target_column, choice.task_type
            ))),
            None => {
                self.target = Some(choice);
                Ok(())
            }
        }
    }

    pub fn iteration(&self) -> u32 {
        self.iteration
    }

    pub fn max_iterations(&self) -> u32 {
        self.max_iterations
    }

    /// Start a new pass. Only feature proposal calls this.
    pub fn advance_iteration(&mut self) -> u32 {
        self.iteration += 1;
        self.iteration
    }

    pub fn at_bound(&self) -> bool {
        self.iteration >= self.max_iterations
    }

    pub fn history(&self) -> &[IterationRecord] {
        &self.history
    }

    pub fn record(&mut self, record: IterationRecord) {
        self.history.push(record);
    }

    pub fn final_answer(&self) -> Option<&str> {
        self.final_answer.as_deref()
    }

    /// Set the final answer. A second call is refused.
    pub fn set_final_answer(&mut self, answer: String) -> Result<(), AutomlError> {
        if self.final_answer.is_some() {
            return Err(AutomlError::config("final answer already set for this run"));
        }
        self.final_answer = Some(answer);
        Ok(())
    }

    /// Drop per-pass working data once the run has finished.
    pub fn release_working_state(&mut self) {
        self.frame = None;
        self.prepared = None;
        self.planned_models.clear();
    }
}
