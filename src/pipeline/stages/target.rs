use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info};

use super::{Stage, StageEnv};
use crate::error::AutomlError;
use crate::llm::{CallSite, Prompt};
use crate::ml::TaskType;
use crate::pipeline::context::{RunContext, TargetChoice};
use crate::pipeline::extract::{extract, null_as_default};
use crate::pipeline::prompts;

#[derive(Debug, Deserialize)]
struct TargetDecision {
    target_column: String,
    task_type: String,
    #[serde(default = "default_true", alias = "use_pca")]
    use_dimensionality_reduction: bool,
    #[serde(default, alias = "pca_components")]
    reduced_dimension: Option<f64>,
    #[serde(default, deserialize_with = "null_as_default")]
    rationale: String,
}

fn default_true() -> bool {
    true
}

/// Components used when reduction is requested without a size.
pub fn default_reduced_dimension(n_cols: usize) -> usize {
    n_cols.saturating_sub(1).max(5).min(20)
}

/// Choose target column, task type and reduction. Once a choice is locked
/// on the context, re-running this stage returns it unchanged without
/// consulting the oracle.
pub struct SelectTarget;

#[async_trait]
impl Stage for SelectTarget {
    fn id(&self) -> &'static str {
        "select_target"
    }

    async fn run(&self, ctx: &mut RunContext, env: &StageEnv) -> Result<()> {
        if let Some(choice) = ctx.target() {
            debug!(target = %choice.target_column, task = %choice.task_type, "Target already locked");
            return Ok(());
        }
        let schema = ctx
            .schema
            .as_ref()
            .ok_or_else(|| AutomlError::config("dataset has not been profiled"))?;

        let prompt = Prompt::new(
            CallSite::TargetSelection,
            prompts::TARGET_SYSTEM,
            format!(
                "User question:\n{}\n\nDataset schema:\n{}\n",
                ctx.question(),
                schema.render()
            ),
        );
        let response = env.ask(&prompt).await?;
        let decision: TargetDecision = extract(CallSite::TargetSelection, &response)?;

        let task_type: TaskType = decision.task_type.parse()?;
        if !schema.contains(&decision.target_column) {
            return Err(AutomlError::config(format!(
                "target column '{}' not found in dataset",
                decision.target_column
            ))
            .into());
        }
        let reduced_dimension = if decision.use_dimensionality_reduction {
            match decision.reduced_dimension {
                Some(k) if k >= 1.0 => k.round() as usize,
                _ => default_reduced_dimension(schema.n_cols),
            }
        } else {
            0
        };

        let choice = TargetChoice {
            target_column: decision.target_column,
            task_type,
            use_reduction: decision.use_dimensionality_reduction,
            reduced_dimension,
            rationale: decision.rationale,
        };
        info!(
            target = %choice.target_column,
            task = %choice.task_type,
            use_reduction = choice.use_reduction,
            reduced_dimension = choice.reduced_dimension,
            "Selected target"
        );
        ctx.set_target(choice)?;
        Ok(())
    }
}
