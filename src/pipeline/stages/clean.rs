use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::info;

use super::{Stage, StageEnv};
use crate::error::AutomlError;
use crate::pipeline::context::RunContext;

/// Fit preprocessing on the current snapshot and build the feature matrix.
pub struct Clean;

#[async_trait]
impl Stage for Clean {
    fn id(&self) -> &'static str {
        "clean"
    }

    async fn run(&self, ctx: &mut RunContext, env: &StageEnv) -> Result<()> {
        let target = ctx.require_target()?.clone();
        let frame = ctx
            .frame
            .clone()
            .ok_or_else(|| AutomlError::config("no dataset snapshot loaded"))?;
        let estimator = env.estimator.clone();
        let reduce_to = target.use_reduction.then_some(target.reduced_dimension);

        let prepared = tokio::task::spawn_blocking(move || {
            estimator.prepare(&frame, &target.target_column, target.task_type, reduce_to)
        })
        .await
        .map_err(|e| AutomlError::Collaborator(format!("preprocessing task failed: {}", e)))?
        .with_context(|| format!("preprocessing snapshot {}", ctx.lineage().head().display()))?;

        info!(
            iteration = ctx.iteration(),
            rows = prepared.n_rows(),
            features = prepared.n_features(),
            dropped_rows = prepared.dropped_rows,
            reduced = prepared.reduced,
            "Preprocessed dataset"
        );
        ctx.prepared = Some(prepared);
        Ok(())
    }
}
