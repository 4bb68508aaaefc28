use anyhow::Result;
use async_trait::async_trait;
use tracing::{info, warn};

use super::{Stage, StageEnv};
use crate::data::transform::{apply_all, Transformation};
use crate::error::AutomlError;
use crate::llm::{CallSite, Prompt};
use crate::pipeline::context::{Plan, RunContext};
use crate::pipeline::extract::extract;
use crate::pipeline::{prompts, summary};

/// Start a pass and ask for a transformation plan. On later passes the
/// critic's suggestions are offered as candidates; the oracle still decides.
pub struct ProposeFeatures;

#[async_trait]
impl Stage for ProposeFeatures {
    fn id(&self) -> &'static str {
        "propose_features"
    }

    async fn run(&self, ctx: &mut RunContext, env: &StageEnv) -> Result<()> {
        let iteration = ctx.advance_iteration();
        let target = ctx.require_target()?;
        let schema = ctx
            .schema
            .as_ref()
            .ok_or_else(|| AutomlError::config("dataset has not been profiled"))?;

        let mut user = format!(
            "Task type: {}\nTarget column: {}\n\nDataset schema:\n{}\n\n{}\n",
            target.task_type,
            target.target_column,
            schema.render(),
            summary::last_iteration(ctx.history())
        );
        if let Some(pool) = summary::candidate_pool(ctx.pending_critic_plan.as_ref()) {
            user.push('\n');
            user.push_str(&pool);
            user.push('\n');
        }
        user.push_str(
            "\nDesign generic transformations that could help this task, without assuming a specific domain.\n",
        );

        let prompt = Prompt::new(CallSite::FeatureProposal, prompts::FEATURE_SYSTEM, user);
        let response = env.ask(&prompt).await?;
        let plan: Plan = extract::<Plan>(CallSite::FeatureProposal, &response)?.truncated();

        info!(
            iteration,
            apply = plan.apply,
            proposed = plan.transformations.len(),
            rationale = %plan.rationale,
            "Feature plan"
        );
        ctx.pending_feature_plan = Some(plan);
        Ok(())
    }
}

/// Apply the pending plan to the current snapshot. A new snapshot joins the
/// lineage only when something was applied.
pub struct ApplyFeatures;

#[async_trait]
impl Stage for ApplyFeatures {
    fn id(&self) -> &'static str {
        "apply_features"
    }

    async fn run(&self, ctx: &mut RunContext, env: &StageEnv) -> Result<()> {
        let plan = ctx.pending_feature_plan.clone().unwrap_or_else(|| Plan::stop(""));
        if !plan.apply || plan.transformations.is_empty() {
            info!(iteration = ctx.iteration(), "No transformations to apply");
            ctx.last_transforms_applied = Vec::new();
            return Ok(());
        }

        let target = ctx.require_target()?.target_column.clone();
        let frame = match ctx.frame.take() {
            Some(frame) => frame,
            None => env.store.load(ctx.lineage().head()).await?,
        };
        let outcome = apply_all(&frame, &plan.transformations, &[target.as_str()]);

        if outcome.applied.is_empty() {
            warn!(
                iteration = ctx.iteration(),
                skipped = outcome.skipped.len(),
                known = ?Transformation::KINDS,
                "Every proposed transformation was skipped"
            );
            ctx.frame = Some(frame);
            ctx.last_transforms_applied = Vec::new();
            return Ok(());
        }

        let path = env
            .store
            .write(ctx.run_id(), ctx.iteration(), &outcome.frame)
            .await?;
        info!(
            iteration = ctx.iteration(),
            applied = outcome.applied.len(),
            skipped = outcome.skipped.len(),
            snapshot = %path.display(),
            "Saved augmented dataset"
        );
        ctx.push_snapshot(path);
        ctx.frame = Some(outcome.frame);
        ctx.last_transforms_applied = outcome.applied;
        Ok(())
    }
}
