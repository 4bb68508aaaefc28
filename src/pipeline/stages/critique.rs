use anyhow::Result;
use async_trait::async_trait;
use tracing::{debug, info};

use super::{Stage, StageEnv};
use crate::data::schema::Schema;
use crate::error::AutomlError;
use crate::llm::{CallSite, Prompt};
use crate::pipeline::context::{Plan, RunContext};
use crate::pipeline::extract::extract;
use crate::pipeline::{prompts, summary};

pub const MAX_ITERATIONS_NOTE: &str = " (Overridden: max iterations reached.)";

/// Ask whether another pass is warranted. At the iteration bound the
/// decision is forced to stop whatever the oracle said.
pub struct Critique;

#[async_trait]
impl Stage for Critique {
    fn id(&self) -> &'static str {
        "critique"
    }

    async fn run(&self, ctx: &mut RunContext, env: &StageEnv) -> Result<()> {
        // columns added earlier in this pass must be visible to the critic
        if let Some(frame) = &ctx.frame {
            ctx.schema = Some(Schema::profile(frame));
        }
        let target = ctx.require_target()?;
        let schema = ctx
            .schema
            .as_ref()
            .ok_or_else(|| AutomlError::config("dataset has not been profiled"))?;
        let last = ctx
            .history()
            .last()
            .ok_or_else(|| AutomlError::config("critique requires a completed pass"))?;

        let user = format!(
            "Task type: {}\nTarget column: {}\n\nDataset schema:\n{}\n\n{}\n\n\
             You are at iteration {} out of max {}.\n\
             If we are already at the maximum iteration, you MUST set apply=false.\n\
             Otherwise, only propose additional feature engineering if it is likely to improve performance.\n",
            target.task_type,
            target.target_column,
            schema.render(),
            summary::latest_results(last),
            ctx.iteration(),
            ctx.max_iterations()
        );
        let prompt = Prompt::new(CallSite::FeatureCritique, prompts::CRITIC_SYSTEM, user);
        let response = env.ask(&prompt).await?;
        let mut plan: Plan = extract::<Plan>(CallSite::FeatureCritique, &response)?.truncated();

        if ctx.at_bound() {
            if plan.apply {
                debug!(iteration = ctx.iteration(), "Overriding critic: max iterations reached");
            }
            plan.force_stop(MAX_ITERATIONS_NOTE);
        }

        info!(
            iteration = ctx.iteration(),
            apply = plan.apply,
            proposed = plan.transformations.len(),
            rationale = %plan.rationale,
            "Critic plan"
        );
        for t in &plan.transformations {
            debug!("  │ {}: {}", t.name, t.description);
        }
        ctx.pending_critic_plan = Some(plan);
        Ok(())
    }
}
