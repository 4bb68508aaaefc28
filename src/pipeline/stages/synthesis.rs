use anyhow::Result;
use async_trait::async_trait;
use tracing::{debug, info};

use super::{Stage, StageEnv};
use crate::llm::{CallSite, Oracle, Prompt};
use crate::pipeline::context::RunContext;
use crate::pipeline::{prompts, summary};

/// Phrases showing the model narrated its plan instead of answering.
const PLANNING_MARKERS: &[&str] = &[
    "Let's craft answer",
    "Let's craft the answer",
    "We need to synthesize",
    "We need to",
    "Let's outline",
];

/// Answer used when reuse is requested but there is nothing to reuse.
pub const NO_PRIOR_RESULTS: &str =
    "I don't have any previous modeling results yet; I would need to run a new analysis first.";

pub fn is_planning_leak(text: &str) -> bool {
    PLANNING_MARKERS.iter().any(|m| text.contains(m))
}

fn results_block(ctx: &RunContext) -> String {
    let (target, task) = ctx
        .target()
        .map(|t| (t.target_column.clone(), t.task_type.to_string()))
        .unwrap_or_else(|| ("unknown".to_string(), "unknown".to_string()));
    format!(
        "Target column: {}\nTask type: {}\n\nIteration history:\n{}\n",
        target,
        task,
        summary::history(ctx.history())
    )
}

/// Write the final answer from the whole history. If the first response
/// leaks planning narration it is sent back once to be rewritten.
pub struct Synthesize;

#[async_trait]
impl Stage for Synthesize {
    fn id(&self) -> &'static str {
        "synthesize"
    }

    async fn run(&self, ctx: &mut RunContext, env: &StageEnv) -> Result<()> {
        let prompt = Prompt::new(
            CallSite::Synthesis,
            prompts::SYNTHESIS_SYSTEM,
            format!("User question:\n{}\n\n{}", ctx.question(), results_block(ctx)),
        );
        let raw = env.ask(&prompt).await?;

        let answer = if is_planning_leak(&raw) {
            info!("Planning-style output detected; requesting final answer only");
            let repair = Prompt::new(
                CallSite::SynthesisRepair,
                prompts::SYNTHESIS_REPAIR_SYSTEM,
                format!(
                    "Internal notes:\n{}\n\nNow write the final Markdown answer to the original question.\n",
                    raw
                ),
            );
            env.ask(&repair).await?
        } else {
            raw
        };

        debug!(answer_len = answer.len(), "─── Final Answer ───");
        for line in answer.lines().take(20) {
            debug!("  │ {}", line);
        }
        ctx.set_final_answer(answer)?;
        Ok(())
    }
}

/// Answer from an existing run without training or touching it. A run
/// with no history yields [`NO_PRIOR_RESULTS`].
pub async fn explain(oracle: &dyn Oracle, question: &str, ctx: &RunContext) -> Result<String> {
    if ctx.history().is_empty() {
        return Ok(NO_PRIOR_RESULTS.to_string());
    }
    let prompt = Prompt::new(
        CallSite::Explain,
        prompts::EXPLAIN_SYSTEM,
        format!(
            "User question:\n{}\n\nExisting modeling results:\n{}",
            question,
            results_block(ctx)
        ),
    );
    oracle.complete(&prompt).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_planning_markers() {
        assert!(is_planning_leak("We need to explain the age effect first."));
        assert!(is_planning_leak("ok. Let's outline: 1) ..."));
        assert!(!is_planning_leak("Age and fare were the strongest predictors."));
        // case-sensitive, like the markers themselves
        assert!(!is_planning_leak("we need to"));
    }
}
