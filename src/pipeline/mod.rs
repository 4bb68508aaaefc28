//! Iterative refinement loop: profile, select target, then repeated passes
//! of propose, apply, clean, plan, train and critique until the critic
//! stops or the iteration bound is reached, then synthesis.

pub mod context;
pub mod extract;
pub mod lineage;
pub mod prompts;
pub mod stages;
pub mod summary;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{debug, info};

use crate::data::SnapshotStore;
use crate::llm::Oracle;
use crate::ml::Estimator;

use context::RunContext;
use stages::{
    ApplyFeatures, Clean, Critique, PlanModels, Profile, ProposeFeatures, SelectTarget, Stage,
    StageEnv, Synthesize, Train,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopDecision {
    Continue,
    Stop,
}

/// Continue iff the bound has not been reached and the critic asked for
/// another pass.
pub fn should_continue(ctx: &RunContext) -> LoopDecision {
    let wants_more = ctx
        .pending_critic_plan
        .as_ref()
        .map(|p| p.apply)
        .unwrap_or(false);
    if ctx.iteration() < ctx.max_iterations() && wants_more {
        LoopDecision::Continue
    } else {
        LoopDecision::Stop
    }
}

pub struct RefinementLoop {
    env: StageEnv,
    /// Runs once per run, before the first pass.
    setup: Vec<Box<dyn Stage>>,
    /// One pass; every stage in order.
    pass: Vec<Box<dyn Stage>>,
    finish: Box<dyn Stage>,
}

impl RefinementLoop {
    pub fn new(
        oracle: Arc<dyn Oracle>,
        estimator: Arc<dyn Estimator>,
        store: Arc<SnapshotStore>,
    ) -> Self {
        Self {
            env: StageEnv {
                oracle,
                estimator,
                store,
            },
            setup: vec![Box::new(Profile), Box::new(SelectTarget)],
            pass: vec![
                Box::new(ProposeFeatures),
                Box::new(ApplyFeatures),
                Box::new(Clean),
                Box::new(PlanModels),
                Box::new(Train),
                Box::new(Critique),
            ],
            finish: Box::new(Synthesize),
        }
    }

    pub fn env(&self) -> &StageEnv {
        &self.env
    }

    async fn run_stage(&self, stage: &dyn Stage, ctx: &mut RunContext) -> Result<()> {
        debug!(stage = stage.id(), iteration = ctx.iteration(), "Stage start");
        stage
            .run(ctx, &self.env)
            .await
            .with_context(|| format!("stage {} failed", stage.id()))
    }

    /// Run to completion and return the final context. The dataset is
    /// loaded before any stage runs.
    pub async fn run(
        &self,
        question: &str,
        dataset: &Path,
        max_iterations: u32,
    ) -> Result<RunContext> {
        let mut ctx = RunContext::new(question, dataset, max_iterations)?;
        ctx.frame = Some(self.env.store.load(dataset).await?);
        info!(
            run_id = ctx.run_id(),
            dataset = %dataset.display(),
            max_iterations,
            "Starting refinement loop"
        );

        for stage in &self.setup {
            self.run_stage(stage.as_ref(), &mut ctx).await?;
        }

        loop {
            if ctx.iteration() > 0 {
                // schema must reflect columns engineered in earlier passes
                self.run_stage(&Profile, &mut ctx).await?;
            }
            for stage in &self.pass {
                self.run_stage(stage.as_ref(), &mut ctx).await?;
            }
            let decision = should_continue(&ctx);
            info!(iteration = ctx.iteration(), ?decision, "Loop decision");
            if decision == LoopDecision::Stop {
                break;
            }
        }

        self.run_stage(self.finish.as_ref(), &mut ctx).await?;
        ctx.release_working_state();
        info!(
            run_id = ctx.run_id(),
            passes = ctx.history().len(),
            snapshots = ctx.lineage().len(),
            "Refinement loop finished"
        );
        Ok(ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::types::Frame;
    use crate::error::{category, AutomlError};
    use crate::llm::CallSite;
    use crate::ml::ModelKind;
    use crate::testing::{
        refinement_loop, write_fixture, ScriptedOracle, PLAN_MORE, PLAN_STOP, TARGET_LABEL,
    };
    use context::Plan;
    use stages::critique::MAX_ITERATIONS_NOTE;

    fn ctx_with_critic(iteration: u32, max: u32, apply: bool) -> RunContext {
        let mut ctx = RunContext::new("q", "d.csv", max).unwrap();
        for _ in 0..iteration {
            ctx.advance_iteration();
        }
        ctx.pending_critic_plan = Some(Plan {
            apply,
            rationale: String::new(),
            transformations: vec![],
        });
        ctx
    }

    #[test]
    fn test_should_continue() {
        assert_eq!(should_continue(&ctx_with_critic(1, 3, true)), LoopDecision::Continue);
        assert_eq!(should_continue(&ctx_with_critic(1, 3, false)), LoopDecision::Stop);
        assert_eq!(should_continue(&ctx_with_critic(3, 3, true)), LoopDecision::Stop);
        let fresh = RunContext::new("q", "d.csv", 3).unwrap();
        assert_eq!(should_continue(&fresh), LoopDecision::Stop);
    }

    #[tokio::test]
    async fn test_single_pass_without_transformations() {
        let dir = tempfile::tempdir().unwrap();
        let dataset = write_fixture(dir.path());
        let snapshots = dir.path().join("snaps");
        let oracle = ScriptedOracle::new()
            .push(CallSite::TargetSelection, TARGET_LABEL)
            .push(CallSite::FeatureProposal, PLAN_STOP)
            .push(CallSite::FeatureCritique, PLAN_MORE)
            .push(CallSite::Synthesis, "x1 drives the label.");

        let ctx = refinement_loop(&oracle, &snapshots)
            .run("What drives the label?", &dataset, 1)
            .await
            .unwrap();

        assert_eq!(ctx.iteration(), 1);
        assert_eq!(ctx.history().len(), 1);
        assert_eq!(ctx.lineage().len(), 1);
        assert_eq!(ctx.lineage().head(), dataset.as_path());
        assert!(!snapshots.exists());
        assert!(ctx.history()[0].transforms_applied.is_empty());
        assert_eq!(ctx.history()[0].model_results.len(), 3);
        assert!(ctx.history()[0].feature_metrics.is_some());
        assert_eq!(ctx.final_answer(), Some("x1 drives the label."));

        // bound reached on the first pass: critic forced to stop
        let critic = ctx.pending_critic_plan.as_ref().unwrap();
        assert!(!critic.apply);
        assert!(critic.transformations.is_empty());
        assert!(critic.rationale.ends_with(MAX_ITERATIONS_NOTE));
    }

    #[tokio::test]
    async fn test_critic_always_continuing_stops_at_bound() {
        let dir = tempfile::tempdir().unwrap();
        let dataset = write_fixture(dir.path());
        let oracle = ScriptedOracle::new()
            .push(CallSite::TargetSelection, TARGET_LABEL)
            .always(CallSite::FeatureProposal, PLAN_MORE)
            .always(CallSite::FeatureCritique, PLAN_MORE)
            .push(CallSite::Synthesis, "done");

        let ctx = refinement_loop(&oracle, &dir.path().join("snaps"))
            .run("What drives the label?", &dataset, 3)
            .await
            .unwrap();

        assert_eq!(ctx.iteration(), 3);
        assert_eq!(ctx.history().len(), 3);
        let iterations: Vec<u32> = ctx.history().iter().map(|r| r.iteration).collect();
        assert_eq!(iterations, vec![1, 2, 3]);
        assert_eq!(oracle.calls(CallSite::TargetSelection), 1);
        assert_eq!(oracle.calls(CallSite::FeatureProposal), 3);
        assert_eq!(oracle.calls(CallSite::FeatureCritique), 3);

        let critic = ctx.pending_critic_plan.as_ref().unwrap();
        assert!(!critic.apply);
        assert!(critic.transformations.is_empty());
        assert_eq!(critic.rationale, format!("try a sum{}", MAX_ITERATIONS_NOTE));

        // one new snapshot per applying pass, each record pointing at the head of its pass
        assert_eq!(ctx.lineage().len(), 4);
        let lineage: Vec<_> = ctx.lineage().iter().map(|p| p.to_path_buf()).collect();
        for (i, record) in ctx.history().iter().enumerate() {
            assert_eq!(record.snapshot, lineage[i + 1]);
            assert_eq!(record.transforms_applied.len(), 1);
            assert!(record.used_features.contains(&"x_sum".to_string()));
        }

        // later proposals see the critic's suggestions
        let proposals = oracle.prompts(CallSite::FeatureProposal);
        assert!(!proposals[0].contains("candidate transformations"));
        assert!(proposals[1].contains("candidate transformations"));
        assert!(proposals[1].contains("x_sum"));
    }

    #[tokio::test]
    async fn test_unknown_transformation_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let dataset = write_fixture(dir.path());
        let plan = r#"{"apply": true, "rationale": "mixed", "transformations": [
            {"name": "add_missing_indicator", "params": {"source_column": "x2", "target_column": "x2_missing"}},
            {"name": "polynomial_features", "params": {"degree": 2}}
        ]}"#;
        let oracle = ScriptedOracle::new()
            .push(CallSite::TargetSelection, TARGET_LABEL)
            .push(CallSite::FeatureProposal, plan)
            .push(CallSite::FeatureCritique, PLAN_STOP)
            .push(CallSite::Synthesis, "done");

        let ctx = refinement_loop(&oracle, &dir.path().join("snaps"))
            .run("q", &dataset, 2)
            .await
            .unwrap();

        assert_eq!(ctx.history().len(), 1);
        let applied = &ctx.history()[0].transforms_applied;
        assert_eq!(applied.len(), 1);
        assert_eq!(applied[0].name, "add_missing_indicator");
        assert_eq!(ctx.lineage().len(), 2);
    }

    #[tokio::test]
    async fn test_unparseable_critique_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let dataset = write_fixture(dir.path());
        let oracle = ScriptedOracle::new()
            .push(CallSite::TargetSelection, TARGET_LABEL)
            .push(CallSite::FeatureProposal, PLAN_STOP)
            .push(CallSite::FeatureCritique, "I think one more round would help.");

        let err = refinement_loop(&oracle, &dir.path().join("snaps"))
            .run("q", &dataset, 3)
            .await
            .unwrap_err();

        assert!(matches!(category(&err), Some(AutomlError::Payload { .. })));
        assert_eq!(oracle.calls(CallSite::Synthesis), 0);
    }

    #[tokio::test]
    async fn test_unknown_target_column_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let dataset = write_fixture(dir.path());
        let oracle = ScriptedOracle::new().push(
            CallSite::TargetSelection,
            r#"{"target_column": "price", "task_type": "regression", "use_dimensionality_reduction": false}"#,
        );

        let err = refinement_loop(&oracle, &dir.path().join("snaps"))
            .run("q", &dataset, 2)
            .await
            .unwrap_err();
        assert!(matches!(category(&err), Some(AutomlError::Config(_))));
        assert_eq!(oracle.calls(CallSite::FeatureProposal), 0);
    }

    #[tokio::test]
    async fn test_unknown_task_type_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let dataset = write_fixture(dir.path());
        let oracle = ScriptedOracle::new().push(
            CallSite::TargetSelection,
            r#"{"target_column": "label", "task_type": "ranking"}"#,
        );

        let err = refinement_loop(&oracle, &dir.path().join("snaps"))
            .run("q", &dataset, 2)
            .await
            .unwrap_err();
        assert!(matches!(category(&err), Some(AutomlError::Config(_))));
    }

    #[tokio::test]
    async fn test_missing_dataset_fails_before_any_stage() {
        let dir = tempfile::tempdir().unwrap();
        let oracle = ScriptedOracle::new();

        let err = refinement_loop(&oracle, dir.path())
            .run("q", &dir.path().join("absent.csv"), 2)
            .await
            .unwrap_err();
        assert!(matches!(category(&err), Some(AutomlError::Resource(_))));
        assert_eq!(oracle.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_zero_iterations_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let dataset = write_fixture(dir.path());
        let oracle = ScriptedOracle::new();
        let err = refinement_loop(&oracle, dir.path())
            .run("q", &dataset, 0)
            .await
            .unwrap_err();
        assert!(matches!(category(&err), Some(AutomlError::Config(_))));
    }

    #[tokio::test]
    async fn test_target_selection_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let dataset = write_fixture(dir.path());
        let oracle = ScriptedOracle::new().always(CallSite::TargetSelection, TARGET_LABEL);
        let lp = refinement_loop(&oracle, dir.path());

        let mut ctx = RunContext::new("q", &dataset, 2).unwrap();
        lp.run_stage(&Profile, &mut ctx).await.unwrap();
        lp.run_stage(&SelectTarget, &mut ctx).await.unwrap();
        let first = ctx.target().cloned().unwrap();
        lp.run_stage(&Profile, &mut ctx).await.unwrap();
        lp.run_stage(&SelectTarget, &mut ctx).await.unwrap();

        assert_eq!(ctx.target(), Some(&first));
        assert_eq!(oracle.calls(CallSite::TargetSelection), 1);
    }

    #[tokio::test]
    async fn test_reduction_default_and_no_importances() {
        let dir = tempfile::tempdir().unwrap();
        let dataset = write_fixture(dir.path());
        let oracle = ScriptedOracle::new()
            .push(
                CallSite::TargetSelection,
                r#"{"target_column": "label", "task_type": "classification", "use_pca": true}"#,
            )
            .push(CallSite::FeatureProposal, PLAN_STOP)
            .push(CallSite::FeatureCritique, PLAN_STOP)
            .push(CallSite::Synthesis, "done");

        let ctx = refinement_loop(&oracle, dir.path())
            .run("predict the label", &dataset, 2)
            .await
            .unwrap();

        let target = ctx.target().unwrap();
        assert!(target.use_reduction);
        assert_eq!(target.reduced_dimension, 5);
        assert!(ctx.history()[0].feature_metrics.is_none());
    }

    #[tokio::test]
    async fn test_planning_leak_triggers_repair() {
        let dir = tempfile::tempdir().unwrap();
        let dataset = write_fixture(dir.path());
        let oracle = ScriptedOracle::new()
            .push(CallSite::TargetSelection, TARGET_LABEL)
            .push(CallSite::FeatureProposal, PLAN_STOP)
            .push(CallSite::FeatureCritique, PLAN_STOP)
            .push(CallSite::Synthesis, "We need to mention x1. Let's outline.")
            .push(CallSite::SynthesisRepair, "x1 matters most.");

        let ctx = refinement_loop(&oracle, dir.path())
            .run("q", &dataset, 1)
            .await
            .unwrap();
        assert_eq!(ctx.final_answer(), Some("x1 matters most."));
        assert_eq!(oracle.calls(CallSite::SynthesisRepair), 1);
    }

    #[tokio::test]
    async fn test_regression_run_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let dataset = write_fixture(dir.path());
        let oracle = ScriptedOracle::new()
            .push(
                CallSite::TargetSelection,
                r#"{"target_column": "x1", "task_type": "regression", "use_dimensionality_reduction": false, "rationale": null}"#,
            )
            .push(CallSite::FeatureProposal, PLAN_STOP)
            .push(CallSite::FeatureCritique, PLAN_STOP)
            .push(CallSite::Synthesis, "x2 explains little of x1.");

        let ctx = refinement_loop(&oracle, &dir.path().join("snaps"))
            .run("How well can x1 be predicted?", &dataset, 2)
            .await
            .unwrap();

        let target = ctx.target().unwrap();
        assert_eq!(target.target_column, "x1");
        assert_eq!(target.task_type, crate::ml::TaskType::Regression);
        assert_eq!(ctx.history().len(), 1);

        let record = &ctx.history()[0];
        let kinds: Vec<ModelKind> = record.model_results.iter().map(|r| r.model).collect();
        assert_eq!(
            kinds,
            vec![
                ModelKind::LinearRegression,
                ModelKind::DecisionTreeRegressor,
                ModelKind::MlpRegressor
            ]
        );
        assert!(record.model_results.iter().all(|r| r.score.metric == "r2"));
        assert_eq!(record.used_features, vec!["x2", "label"]);

        let metrics = record.feature_metrics.as_ref().unwrap();
        assert_eq!(metrics.best_model, ModelKind::LinearRegression);
        assert_eq!(metrics.metric, "r2");
        assert_eq!(metrics.importances[0].feature, "x2");
        assert_eq!(ctx.final_answer(), Some("x2 explains little of x1."));

        let synthesis = &oracle.prompts(CallSite::Synthesis)[0];
        assert!(synthesis.contains("Task type: regression"));
        assert!(synthesis.contains("linear_regression: mean="));
    }

    #[tokio::test]
    async fn test_transformation_cannot_overwrite_target() {
        let dir = tempfile::tempdir().unwrap();
        let dataset = write_fixture(dir.path());
        let plan = r#"{"apply": true, "rationale": "prefixes", "transformations": [
            {"name": "text_prefix", "params": {"source_column": "x1", "target_column": "label"}},
            {"name": "text_prefix", "params": {"source_column": "x1", "target_column": "x1_first"}}
        ]}"#;
        let oracle = ScriptedOracle::new()
            .push(CallSite::TargetSelection, TARGET_LABEL)
            .push(CallSite::FeatureProposal, plan)
            .push(CallSite::FeatureCritique, PLAN_STOP)
            .push(CallSite::Synthesis, "done");

        let ctx = refinement_loop(&oracle, &dir.path().join("snaps"))
            .run("q", &dataset, 2)
            .await
            .unwrap();

        let applied = &ctx.history()[0].transforms_applied;
        assert_eq!(applied.len(), 1);
        assert_eq!(applied[0].params["target_column"], "x1_first");

        let snapshot = Frame::from_csv_reader(std::fs::File::open(ctx.lineage().head()).unwrap()).unwrap();
        let seed = Frame::from_csv_reader(std::fs::File::open(&dataset).unwrap()).unwrap();
        assert_eq!(snapshot.column("label"), seed.column("label"));
        assert!(snapshot.column("x1_first").is_some());
    }

    #[tokio::test]
    async fn test_critic_sees_columns_added_this_pass() {
        let dir = tempfile::tempdir().unwrap();
        let dataset = write_fixture(dir.path());
        let oracle = ScriptedOracle::new()
            .push(CallSite::TargetSelection, TARGET_LABEL)
            .push(CallSite::FeatureProposal, PLAN_MORE)
            .push(CallSite::FeatureCritique, PLAN_STOP)
            .push(CallSite::Synthesis, "done");

        refinement_loop(&oracle, &dir.path().join("snaps"))
            .run("q", &dataset, 2)
            .await
            .unwrap();

        let proposal = &oracle.prompts(CallSite::FeatureProposal)[0];
        assert!(!proposal.contains("- x_sum:"));
        let critique = &oracle.prompts(CallSite::FeatureCritique)[0];
        assert!(critique.contains("- x_sum: type=numeric"));
    }
}
