use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::{debug, info};

use super::{Stage, StageEnv};
use crate::error::AutomlError;
use crate::ml::{plan_models, CvStrategy, PlannedModel};
use crate::pipeline::context::{
    best_result, FeatureMetrics, IterationRecord, ModelResult, RunContext,
};

/// Pick the candidate estimators for the task type.
pub struct PlanModels;

#[async_trait]
impl Stage for PlanModels {
    fn id(&self) -> &'static str {
        "plan_models"
    }

    async fn run(&self, ctx: &mut RunContext, _env: &StageEnv) -> Result<()> {
        let task = ctx.require_target()?.task_type;
        ctx.planned_models = plan_models(task);
        debug!(
            task = %task,
            models = ?ctx.planned_models.iter().map(|m| m.kind.as_str()).collect::<Vec<_>>(),
            "Planned models"
        );
        Ok(())
    }
}

/// Cross-validate every planned candidate, refit the best on the full data
/// for importances unless the features were reduced, and record the pass.
pub struct Train;

#[async_trait]
impl Stage for Train {
    fn id(&self) -> &'static str {
        "train"
    }

    async fn run(&self, ctx: &mut RunContext, env: &StageEnv) -> Result<()> {
        let task = ctx.require_target()?.task_type;
        let prepared = ctx
            .prepared
            .clone()
            .ok_or_else(|| AutomlError::config("no preprocessed data for training"))?;
        let planned = ctx.planned_models.clone();
        if planned.is_empty() {
            return Err(AutomlError::config("no candidate models planned").into());
        }
        let iteration = ctx.iteration();
        let estimator = env.estimator.clone();
        let used_features = prepared.used_features.clone();

        // Fitting is CPU-bound and blocking.
        let (model_results, feature_metrics) = tokio::task::spawn_blocking(
            move || -> Result<(Vec<ModelResult>, Option<FeatureMetrics>)> {
                let cv = CvStrategy::for_task(task);
                let mut results = Vec::with_capacity(planned.len());
                for candidate in &planned {
                    let score = estimator
                        .fit_and_score(candidate, &prepared, &cv)
                        .with_context(|| format!("scoring {}", candidate.kind))?;
                    results.push(ModelResult {
                        model: candidate.kind,
                        params: candidate.params.clone(),
                        score,
                    });
                }

                let metrics = match best_result(&results) {
                    Some(best) if !prepared.reduced => {
                        let candidate = PlannedModel {
                            kind: best.model,
                            params: best.params.clone(),
                        };
                        let fitted = estimator
                            .fit(&candidate, &prepared)
                            .with_context(|| format!("refitting {}", best.model))?;
                        let importances = estimator
                            .importances(fitted.as_ref(), &prepared.feature_names)
                            .with_context(|| format!("ranking importances of {}", best.model))?;
                        Some(FeatureMetrics {
                            iteration,
                            best_model: best.model,
                            metric: best.score.metric.clone(),
                            mean_score: best.score.mean,
                            importances,
                        })
                    }
                    _ => None,
                };
                Ok((results, metrics))
            },
        )
        .await
        .map_err(|e| AutomlError::Collaborator(format!("training task failed: {}", e)))??;

        for r in &model_results {
            info!(
                iteration,
                model = %r.model,
                metric = %r.score.metric,
                mean = r.score.mean,
                std = r.score.std,
                "Model scored"
            );
        }
        match &feature_metrics {
            Some(m) => {
                info!(iteration, best = %m.best_model, "Feature importances computed");
                for fi in m.importances.iter().take(10) {
                    debug!("  │ {}: importance={:.4}, norm={:.4}", fi.feature, fi.importance, fi.importance_norm);
                }
            }
            None => debug!(iteration, "Features reduced; skipping per-feature importances"),
        }

        let record = IterationRecord {
            iteration,
            snapshot: ctx.lineage().head().to_path_buf(),
            used_features,
            transforms_applied: ctx.last_transforms_applied.clone(),
            model_results,
            feature_metrics,
        };
        ctx.record(record);
        Ok(())
    }
}
