//! Plain-text renderings of run state for prompts.

use super::context::{IterationRecord, Plan, RunContext};
use crate::data::transform::TransformationSpec;

fn transform_names(specs: &[TransformationSpec]) -> String {
    if specs.is_empty() {
        return "none".to_string();
    }
    specs
        .iter()
        .map(|s| s.name.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

fn model_scores(record: &IterationRecord) -> String {
    record
        .model_results
        .iter()
        .map(|r| format!("{}: mean={:.4}, std={:.4}", r.model, r.score.mean, r.score.std))
        .collect::<Vec<_>>()
        .join(", ")
}

fn top_importances(record: &IterationRecord, n: usize) -> String {
    match &record.feature_metrics {
        Some(metrics) if !metrics.importances.is_empty() => metrics
            .importances
            .iter()
            .take(n)
            .map(|fi| format!("{} (norm_importance={:.3})", fi.feature, fi.importance_norm))
            .collect::<Vec<_>>()
            .join(", "),
        _ => "none".to_string(),
    }
}

fn first_features(record: &IterationRecord, n: usize) -> String {
    record
        .used_features
        .iter()
        .take(n)
        .cloned()
        .collect::<Vec<_>>()
        .join(", ")
}

/// Context for feature proposal: the previous pass, if any.
pub fn last_iteration(history: &[IterationRecord]) -> String {
    let Some(last) = history.last() else {
        return "No previous iterations.".to_string();
    };
    let best = last
        .best()
        .map(|b| format!("{} (mean_score={:.4})", b.model, b.score.mean))
        .unwrap_or_else(|| "none".to_string());
    format!(
        "Last iteration:\n- Best model: {}\n- Used features (first 10): {}\n- Transforms applied: {}",
        best,
        first_features(last, 10),
        transform_names(&last.transforms_applied)
    )
}

/// Transformations the critic suggested, offered as candidates for the
/// next proposal.
pub fn candidate_pool(plan: Option<&Plan>) -> Option<String> {
    let plan = plan.filter(|p| !p.transformations.is_empty())?;
    let lines: Vec<String> = plan
        .transformations
        .iter()
        .map(|t| {
            format!(
                "- {}: {} params={}",
                t.name,
                if t.description.is_empty() { "(no description)" } else { t.description.as_str() },
                t.params
            )
        })
        .collect();
    Some(format!(
        "The critic suggested these candidate transformations ({}):\n{}",
        plan.rationale,
        lines.join("\n")
    ))
}

/// Results of the latest pass for the critic.
pub fn latest_results(record: &IterationRecord) -> String {
    let results = record
        .model_results
        .iter()
        .map(|r| format!("- {}: mean={:.4}, std={:.4}", r.model, r.score.mean, r.score.std))
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "Last iteration:\n- Features used (first 15): {}\n- Model results:\n{}\n- Transforms applied: {}",
        first_features(record, 15),
        results,
        transform_names(&record.transforms_applied)
    )
}

/// Full history for synthesis and the explainer.
pub fn history(records: &[IterationRecord]) -> String {
    records
        .iter()
        .map(|h| {
            format!(
                "Iteration {}:\n  - dataset_csv: {}\n  - used_features (first 10): {}\n  - transforms_applied: {}\n  - model_results: {}\n  - top_feature_importances_for_best_model: {}\n",
                h.iteration,
                h.snapshot.display(),
                first_features(h, 10),
                transform_names(&h.transforms_applied),
                model_scores(h),
                top_importances(h, 10)
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Compact summary of a finished run for the router.
pub fn run(ctx: &RunContext) -> String {
    if ctx.history().is_empty() {
        return "No previous modeling runs have been executed.".to_string();
    }
    let mut lines = Vec::new();
    if let Some(target) = ctx.target() {
        lines.push(format!("Target column: {}", target.target_column));
        lines.push(format!("Task type: {}", target.task_type));
    }
    lines.push("Iterations summary:".to_string());
    for h in ctx.history() {
        lines.push(format!(
            "- Iteration {}: models = [{}], top_feature_importances_for_best_model = {}",
            h.iteration,
            model_scores(h),
            top_importances(h, 8)
        ));
    }
    lines.join("\n")
}
