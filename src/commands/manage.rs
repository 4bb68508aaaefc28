use std::path::PathBuf;

use tracing::{info, warn};

use crate::state::Session;

/// Point the session at a new CSV. A missing file keeps the current runner.
pub fn set_dataset(session: &mut Session, path: Option<&str>) -> String {
    let Some(path) = path else {
        return "Usage: set_dataset path/to/file.csv".to_string();
    };
    let path = PathBuf::from(path);
    if !path.is_file() {
        warn!(path = %path.display(), "Dataset not found, keeping current runner");
        return format!("[ERROR] Dataset not found: {}", path.display());
    }
    info!(path = %path.display(), "Loading dataset");
    session.config.dataset = path;
    session.rebuild_runner();
    "[INFO] Runner reset with new dataset.".to_string()
}

/// Fresh conversation on the current dataset.
pub fn reset(session: &mut Session) -> String {
    session.rebuild_runner();
    info!(dataset = %session.config.dataset.display(), "Conversation reset");
    "[INFO] Conversation state reset.".to_string()
}

pub fn show_state(session: &Session) -> String {
    let conv = session.runner.conversation();
    let mut lines = vec![
        "--- Conversation State ---".to_string(),
        format!("Dataset: {}", session.runner.dataset().display()),
        format!("Last AutoML run: {}", conv.last_run().is_some()),
        format!("Q&A history count: {}", conv.qa_history().len()),
    ];
    if let Some(last) = conv.qa_history().last() {
        lines.push(format!(
            "Last turn: {} at {}",
            last.route.as_str(),
            last.asked_at.to_rfc3339()
        ));
    }
    if let Some(run) = conv.last_run() {
        lines.push(format!(
            "Run: {} (started {})",
            run.run_id(),
            run.started_at().to_rfc3339()
        ));
        if let Some(target) = run.target() {
            lines.push(format!("Target: {} ({})", target.target_column, target.task_type));
        }
        lines.push(format!(
            "Passes: {} of {}",
            run.iteration(),
            run.max_iterations()
        ));
        lines.push(format!(
            "Lineage length: {} ({} -> {})",
            run.lineage().len(),
            run.lineage().seed_path().display(),
            run.lineage().head().display()
        ));
    }
    lines.push("--------------------------".to_string());
    lines.join("\n")
}
