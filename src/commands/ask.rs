use tracing::{error, info};

use crate::error::category;
use crate::state::Session;

/// Pass a question to the runner. Failures are reported, never propagated.
pub async fn ask(session: &mut Session, question: &str) -> String {
    match session.runner.ask(question).await {
        Ok(answer) => {
            let qa_count = session.runner.conversation().qa_history().len();
            info!(qa_count, "Answer ready");
            format!("\n=== ANSWER ===\n{}\n", answer)
        }
        Err(e) => {
            let kind = category(&e).map(|c| c.kind()).unwrap_or("error");
            error!(kind, "Question failed: {:#}", e);
            format!("[ERROR] {} failure: {:#}", kind, e)
        }
    }
}
