use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use tracing::{debug, info};

use super::{ConversationContext, ConversationGraph};
use crate::data::SnapshotStore;
use crate::llm::Oracle;
use crate::ml::Estimator;
use crate::pipeline::RefinementLoop;
use crate::state::RunnerConfig;

/// Owns one conversation across turns. `ask` takes `&mut self`, so turns
/// against one runner are serialized.
pub struct Runner {
    graph: ConversationGraph,
    conversation: ConversationContext,
}

impl Runner {
    pub fn new(config: &RunnerConfig, oracle: Arc<dyn Oracle>, estimator: Arc<dyn Estimator>) -> Self {
        let store = Arc::new(SnapshotStore::new(&config.temp_dir));
        debug!(
            dataset = %config.dataset.display(),
            temp_dir = %store.temp_dir().display(),
            max_iterations = config.max_iterations,
            "Runner created"
        );
        let refinement = RefinementLoop::new(oracle, estimator, store);
        Self {
            graph: ConversationGraph::new(refinement, config.dataset.clone(), config.max_iterations),
            conversation: ConversationContext::new(),
        }
    }

    pub fn dataset(&self) -> &Path {
        self.graph.dataset()
    }

    pub fn conversation(&self) -> &ConversationContext {
        &self.conversation
    }

    /// Answer one question. Fatal errors come back as `Err` and leave the
    /// conversation unchanged.
    pub async fn ask(&mut self, question: &str) -> Result<String> {
        info!(question, turn = self.conversation.qa_history().len() + 1, "Question received");
        let turn = self.graph.route(question, &mut self.conversation).await?;
        info!(
            route = turn.route.as_str(),
            reason = turn.reason.as_deref().unwrap_or(""),
            answer_len = turn.answer.len(),
            "Turn complete"
        );
        Ok(turn.answer)
    }
}
