//! Multi-turn conversation: routing each question to reuse, a new run, or
//! a refusal, and the `Runner` that owns the conversation.

pub mod routing;
pub mod runner;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::pipeline::context::RunContext;

pub use routing::{ConversationGraph, Route};
pub use runner::Runner;

/// Recent turns shown to the router.
pub const RECENT_TURNS: usize = 5;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QaEntry {
    pub question: String,
    pub answer: String,
    pub route: Route,
    pub asked_at: DateTime<Utc>,
}

/// State spanning turns: the latest completed run and the transcript.
#[derive(Default)]
pub struct ConversationContext {
    last_run: Option<RunContext>,
    qa_history: Vec<QaEntry>,
}

impl ConversationContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_run(&self) -> Option<&RunContext> {
        self.last_run.as_ref()
    }

    pub fn qa_history(&self) -> &[QaEntry] {
        &self.qa_history
    }

    /// Replace the previous run wholesale.
    pub(crate) fn adopt_run(&mut self, run: RunContext) {
        self.last_run = Some(run);
    }

    pub(crate) fn append(&mut self, question: &str, answer: &str, route: Route) {
        self.qa_history.push(QaEntry {
            question: question.to_string(),
            answer: answer.to_string(),
            route,
            asked_at: Utc::now(),
        });
    }

    /// Last [`RECENT_TURNS`] turns as `Q:`/`A:` pairs.
    pub fn recent_turns(&self) -> String {
        let start = self.qa_history.len().saturating_sub(RECENT_TURNS);
        let text = self.qa_history[start..]
            .iter()
            .map(|qa| format!("Q: {}\nA: {}\n", qa.question, qa.answer))
            .collect::<Vec<_>>()
            .join("\n");
        if text.is_empty() {
            "No prior Q&A in this conversation.".to_string()
        } else {
            text
        }
    }
}
