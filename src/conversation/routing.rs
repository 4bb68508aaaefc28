use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::ConversationContext;
use crate::llm::{CallSite, Oracle, Prompt};
use crate::pipeline::extract::{extract, null_as_default};
use crate::pipeline::stages::synthesis::{explain, NO_PRIOR_RESULTS};
use crate::pipeline::{prompts, summary, RefinementLoop};

pub const NO_FINAL_ANSWER: &str = "Analysis completed, but no final answer was stored.";
pub const DEFAULT_REFUSAL_REASON: &str = "The question cannot be answered with this AutoML system.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Route {
    Reuse,
    NewRun,
    CannotAnswer,
}

impl Route {
    pub fn as_str(&self) -> &'static str {
        match self {
            Route::Reuse => "reuse",
            Route::NewRun => "new_run",
            Route::CannotAnswer => "cannot_answer",
        }
    }
}

/// Raw routing answer from the oracle.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RoutingDecision {
    #[serde(default, deserialize_with = "null_as_default")]
    pub reuse: bool,
    #[serde(default)]
    pub need_new_run: Option<bool>,
    #[serde(default)]
    pub reason: Option<String>,
}

impl RoutingDecision {
    /// `reuse` wins; otherwise `need_new_run`, which defaults to `!reuse`.
    pub fn route(&self) -> Route {
        if self.reuse {
            Route::Reuse
        } else if self.need_new_run.unwrap_or(!self.reuse) {
            Route::NewRun
        } else {
            Route::CannotAnswer
        }
    }
}

/// Outcome of one turn.
#[derive(Debug, Clone, PartialEq)]
pub struct Turn {
    pub route: Route,
    pub reason: Option<String>,
    pub answer: String,
}

/// Routes a question, then runs exactly one terminal: explain from the
/// last run, a full new refinement run, or a refusal.
pub struct ConversationGraph {
    oracle: Arc<dyn Oracle>,
    refinement: RefinementLoop,
    dataset: PathBuf,
    max_iterations: u32,
}

impl ConversationGraph {
    pub fn new(refinement: RefinementLoop, dataset: PathBuf, max_iterations: u32) -> Self {
        Self {
            oracle: refinement.env().oracle.clone(),
            refinement,
            dataset,
            max_iterations,
        }
    }

    pub fn dataset(&self) -> &PathBuf {
        &self.dataset
    }

    async fn decide(&self, question: &str, conv: &ConversationContext) -> Result<RoutingDecision> {
        let previous = conv
            .last_run()
            .map(summary::run)
            .unwrap_or_else(|| "No previous modeling results.".to_string());
        let prompt = Prompt::new(
            CallSite::Routing,
            prompts::ROUTING_SYSTEM,
            format!(
                "New user question:\n{}\n\nPrevious modeling summary:\n{}\n\nRecent Q&A history:\n{}\n",
                question,
                previous,
                conv.recent_turns()
            ),
        );
        let response = self.oracle.complete(&prompt).await?;
        Ok(extract(CallSite::Routing, &response)?)
    }

    /// Handle one turn. On success exactly one Q&A entry is appended; a
    /// fatal error leaves the conversation untouched.
    pub async fn route(&self, question: &str, conv: &mut ConversationContext) -> Result<Turn> {
        let decision = self.decide(question, conv).await?;
        let route = decision.route();
        info!(
            route = route.as_str(),
            reuse = decision.reuse,
            need_new_run = ?decision.need_new_run,
            reason = decision.reason.as_deref().unwrap_or(""),
            "Routing decision"
        );

        let answer = match route {
            Route::Reuse => match conv.last_run() {
                Some(run) => explain(self.oracle.as_ref(), question, run).await?,
                None => {
                    info!("Reuse requested without a previous run");
                    NO_PRIOR_RESULTS.to_string()
                }
            },
            Route::NewRun => {
                let run = self
                    .refinement
                    .run(question, &self.dataset, self.max_iterations)
                    .await?;
                let answer = run.final_answer().unwrap_or(NO_FINAL_ANSWER).to_string();
                conv.adopt_run(run);
                answer
            }
            Route::CannotAnswer => {
                let reason = decision
                    .reason
                    .as_deref()
                    .filter(|r| !r.trim().is_empty())
                    .unwrap_or(DEFAULT_REFUSAL_REASON);
                format!(
                    "I cannot answer this question with the current AutoML setup: {}",
                    reason
                )
            }
        };

        conv.append(question, &answer, route);
        Ok(Turn {
            route,
            reason: decision.reason,
            answer,
        })
    }
}
