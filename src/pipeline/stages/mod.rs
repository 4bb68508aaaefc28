pub mod clean;
pub mod critique;
pub mod features;
pub mod profile;
pub mod synthesis;
pub mod target;
pub mod train;

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;

use crate::data::SnapshotStore;
use crate::llm::{Oracle, Prompt};
use crate::ml::Estimator;

use super::context::RunContext;

pub use clean::Clean;
pub use critique::Critique;
pub use features::{ApplyFeatures, ProposeFeatures};
pub use profile::Profile;
pub use synthesis::Synthesize;
pub use target::SelectTarget;
pub use train::{PlanModels, Train};

/// Collaborators shared by every stage of a run.
#[derive(Clone)]
pub struct StageEnv {
    pub oracle: Arc<dyn Oracle>,
    pub estimator: Arc<dyn Estimator>,
    pub store: Arc<SnapshotStore>,
}

impl StageEnv {
    pub async fn ask(&self, prompt: &Prompt) -> Result<String> {
        self.oracle
            .complete(prompt)
            .await
            .with_context(|| format!("{} request failed", prompt.site))
    }
}

/// One unit of work over the run context. Stages read and write only the
/// context; collaborator side effects go through `env`.
#[async_trait]
pub trait Stage: Send + Sync {
    fn id(&self) -> &'static str;

    async fn run(&self, ctx: &mut RunContext, env: &StageEnv) -> Result<()>;
}
