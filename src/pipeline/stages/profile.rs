use anyhow::Result;
use async_trait::async_trait;
use tracing::{debug, info};

use super::{Stage, StageEnv};
use crate::data::schema::Schema;
use crate::pipeline::context::RunContext;

/// Rebuild the schema from the current snapshot, loading the lineage head
/// first if no snapshot is in memory.
pub struct Profile;

#[async_trait]
impl Stage for Profile {
    fn id(&self) -> &'static str {
        "profile"
    }

    async fn run(&self, ctx: &mut RunContext, env: &StageEnv) -> Result<()> {
        let frame = match ctx.frame.take() {
            Some(frame) => frame,
            None => env.store.load(ctx.lineage().head()).await?,
        };
        let schema = Schema::profile(&frame);
        ctx.frame = Some(frame);
        info!(
            iteration = ctx.iteration(),
            rows = schema.n_rows,
            cols = schema.n_cols,
            snapshot = %ctx.lineage().head().display(),
            "Profiled dataset"
        );
        debug!(fingerprint = %schema.fingerprint(), "Schema fingerprint");
        ctx.schema = Some(schema);
        Ok(())
    }
}
