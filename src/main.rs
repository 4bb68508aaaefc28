mod commands;
mod conversation;
mod data;
mod error;
mod llm;
mod ml;
mod pipeline;
mod state;
#[cfg(test)]
mod testing;

use std::io::Write;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, Level};

use commands::Outcome;
use llm::LlmClient;
use ml::SklearnEstimator;
use state::{RunnerConfig, Session};

fn prompt() {
    print!("> ");
    let _ = std::io::stdout().flush();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load env
    let _ = dotenv::dotenv();
    let level = dotenv::var("AUTOML_LOG_LEVEL")
        .ok()
        .and_then(|s| s.parse::<Level>().ok())
        .unwrap_or(Level::INFO);
    tracing_subscriber::fmt().with_max_level(level).init();

    let config = RunnerConfig::from_env();
    if !config.dataset.is_file() {
        anyhow::bail!("Could not load default dataset: {}", config.dataset.display());
    }
    info!(dataset = %config.dataset.display(), max_iterations = config.max_iterations, "Runner configured");

    let llm_client = Arc::new(LlmClient::from_env()?);
    info!(model = llm_client.model(), "LLM client initialized");

    let estimator = Arc::new(SklearnEstimator::load()?);
    info!("Estimator bridge ready");

    let mut session = Session::new(llm_client, estimator, config);

    println!("\nConversational AutoML Shell");
    println!("Type 'help' for commands.\n");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    prompt();
    while let Some(line) = lines.next_line().await? {
        match commands::dispatch(&mut session, &line).await {
            Outcome::Quit => break,
            Outcome::Reply(text) => println!("{}", text),
            Outcome::Silent => {}
        }
        prompt();
    }

    println!("\nExiting...");
    Ok(())
}
