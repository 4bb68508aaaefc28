use std::path::PathBuf;
use std::sync::Arc;

use crate::conversation::Runner;
use crate::llm::Oracle;
use crate::ml::Estimator;

/// Runner parameters (the `config` command can modify them at runtime).
#[derive(Debug, Clone, PartialEq)]
pub struct RunnerConfig {
    pub dataset: PathBuf,
    pub max_iterations: u32,
    pub temp_dir: PathBuf,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            dataset: PathBuf::from("data/titanic.csv"),
            max_iterations: 3,
            temp_dir: PathBuf::from("tmp_datasets"),
        }
    }
}

impl RunnerConfig {
    /// Defaults overridden by `AUTOML_DATASET`, `AUTOML_MAX_ITERATIONS` and
    /// `AUTOML_TEMP_DIR`.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            dataset: dotenv::var("AUTOML_DATASET")
                .map(PathBuf::from)
                .unwrap_or(defaults.dataset),
            max_iterations: dotenv::var("AUTOML_MAX_ITERATIONS")
                .ok()
                .and_then(|s| s.parse::<u32>().ok())
                .unwrap_or(defaults.max_iterations),
            temp_dir: dotenv::var("AUTOML_TEMP_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.temp_dir),
        }
    }
}

/// Shell state: collaborators, current configuration and the live runner.
pub struct Session {
    pub oracle: Arc<dyn Oracle>,
    pub estimator: Arc<dyn Estimator>,
    pub config: RunnerConfig,
    pub runner: Runner,
}

impl Session {
    pub fn new(oracle: Arc<dyn Oracle>, estimator: Arc<dyn Estimator>, config: RunnerConfig) -> Self {
        let runner = Runner::new(&config, oracle.clone(), estimator.clone());
        Self {
            oracle,
            estimator,
            config,
            runner,
        }
    }

    /// Fresh runner for the current configuration; the conversation is
    /// discarded.
    pub fn rebuild_runner(&mut self) {
        self.runner = Runner::new(&self.config, self.oracle.clone(), self.estimator.clone());
    }
}
