pub mod schema;
pub mod transform;
pub mod types;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::debug;

use crate::error::AutomlError;

use types::Frame;

/// Reads dataset snapshots and writes new ones into a temp directory.
pub struct SnapshotStore {
    temp_dir: PathBuf,
}

impl SnapshotStore {
    pub fn new(temp_dir: impl Into<PathBuf>) -> Self {
        Self {
            temp_dir: temp_dir.into(),
        }
    }

    pub fn temp_dir(&self) -> &Path {
        &self.temp_dir
    }

    /// Load a CSV snapshot. Unreadable or empty datasets are resource errors.
    pub async fn load(&self, path: &Path) -> Result<Frame> {
        let bytes = tokio::fs::read(path).await.map_err(|e| {
            AutomlError::resource(format!("cannot read dataset {}: {}", path.display(), e))
        })?;
        let frame = Frame::from_csv_reader(bytes.as_slice()).map_err(|e| {
            AutomlError::resource(format!("cannot parse dataset {}: {:#}", path.display(), e))
        })?;
        if frame.n_rows() == 0 || frame.n_cols() == 0 {
            return Err(
                AutomlError::resource(format!("dataset {} is empty", path.display())).into(),
            );
        }
        debug!(path = %path.display(), rows = frame.n_rows(), cols = frame.n_cols(), "snapshot loaded");
        Ok(frame)
    }

    /// Write `frame` as `iter{iteration}_{hash}.csv`, where the hash covers
    /// the run id and the snapshot bytes.
    pub async fn write(&self, run_id: &str, iteration: u32, frame: &Frame) -> Result<PathBuf> {
        let bytes = frame.to_csv_bytes().context("serialize snapshot")?;

        let mut hasher = blake3::Hasher::new();
        hasher.update(run_id.as_bytes());
        hasher.update(&bytes);
        let digest = hasher.finalize().to_hex().to_string();

        tokio::fs::create_dir_all(&self.temp_dir).await.map_err(|e| {
            AutomlError::resource(format!(
                "cannot create temp dir {}: {}",
                self.temp_dir.display(),
                e
            ))
        })?;
        let path = self
            .temp_dir
            .join(format!("iter{}_{}.csv", iteration, &digest[..8]));
        tokio::fs::write(&path, &bytes).await.map_err(|e| {
            AutomlError::resource(format!("cannot write snapshot {}: {}", path.display(), e))
        })?;

        debug!(path = %path.display(), iteration, size = bytes.len(), "snapshot written");
        Ok(path)
    }
}
