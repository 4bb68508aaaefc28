use std::path::{Path, PathBuf};

use serde::Serialize;

/// Ordered dataset snapshots of one run. Seeded with the initial dataset;
/// the last entry is the snapshot in use. There is no removal API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Lineage {
    snapshots: Vec<PathBuf>,
}

impl Lineage {
    pub fn seed(initial: impl Into<PathBuf>) -> Self {
        Self {
            snapshots: vec![initial.into()],
        }
    }

    pub fn push(&mut self, snapshot: PathBuf) {
        self.snapshots.push(snapshot);
    }

    pub fn head(&self) -> &Path {
        // seeded on construction, never shrinks
        &self.snapshots[self.snapshots.len() - 1]
    }

    pub fn seed_path(&self) -> &Path {
        &self.snapshots[0]
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    /// Always false once seeded.
    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Path> {
        self.snapshots.iter().map(PathBuf::as_path)
    }
}
