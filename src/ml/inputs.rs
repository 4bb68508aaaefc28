//! Splitting a snapshot into a modeling target and raw feature columns,
//! and the encoded matrix an estimator trains on.

use anyhow::Result;

use super::TaskType;
use crate::data::types::{Column, ColumnData, Frame};
use crate::error::AutomlError;

/// Modeling target aligned with the rows of a feature matrix.
#[derive(Debug, Clone, PartialEq)]
pub enum Target {
    /// Class labels as text; numeric labels use their display form.
    Classes(Vec<String>),
    Values(Vec<f64>),
}

impl Target {
    pub fn len(&self) -> usize {
        match self {
            Target::Classes(v) => v.len(),
            Target::Values(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Target plus every other column, restricted to rows whose target is
/// present.
#[derive(Debug, Clone)]
pub struct ModelInputs {
    pub target: Target,
    pub features: Vec<Column>,
    pub dropped_rows: usize,
}

impl ModelInputs {
    /// A missing or empty target column, a categorical target for
    /// regression, or no feature columns at all is a configuration error.
    pub fn from_frame(frame: &Frame, target_column: &str, task: TaskType) -> Result<Self> {
        let target = frame.column(target_column).ok_or_else(|| {
            AutomlError::config(format!(
                "target column '{}' not found in current dataset",
                target_column
            ))
        })?;

        let rows: Vec<usize> = (0..frame.n_rows()).filter(|&i| !target.is_missing(i)).collect();
        if rows.is_empty() {
            return Err(AutomlError::config(format!("target column '{}' has no values", target_column)).into());
        }

        let target = match task {
            TaskType::Classification => {
                Target::Classes(rows.iter().filter_map(|&i| target.text_at(i)).collect())
            }
            TaskType::Regression => {
                let values = target.as_numeric().ok_or_else(|| {
                    AutomlError::config(format!(
                        "regression target '{}' is not numeric",
                        target_column
                    ))
                })?;
                Target::Values(rows.iter().filter_map(|&i| values[i]).collect())
            }
        };

        let features: Vec<Column> = frame
            .columns()
            .iter()
            .filter(|c| c.name != target_column)
            .map(|c| match &c.data {
                ColumnData::Numeric(v) => Column::numeric(&c.name, rows.iter().map(|&i| v[i]).collect()),
                ColumnData::Text(v) => Column::text(&c.name, rows.iter().map(|&i| v[i].clone()).collect()),
            })
            .collect();
        if features.is_empty() {
            return Err(AutomlError::config(format!(
                "dataset has no feature columns besides '{}'",
                target_column
            ))
            .into());
        }

        Ok(Self {
            target,
            features,
            dropped_rows: frame.n_rows() - rows.len(),
        })
    }

    pub fn used_features(&self) -> Vec<String> {
        self.features.iter().map(|c| c.name.clone()).collect()
    }
}

/// Output of fitting preprocessing on a snapshot.
#[derive(Debug, Clone)]
pub struct Prepared {
    /// Row-major encoded features.
    pub x: Vec<Vec<f64>>,
    pub y: Target,
    /// Names of the encoded columns.
    pub feature_names: Vec<String>,
    /// Original dataset columns used as inputs.
    pub used_features: Vec<String>,
    pub reduced: bool,
    pub dropped_rows: usize,
}

impl Prepared {
    pub fn n_rows(&self) -> usize {
        self.x.len()
    }

    pub fn n_features(&self) -> usize {
        self.feature_names.len()
    }
}
