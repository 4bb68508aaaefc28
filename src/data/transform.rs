//! Closed set of feature transformations the reasoning collaborator may
//! request. Anything outside the set is rejected per transformation and
//! skipped; the rest of a plan still applies.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use super::types::{Column, Frame};

/// A transformation as the collaborator wrote it: unvalidated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformationSpec {
    #[serde(alias = "kind")]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub params: Value,
}

impl TransformationSpec {
    pub fn new(name: impl Into<String>, params: Value) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            params,
        }
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum TransformRejection {
    #[error("unknown transformation kind '{0}'")]
    UnknownKind(String),
    #[error("invalid params for '{kind}': {detail}")]
    InvalidParams { kind: String, detail: String },
    #[error("'{kind}' references missing column '{column}'")]
    MissingColumn { kind: String, column: String },
    #[error("'{kind}' needs numeric column '{column}'")]
    NotNumeric { kind: String, column: String },
    #[error("'{kind}' would overwrite protected column '{column}'")]
    ProtectedColumn { kind: String, column: String },
}

#[derive(Debug, Clone, Deserialize)]
pub struct MissingIndicatorParams {
    pub source_column: String,
    pub target_column: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NumericSumParams {
    pub source_columns: Vec<String>,
    pub target_column: String,
    #[serde(default)]
    pub bias: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NumericRatioParams {
    pub numerator: String,
    pub denominator: String,
    pub target_column: String,
    #[serde(default)]
    pub eps: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RegexExtractParams {
    pub source_column: String,
    pub target_column: String,
    pub pattern: String,
    #[serde(default)]
    pub group: Option<usize>,
    #[serde(default)]
    pub missing_placeholder: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TextPrefixParams {
    pub source_column: String,
    pub target_column: String,
    #[serde(default)]
    pub n_chars: Option<usize>,
    #[serde(default)]
    pub missing_placeholder: Option<String>,
}

#[derive(Debug, Clone)]
pub enum Transformation {
    MissingIndicator(MissingIndicatorParams),
    NumericSum(NumericSumParams),
    NumericRatio(NumericRatioParams),
    RegexExtract(RegexExtractParams, regex::Regex),
    TextPrefix(TextPrefixParams),
}

const DEFAULT_PLACEHOLDER: &str = "Unknown";

fn params<T: serde::de::DeserializeOwned>(spec: &TransformationSpec) -> Result<T, TransformRejection> {
    serde_json::from_value(spec.params.clone()).map_err(|e| TransformRejection::InvalidParams {
        kind: spec.name.clone(),
        detail: e.to_string(),
    })
}

impl Transformation {
    pub const KINDS: &'static [&'static str] = &[
        "add_missing_indicator",
        "numeric_sum",
        "numeric_ratio",
        "text_regex_extract",
        "text_prefix",
    ];

    /// Validate a spec against the closed set of kinds and their params.
    pub fn from_spec(spec: &TransformationSpec) -> Result<Self, TransformRejection> {
        match spec.name.as_str() {
            "add_missing_indicator" => Ok(Self::MissingIndicator(params(spec)?)),
            "numeric_sum" => Ok(Self::NumericSum(params(spec)?)),
            "numeric_ratio" => Ok(Self::NumericRatio(params(spec)?)),
            "text_regex_extract" => {
                let p: RegexExtractParams = params(spec)?;
                let re = regex::Regex::new(&p.pattern).map_err(|e| {
                    TransformRejection::InvalidParams {
                        kind: spec.name.clone(),
                        detail: e.to_string(),
                    }
                })?;
                Ok(Self::RegexExtract(p, re))
            }
            "text_prefix" => Ok(Self::TextPrefix(params(spec)?)),
            other => Err(TransformRejection::UnknownKind(other.to_string())),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::MissingIndicator(_) => "add_missing_indicator",
            Self::NumericSum(_) => "numeric_sum",
            Self::NumericRatio(_) => "numeric_ratio",
            Self::RegexExtract(..) => "text_regex_extract",
            Self::TextPrefix(_) => "text_prefix",
        }
    }

    /// Column the transformation writes.
    pub fn output_column(&self) -> &str {
        match self {
            Self::MissingIndicator(p) => &p.target_column,
            Self::NumericSum(p) => &p.target_column,
            Self::NumericRatio(p) => &p.target_column,
            Self::RegexExtract(p, _) => &p.target_column,
            Self::TextPrefix(p) => &p.target_column,
        }
    }

    /// Refuse to write over any of `protected`.
    pub fn check_output(&self, protected: &[&str]) -> Result<(), TransformRejection> {
        let column = self.output_column();
        if protected.contains(&column) {
            return Err(TransformRejection::ProtectedColumn {
                kind: self.kind().to_string(),
                column: column.to_string(),
            });
        }
        Ok(())
    }

    /// Compute the new column and write it into `frame`. On rejection the
    /// frame is untouched.
    pub fn apply(&self, frame: &mut Frame) -> Result<(), TransformRejection> {
        let column = self.compute(frame)?;
        frame
            .upsert(column)
            .map_err(|e| TransformRejection::InvalidParams {
                kind: self.kind().to_string(),
                detail: e.to_string(),
            })
    }

    fn compute(&self, frame: &Frame) -> Result<Column, TransformRejection> {
        let kind = self.kind();
        let lookup = |name: &str| lookup_column(frame, kind, name);
        let numeric = |name: &str| numeric_column(frame, kind, name);
        let n = frame.n_rows();

        let column = match self {
            Self::MissingIndicator(p) => {
                let src = lookup(&p.source_column)?;
                let values = (0..n)
                    .map(|i| Some(if src.is_missing(i) { 1.0 } else { 0.0 }))
                    .collect();
                Column::numeric(&p.target_column, values)
            }
            Self::NumericSum(p) => {
                if p.source_columns.is_empty() {
                    return Err(TransformRejection::InvalidParams {
                        kind: kind.to_string(),
                        detail: "source_columns is empty".to_string(),
                    });
                }
                let sources = p
                    .source_columns
                    .iter()
                    .map(|c| numeric(c))
                    .collect::<Result<Vec<_>, _>>()?;
                let bias = p.bias.unwrap_or(0.0);
                // Missing cells contribute nothing.
                let values = (0..n)
                    .map(|i| Some(sources.iter().filter_map(|s| s[i]).sum::<f64>() + bias))
                    .collect();
                Column::numeric(&p.target_column, values)
            }
            Self::NumericRatio(p) => {
                let num = numeric(&p.numerator)?;
                let den = numeric(&p.denominator)?;
                let eps = p.eps.unwrap_or(1e-8);
                let values = (0..n)
                    .map(|i| match (num[i], den[i]) {
                        (Some(a), Some(b)) => Some(a / (b + eps)).filter(|v| v.is_finite()),
                        _ => None,
                    })
                    .collect();
                Column::numeric(&p.target_column, values)
            }
            Self::RegexExtract(p, re) => {
                let src = lookup(&p.source_column)?;
                let group = p.group.unwrap_or(1);
                let placeholder = p
                    .missing_placeholder
                    .clone()
                    .unwrap_or_else(|| DEFAULT_PLACEHOLDER.to_string());
                let values = (0..n)
                    .map(|i| {
                        let extracted = src.text_at(i).and_then(|text| {
                            let caps = re.captures(&text)?;
                            // Anchored at the start of the cell.
                            if caps.get(0)?.start() != 0 {
                                return None;
                            }
                            caps.get(group).map(|m| m.as_str().trim().to_string())
                        });
                        Some(extracted.unwrap_or_else(|| placeholder.clone()))
                    })
                    .collect();
                Column::text(&p.target_column, values)
            }
            Self::TextPrefix(p) => {
                let src = lookup(&p.source_column)?;
                let n_chars = p.n_chars.unwrap_or(1);
                let placeholder = p
                    .missing_placeholder
                    .clone()
                    .unwrap_or_else(|| DEFAULT_PLACEHOLDER.to_string());
                let values = (0..n)
                    .map(|i| {
                        let prefix = src
                            .text_at(i)
                            .map(|t| t.trim().to_string())
                            .filter(|t| !t.is_empty())
                            .map(|t| t.chars().take(n_chars).collect::<String>());
                        Some(prefix.unwrap_or_else(|| placeholder.clone()))
                    })
                    .collect();
                Column::text(&p.target_column, values)
            }
        };
        Ok(column)
    }
}

fn lookup_column<'a>(
    frame: &'a Frame,
    kind: &str,
    name: &str,
) -> Result<&'a Column, TransformRejection> {
    frame.column(name).ok_or_else(|| TransformRejection::MissingColumn {
        kind: kind.to_string(),
        column: name.to_string(),
    })
}

fn numeric_column<'a>(
    frame: &'a Frame,
    kind: &str,
    name: &str,
) -> Result<&'a [Option<f64>], TransformRejection> {
    lookup_column(frame, kind, name)?
        .as_numeric()
        .ok_or_else(|| TransformRejection::NotNumeric {
            kind: kind.to_string(),
            column: name.to_string(),
        })
}

/// Result of applying an ordered list of specs to a frame.
#[derive(Debug)]
pub struct ApplyOutcome {
    pub frame: Frame,
    pub applied: Vec<TransformationSpec>,
    pub skipped: Vec<(TransformationSpec, TransformRejection)>,
}

/// Apply `specs` in order to a copy of `frame`. Rejected specs, including
/// any that would write one of the `protected` columns, are logged and
/// skipped.
pub fn apply_all(frame: &Frame, specs: &[TransformationSpec], protected: &[&str]) -> ApplyOutcome {
    let mut out = frame.clone();
    let mut applied = Vec::new();
    let mut skipped = Vec::new();

    for spec in specs {
        let result = Transformation::from_spec(spec).and_then(|t| {
            t.check_output(protected)?;
            t.apply(&mut out)
        });
        match result {
            Ok(()) => {
                debug!(kind = %spec.name, description = %spec.description, "transformation applied");
                applied.push(spec.clone());
            }
            Err(rejection) => {
                warn!(kind = %spec.name, %rejection, "skipping transformation");
                skipped.push((spec.clone(), rejection));
            }
        }
    }

    ApplyOutcome {
        frame: out,
        applied,
        skipped,
    }
}
