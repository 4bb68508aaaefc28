use serde::{Deserialize, Serialize};

use super::types::{ColumnKind, Frame};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnProfile {
    pub name: String,
    pub kind: ColumnKind,
    /// Distinct non-missing values.
    pub cardinality: usize,
    pub missing: usize,
}

/// Column profiles in frame order, plus the frame's shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    pub columns: Vec<ColumnProfile>,
    pub n_rows: usize,
    pub n_cols: usize,
}

impl Schema {
    pub fn profile(frame: &Frame) -> Self {
        let columns = frame
            .columns()
            .iter()
            .map(|c| ColumnProfile {
                name: c.name.clone(),
                kind: c.kind(),
                cardinality: c.distinct_count(),
                missing: c.missing_count(),
            })
            .collect();
        Self {
            columns,
            n_rows: frame.n_rows(),
            n_cols: frame.n_cols(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&ColumnProfile> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// One `- col: type=…, unique=…, missing=…` line per column.
    pub fn render(&self) -> String {
        self.columns
            .iter()
            .map(|c| {
                format!(
                    "- {}: type={}, unique={}, missing={}",
                    c.name,
                    c.kind.as_str(),
                    c.cardinality,
                    c.missing
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Content digest, stable for identical schemas.
    pub fn fingerprint(&self) -> String {
        blake3::hash(self.render().as_bytes()).to_hex().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profile_and_render() {
        let frame =
            Frame::from_csv_reader("a,b\n1,x\n2,\n2,y\n".as_bytes()).unwrap();
        let schema = Schema::profile(&frame);
        assert_eq!(schema.n_rows, 3);
        assert_eq!(schema.get("a").unwrap().cardinality, 2);
        assert_eq!(schema.get("b").unwrap().missing, 1);
        assert_eq!(
            schema.render(),
            "- a: type=numeric, unique=2, missing=0\n- b: type=categorical, unique=2, missing=1"
        );
    }

    #[test]
    fn test_fingerprint_tracks_columns() {
        let one = Schema::profile(&Frame::from_csv_reader("a\n1\n".as_bytes()).unwrap());
        let same = Schema::profile(&Frame::from_csv_reader("a\n1\n".as_bytes()).unwrap());
        let other = Schema::profile(&Frame::from_csv_reader("a,b\n1,2\n".as_bytes()).unwrap());
        assert_eq!(one.fingerprint(), same.fingerprint());
        assert_ne!(one.fingerprint(), other.fingerprint());
    }
}
