//! Column schema: axis kind plus the ordered set of retained numeric columns, per §3
//! "Column Schema" and §4.4 "Column Filter".

use serde::Serialize;

use crate::axis::AxisKind;

/// Numeric storage kind for a retained column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumericKind {
    I32,
    I64,
    F32,
    F64,
}

impl NumericKind {
    /// Infers the narrowest numeric kind that parses every sample, widening as needed.
    #[must_use]
    pub fn infer(samples: &[&str]) -> Option<Self> {
        let mut kind = None;
        for raw in samples {
            let trimmed = raw.trim();
            if trimmed.is_empty() {
                continue;
            }
            let sample_kind = if let Ok(v) = trimmed.parse::<i32>() {
                let _ = v;
                Self::I32
            } else if trimmed.parse::<i64>().is_ok() {
                Self::I64
            } else if let Ok(v) = trimmed.parse::<f32>() {
                if v.is_finite() || trimmed.eq_ignore_ascii_case("nan") {
                    Self::F32
                } else {
                    return None;
                }
            } else if trimmed.parse::<f64>().is_ok() {
                Self::F64
            } else {
                return None;
            };
            kind = Some(widen(kind, sample_kind));
        }
        kind
    }
}

fn widen(current: Option<NumericKind>, next: NumericKind) -> NumericKind {
    use NumericKind::{F32, F64, I32, I64};
    match (current, next) {
        (None, k) => k,
        (Some(F64), _) | (_, F64) => F64,
        (Some(F32), I64 | F32) | (Some(I64), F32) => F64,
        (Some(F32), I32) | (Some(I32), F32) => F32,
        (Some(I64), I32 | I64) | (Some(I32), I64) => I64,
        (Some(I32), I32) => I32,
        (Some(a), _) => a,
    }
}

/// The role a CSV column plays in the schema.
#[derive(Debug, Clone)]
pub enum ColumnRole {
    Axis,
    Numeric(NumericKind),
    /// Dropped because it was not retained by the column filter.
    Dropped,
}

/// One column of the schema: its sanitized name, original header index, and role.
#[derive(Debug, Clone)]
pub struct ColumnSchema {
    pub name: String,
    pub header_index: usize,
    pub role: ColumnRole,
}

/// The full, immutable schema decided once at open time.
#[derive(Debug, Clone)]
pub struct Schema {
    pub axis_kind: AxisKind,
    pub columns: Vec<ColumnSchema>,
}

impl Schema {
    /// Column schemas for the numeric columns only, in header order.
    pub fn numeric_columns(&self) -> impl Iterator<Item = &ColumnSchema> {
        self.columns
            .iter()
            .filter(|c| matches!(c.role, ColumnRole::Numeric(_)))
    }

    #[must_use]
    pub fn axis_column(&self) -> &ColumnSchema {
        &self.columns[0]
    }
}

/// A quality issue emitted during column filtering, per §4.4.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum QualityIssue {
    AllMissing { column: String },
    HighMissingRatio { column: String, ratio: f64 },
    NonNumeric { column: String },
}

/// Sanitizes raw header names into a unique, non-empty set.
///
/// Empty names are replaced with a positional placeholder; duplicates (after trimming) get a
/// numeric suffix so the schema's invariant of unique names always holds.
#[must_use]
pub fn sanitize_header(raw: &[String]) -> Vec<String> {
    let mut seen = std::collections::HashMap::new();
    raw.iter()
        .enumerate()
        .map(|(index, name)| {
            let trimmed = name.trim();
            let base = if trimmed.is_empty() {
                format!("column_{index}")
            } else {
                trimmed.to_string()
            };
            let count = seen.entry(base.clone()).or_insert(0_usize);
            let unique = if *count == 0 {
                base.clone()
            } else {
                format!("{base}_{count}")
            };
            *count += 1;
            unique
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_kind_widens_to_f64_on_mixed_sample() {
        assert_eq!(
            NumericKind::infer(&["1", "2.5", "3"]),
            Some(NumericKind::F64)
        );
    }

    #[test]
    fn numeric_kind_stays_i32_when_all_small_ints() {
        assert_eq!(NumericKind::infer(&["1", "2", "-3"]), Some(NumericKind::I32));
    }

    #[test]
    fn numeric_kind_none_on_non_numeric_sample() {
        assert_eq!(NumericKind::infer(&["1", "abc"]), None);
    }

    #[test]
    fn sanitize_header_dedupes_and_fills_blanks() {
        let raw = vec!["t".to_string(), "".to_string(), "t".to_string()];
        let sanitized = sanitize_header(&raw);
        assert_eq!(sanitized, vec!["t", "column_1", "t_1"]);
    }
}
