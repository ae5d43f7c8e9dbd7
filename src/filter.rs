//! Column filter (C4): decides the schema once, from a bounded prefix sample, per §4.4.

use std::io::{BufRead, BufReader};
use std::path::Path;

use rayon::prelude::*;
use tracing::debug;

use crate::axis::{probe_axis_kind, AxisKind};
use crate::error::{Error, Result};
use crate::index::RowIndex;
use crate::reader::row_parser::{parse_header, split_row};
use crate::schema::{sanitize_header, ColumnRole, ColumnSchema, NumericKind, QualityIssue, Schema};

/// Minimum number of sampled rows, regardless of file size.
pub const DEFAULT_SAMPLE_ROWS_MIN: usize = 64;
/// Minimum sample size as a fraction of the file's total rows.
pub const DEFAULT_SAMPLE_RATIO: f64 = 0.01;
/// Missing-value ratio above which a column is retained but flagged.
const HIGH_MISSING_RATIO: f64 = 0.5;

/// Reads the header and a bounded prefix of data rows, decides the schema, and reports quality
/// issues for every column the filter dropped or flagged.
///
/// # Errors
///
/// Returns `NoNumericColumns` if every candidate column is dropped, or `Io` on read failure.
pub fn infer_schema(
    path: &Path,
    row_index: &RowIndex,
    sample_rows_min: usize,
    sample_ratio: f64,
) -> Result<(Schema, Vec<QualityIssue>)> {
    let total_rows = row_index.total_rows();
    let sample_target = (sample_rows_min as u64).max((total_rows as f64 * sample_ratio) as u64);
    let sample_rows = sample_target.min(total_rows) as usize;

    let file = std::fs::File::open(path)?;
    let mut reader = BufReader::new(file);
    let mut header_line = String::new();
    reader.read_line(&mut header_line)?;
    let header = sanitize_header(&parse_header(header_line.trim_end_matches(['\n', '\r'])));

    let mut sample_rows_raw: Vec<Vec<String>> = Vec::with_capacity(sample_rows);
    let mut line = String::new();
    while sample_rows_raw.len() < sample_rows {
        line.clear();
        let read = reader.read_line(&mut line)?;
        if read == 0 {
            break;
        }
        let trimmed = line.trim_end_matches(['\n', '\r']);
        if trimmed.is_empty() {
            continue;
        }
        sample_rows_raw.push(split_row(trimmed).collect());
    }

    let axis_kind = infer_axis_kind(&sample_rows_raw);

    let column_count = header.len();
    let decisions: Vec<(ColumnRole, Option<QualityIssue>)> = (1..column_count)
        .into_par_iter()
        .map(|col| decide_column(&header[col], col, &sample_rows_raw))
        .collect();

    let mut columns = Vec::with_capacity(column_count);
    columns.push(ColumnSchema {
        name: header.first().cloned().unwrap_or_else(|| "axis".to_string()),
        header_index: 0,
        role: ColumnRole::Axis,
    });

    let mut issues = Vec::new();
    for (col, (role, issue)) in decisions.into_iter().enumerate() {
        let header_index = col + 1;
        columns.push(ColumnSchema {
            name: header[header_index].clone(),
            header_index,
            role,
        });
        if let Some(issue) = issue {
            issues.push(issue);
        }
    }

    let numeric_count = columns
        .iter()
        .filter(|c| matches!(c.role, ColumnRole::Numeric(_)))
        .count();
    if numeric_count == 0 {
        return Err(Error::NoNumericColumns);
    }

    debug!(
        target: "filter",
        sampled = sample_rows_raw.len(),
        retained = numeric_count,
        dropped = issues.len(),
        "schema inferred from prefix sample"
    );

    Ok((Schema { axis_kind, columns }, issues))
}

fn infer_axis_kind(sample_rows: &[Vec<String>]) -> AxisKind {
    let samples: Vec<&str> = sample_rows
        .iter()
        .filter_map(|row| row.first())
        .map(String::as_str)
        .filter(|s| !s.trim().is_empty())
        .collect();
    if samples.is_empty() {
        return AxisKind::String;
    }
    // Probe each candidate kind in fixed order; a kind wins once every sample's natural probe
    // rank is no wider than it (an int sample also parses fine as a float, etc).
    for kind in [AxisKind::Int64, AxisKind::Float64, AxisKind::Instant] {
        if samples
            .iter()
            .all(|s| rank(probe_axis_kind(s)) <= rank(kind))
        {
            return kind;
        }
    }
    AxisKind::String
}

fn rank(kind: AxisKind) -> u8 {
    match kind {
        AxisKind::Int64 => 0,
        AxisKind::Float64 => 1,
        AxisKind::Instant => 2,
        AxisKind::String => 3,
    }
}

fn decide_column(
    name: &str,
    header_index: usize,
    sample_rows: &[Vec<String>],
) -> (ColumnRole, Option<QualityIssue>) {
    let raw: Vec<&str> = sample_rows
        .iter()
        .filter_map(|row| row.get(header_index))
        .map(String::as_str)
        .collect();
    let total = raw.len().max(1);
    let missing = raw.iter().filter(|s| s.trim().is_empty()).count();
    let missing_ratio = missing as f64 / total as f64;

    if missing == raw.len() {
        return (
            ColumnRole::Dropped,
            Some(QualityIssue::AllMissing {
                column: name.to_string(),
            }),
        );
    }

    let Some(kind) = NumericKind::infer(&raw) else {
        return (
            ColumnRole::Dropped,
            Some(QualityIssue::NonNumeric {
                column: name.to_string(),
            }),
        );
    };

    if missing_ratio > HIGH_MISSING_RATIO {
        return (
            ColumnRole::Numeric(kind),
            Some(QualityIssue::HighMissingRatio {
                column: name.to_string(),
                ratio: missing_ratio,
            }),
        );
    }

    (ColumnRole::Numeric(kind), None)
}
