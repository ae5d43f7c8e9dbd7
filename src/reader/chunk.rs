//! The columnar slice materialized by a ranged read (C3's output).

use crate::axis::AxisValue;

/// One retained numeric column's values for a chunk, stored as `f64` regardless of the
/// declared storage width. The downsampling pipeline operates in floating point; the
/// declared width is surfaced only through `Schema` for introspection.
#[derive(Debug, Clone)]
pub struct ColumnData {
    pub name: String,
    pub ys: Vec<f64>,
}

/// A materialized, half-open row range `[row_lo, row_hi)` with the axis and every retained
/// numeric column's values, row-aligned.
#[derive(Debug, Clone)]
pub struct ColumnarChunk {
    pub row_lo: u64,
    pub row_hi: u64,
    pub axis: Vec<AxisValue>,
    pub columns: Vec<ColumnData>,
    pub malformed_rows: u64,
    pub malformed_fields: u64,
}

impl ColumnarChunk {
    #[must_use]
    pub fn row_count(&self) -> usize {
        self.axis.len()
    }
}
