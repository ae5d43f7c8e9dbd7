pub mod row_index;
pub mod sparse_x;

pub use row_index::{RowEntry, RowIndex};
pub use sparse_x::SparseXIndex;

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};

use crate::axis::{parse_axis_value, AxisKind, AxisValue};
use crate::error::Result;
use crate::reader::row_parser::split_row;

/// Builds the sparse index over an already-built row index, reading each sampled row's axis
/// field directly off disk through the row entries (no re-scan of the whole file).
pub fn build_sparse_index(
    path: &std::path::Path,
    row_index: &RowIndex,
    axis_kind: AxisKind,
    k: u64,
) -> Result<SparseXIndex> {
    let mut sparse = SparseXIndex::new(k);
    extend_sparse_index(path, row_index, axis_kind, 0, &mut sparse)?;
    Ok(sparse)
}

/// Extends `sparse` with samples for rows in `[start_row, row_index.total_rows())`, used both
/// for the initial build (`start_row = 0`) and for tail extension.
pub fn extend_sparse_index(
    path: &std::path::Path,
    row_index: &RowIndex,
    axis_kind: AxisKind,
    start_row: u64,
    sparse: &mut SparseXIndex,
) -> Result<()> {
    let mut file = File::open(path)?;
    let total = row_index.total_rows();
    if total == 0 {
        return Ok(());
    }
    let k = sparse.period();
    for row in start_row..total {
        let is_last = row == total - 1;
        if !(is_last || row == 0 || row % k == 0) {
            continue;
        }
        if let Some(value) = read_axis_at(&mut file, row_index, axis_kind, row)? {
            if is_last {
                sparse.force_sample(row, value)?;
            } else {
                sparse.sample_during_build(row, value)?;
            }
        }
    }
    Ok(())
}

/// Refines the coarse `(locate_lower, locate_upper)` sparse-index bounds down to the exact
/// inclusive row range for `[x_start, x_end]`, per §4.2's `range` operation: two `locate` calls
/// then a bounded linear scan (at most one sampling period, `K`, in each direction) against the
/// real file.
pub fn refine_range(
    path: &std::path::Path,
    row_index: &RowIndex,
    sparse: &SparseXIndex,
    axis_kind: AxisKind,
    x_start: &AxisValue,
    x_end: &AxisValue,
) -> Result<(u64, u64)> {
    let total = row_index.total_rows();
    if total == 0 {
        return Ok((0, 0));
    }
    let mut file = File::open(path)?;
    let k = sparse.period().max(1);
    let approx_lo = sparse.locate_lower(x_start);
    let approx_hi = sparse.locate_upper(x_end);

    let scan_lo_end = (approx_lo + k).min(total - 1);
    let row_lo = find_first_ge(&mut file, row_index, axis_kind, x_start, approx_lo, scan_lo_end)?
        .unwrap_or(approx_lo);

    let scan_hi_end = (approx_hi + k).min(total - 1);
    let row_hi_inclusive =
        find_last_le(&mut file, row_index, axis_kind, x_end, approx_hi, scan_hi_end)?
            .unwrap_or(approx_hi);

    let row_hi = (row_hi_inclusive + 1).min(total);
    Ok((row_lo.min(row_hi), row_hi))
}

/// Scans `[from, to]` inclusive for the first row whose axis value is `>= target`.
fn find_first_ge(
    file: &mut File,
    row_index: &RowIndex,
    axis_kind: AxisKind,
    target: &AxisValue,
    from: u64,
    to: u64,
) -> Result<Option<u64>> {
    for row in from..=to {
        if let Some(value) = read_axis_at(file, row_index, axis_kind, row)? {
            if value.partial_cmp(target) != Some(std::cmp::Ordering::Less) {
                return Ok(Some(row));
            }
        }
    }
    Ok(None)
}

/// Scans `[from, to]` inclusive for the last row whose axis value is `<= target`.
fn find_last_le(
    file: &mut File,
    row_index: &RowIndex,
    axis_kind: AxisKind,
    target: &AxisValue,
    from: u64,
    to: u64,
) -> Result<Option<u64>> {
    let mut best = None;
    for row in from..=to {
        if let Some(value) = read_axis_at(file, row_index, axis_kind, row)? {
            if value.partial_cmp(target) != Some(std::cmp::Ordering::Greater) {
                best = Some(row);
            } else {
                break;
            }
        }
    }
    Ok(best)
}

fn read_axis_at(
    file: &mut File,
    row_index: &RowIndex,
    axis_kind: AxisKind,
    row: u64,
) -> Result<Option<AxisValue>> {
    let entry = row_index.entries[row as usize];
    file.seek(SeekFrom::Start(entry.offset))?;
    let mut buf = vec![0u8; entry.len as usize];
    file.read_exact(&mut buf)?;
    let line = String::from_utf8_lossy(&buf);
    let Some(axis_raw) = split_row(&line).next() else {
        return Ok(None);
    };
    Ok(parse_axis_value(axis_kind, &axis_raw))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::axis::AxisValue;
    use std::io::Write;

    fn write_tmp(contents: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        f.flush().unwrap();
        f
    }

    #[test]
    fn refine_range_finds_exact_inclusive_bounds() {
        let f = write_tmp("t,a\n0,1\n1,2\n2,3\n3,4\n4,5\n5,6\n6,7\n7,8\n8,9\n9,10\n");
        let row_index = RowIndex::build(f.path()).unwrap();
        let sparse = build_sparse_index(f.path(), &row_index, AxisKind::Int64, 2).unwrap();
        let (lo, hi) = refine_range(
            f.path(),
            &row_index,
            &sparse,
            AxisKind::Int64,
            &AxisValue::Int64(3),
            &AxisValue::Int64(6),
        )
        .unwrap();
        assert_eq!(lo, 3);
        assert_eq!(hi, 7);
    }
}
