//! Trace assembler (C8): applies the downsampler to each retained numeric column over the
//! shared axis array, per §4.8.

use crate::downsample::downsample;
use crate::reader::ColumnarChunk;
use crate::viewport::Trace;

/// Builds one display trace per column in `chunk`, downsampling each to `n_out` points.
///
/// Duplicate consecutive axis values are collapsed to their first occurrence before
/// downsampling, so the output `xs` stays strictly increasing per the contract in §4.5.
#[must_use]
pub fn assemble(chunk: &ColumnarChunk, n_out: usize, minmax_ratio: usize) -> Vec<Trace> {
    let axis_coords: Vec<f64> = chunk.axis.iter().map(crate::axis::AxisValue::coord).collect();
    let kept = collapse_duplicate_axis(&axis_coords);

    chunk
        .columns
        .iter()
        .map(|column| {
            let xs: Vec<f64> = kept.iter().map(|&i| axis_coords[i]).collect();
            let ys: Vec<f64> = kept.iter().map(|&i| column.ys[i]).collect();
            let (out_xs, out_ys) = downsample(&xs, &ys, n_out, minmax_ratio);
            let gaps_present = out_ys.iter().any(|y| y.is_nan());
            Trace {
                name: column.name.clone(),
                xs: out_xs,
                ys: out_ys,
                gaps_present,
            }
        })
        .collect()
}

fn collapse_duplicate_axis(xs: &[f64]) -> Vec<usize> {
    let mut kept = Vec::with_capacity(xs.len());
    let mut last: Option<f64> = None;
    for (i, &x) in xs.iter().enumerate() {
        if last != Some(x) {
            kept.push(i);
            last = Some(x);
        }
    }
    kept
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::axis::AxisValue;
    use crate::reader::ColumnData;

    fn chunk(axis: Vec<i64>, ys: Vec<f64>) -> ColumnarChunk {
        ColumnarChunk {
            row_lo: 0,
            row_hi: axis.len() as u64,
            axis: axis.into_iter().map(AxisValue::Int64).collect(),
            columns: vec![ColumnData {
                name: "a".to_string(),
                ys,
            }],
            malformed_rows: 0,
            malformed_fields: 0,
        }
    }

    #[test]
    fn passthrough_produces_identical_series_under_budget() {
        let c = chunk(vec![0, 1, 2], vec![1.0, 1.5, 2.0]);
        let traces = assemble(&c, 4000, 4);
        assert_eq!(traces[0].xs, vec![0.0, 1.0, 2.0]);
        assert_eq!(traces[0].ys, vec![1.0, 1.5, 2.0]);
        assert!(!traces[0].gaps_present);
    }

    #[test]
    fn duplicate_axis_values_collapse_to_first() {
        let c = chunk(vec![0, 0, 1, 2], vec![1.0, 9.0, 2.0, 3.0]);
        let traces = assemble(&c, 4000, 4);
        assert_eq!(traces[0].xs, vec![0.0, 1.0, 2.0]);
        assert_eq!(traces[0].ys, vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn nan_marks_gaps_present() {
        let c = chunk(vec![0, 1, 2], vec![1.0, f64::NAN, 2.0]);
        let traces = assemble(&c, 4000, 4);
        assert!(traces[0].gaps_present);
    }
}
