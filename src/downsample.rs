//! MinMaxLTTB downsampler (C5), per §4.5: min-max preselection followed by LTTB refinement.

use tracing::trace;

/// Default ratio of preselection candidates to final output points.
pub const DEFAULT_MINMAX_RATIO: usize = 4;

/// Reduces `(xs, ys)` to at most `n_out` points, preserving the first and last index, local
/// extrema, and NaN gaps. Returns the input unchanged if `xs.len() <= n_out`.
#[must_use]
pub fn downsample(xs: &[f64], ys: &[f64], n_out: usize, minmax_ratio: usize) -> (Vec<f64>, Vec<f64>) {
    debug_assert_eq!(xs.len(), ys.len());
    let len = xs.len();
    if len <= n_out {
        return (xs.to_vec(), ys.to_vec());
    }
    if n_out <= 2 || len < 3 {
        return first_last(xs, ys);
    }

    let candidates = minmax_preselect(ys, n_out, minmax_ratio);
    trace!(
        target: "downsample",
        input_len = len,
        candidates = candidates.len(),
        n_out,
        "minmax preselection complete"
    );
    let selected = lttb_refine(xs, ys, &candidates, n_out);
    let out_xs: Vec<f64> = selected.iter().map(|&i| xs[i]).collect();
    let out_ys: Vec<f64> = selected.iter().map(|&i| ys[i]).collect();
    (out_xs, out_ys)
}

fn first_last(xs: &[f64], ys: &[f64]) -> (Vec<f64>, Vec<f64>) {
    if xs.is_empty() {
        return (Vec::new(), Vec::new());
    }
    let last = xs.len() - 1;
    (vec![xs[0], xs[last]], vec![ys[0], ys[last]])
}

/// Partitions the interior into `n_out * minmax_ratio / 2` equal-width index buckets and keeps
/// each bucket's min and max `ys` index; an all-NaN bucket keeps its first index instead, so the
/// gap survives downstream. Always includes index 0 and the last index.
fn minmax_preselect(ys: &[f64], n_out: usize, minmax_ratio: usize) -> Vec<usize> {
    let len = ys.len();
    let last = len - 1;
    let bucket_count = (n_out * minmax_ratio / 2).max(1);
    let bucket_width = (len as f64 / bucket_count as f64).max(1.0);

    let mut candidates = vec![0usize];
    for bucket in 0..bucket_count {
        let start = ((bucket as f64) * bucket_width).round() as usize;
        let end = (((bucket + 1) as f64) * bucket_width).round() as usize;
        let start = start.clamp(0, len);
        let end = end.clamp(start, len);
        if start >= end {
            continue;
        }
        let mut min_idx = None;
        let mut max_idx = None;
        for i in start..end {
            if ys[i].is_nan() {
                continue;
            }
            if min_idx.is_none_or(|m: usize| ys[i] < ys[m]) {
                min_idx = Some(i);
            }
            if max_idx.is_none_or(|m: usize| ys[i] > ys[m]) {
                max_idx = Some(i);
            }
        }
        match (min_idx, max_idx) {
            (Some(a), Some(b)) => {
                candidates.push(a.min(b));
                candidates.push(a.max(b));
            }
            _ => candidates.push(start),
        }
    }
    candidates.push(last);
    candidates.sort_unstable();
    candidates.dedup();
    candidates
}

/// Largest-Triangle-Three-Buckets over the preselected candidate indices.
fn lttb_refine(xs: &[f64], ys: &[f64], candidates: &[usize], n_out: usize) -> Vec<usize> {
    if candidates.len() <= n_out {
        return candidates.to_vec();
    }
    let first = candidates[0];
    let last = *candidates.last().unwrap();
    let interior = &candidates[1..candidates.len() - 1];
    let bucket_count = n_out - 2;
    let bucket_width = (interior.len() as f64 / bucket_count as f64).max(1.0);

    let mut selected = vec![first];
    let mut prev = first;
    for bucket in 0..bucket_count {
        let start = ((bucket as f64) * bucket_width).round() as usize;
        let end = (((bucket + 1) as f64) * bucket_width).round() as usize;
        let start = start.clamp(0, interior.len());
        let end = end.clamp(start, interior.len());
        if start >= end {
            continue;
        }
        let next_start = (((bucket + 1) as f64) * bucket_width).round() as usize;
        let next_end = (((bucket + 2) as f64) * bucket_width).round() as usize;
        let next_start = next_start.clamp(0, interior.len());
        let next_end = next_end.clamp(next_start, interior.len());
        let next_avg = if next_start < next_end {
            average_point(xs, ys, &interior[next_start..next_end])
        } else {
            (xs[last], ys[last])
        };

        let mut best_idx = interior[start];
        let mut best_area = -1.0f64;
        for &candidate in &interior[start..end] {
            let area = triangle_area(xs[prev], ys[prev], xs[candidate], ys[candidate], next_avg.0, next_avg.1);
            if area > best_area {
                best_area = area;
                best_idx = candidate;
            }
        }
        selected.push(best_idx);
        prev = best_idx;
    }
    selected.push(last);
    selected.dedup();
    selected
}

fn average_point(xs: &[f64], ys: &[f64], indices: &[usize]) -> (f64, f64) {
    let mut x_sum = 0.0;
    let mut y_sum = 0.0;
    let mut count = 0.0;
    for &i in indices {
        x_sum += xs[i];
        if !ys[i].is_nan() {
            y_sum += ys[i];
            count += 1.0;
        }
    }
    let n = indices.len() as f64;
    let avg_y = if count > 0.0 { y_sum / count } else { f64::NAN };
    (x_sum / n.max(1.0), avg_y)
}

fn triangle_area(x_a: f64, y_a: f64, x_j: f64, y_j: f64, x_avg: f64, y_avg: f64) -> f64 {
    if y_a.is_nan() || y_j.is_nan() || y_avg.is_nan() {
        return 0.0;
    }
    0.5 * ((x_a - x_avg) * (y_j - y_a) - (x_a - x_j) * (y_avg - y_a)).abs()
}
