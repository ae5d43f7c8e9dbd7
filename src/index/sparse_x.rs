//! Sparse x-value index (C2): periodic `(axis_value, row_index)` samples enabling an
//! O(log n) axis-value → row lookup without scanning the file.

use crate::axis::AxisValue;
use crate::error::{Error, Result};

/// Default sampling period: one sample emitted per this many rows.
pub const DEFAULT_K: u64 = 1_000;

#[derive(Debug, Clone)]
struct Sample {
    axis_value: AxisValue,
    row_index: u64,
}

/// Strictly (non-decreasing) ordered samples of `(axis_value, row_index)`.
#[derive(Debug, Clone, Default)]
pub struct SparseXIndex {
    samples: Vec<Sample>,
    k: u64,
}

impl SparseXIndex {
    #[must_use]
    pub fn new(k: u64) -> Self {
        Self {
            samples: Vec::new(),
            k: k.max(1),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// The sampling period `K` this index was built with, used to bound the linear refinement
    /// scan in [`crate::index::refine_range`].
    #[must_use]
    pub fn period(&self) -> u64 {
        self.k
    }

    #[must_use]
    pub fn last_row(&self) -> Option<u64> {
        self.samples.last().map(|s| s.row_index)
    }

    #[must_use]
    pub fn first_axis_value(&self) -> Option<&AxisValue> {
        self.samples.first().map(|s| &s.axis_value)
    }

    #[must_use]
    pub fn last_axis_value(&self) -> Option<&AxisValue> {
        self.samples.last().map(|s| &s.axis_value)
    }

    /// Called during index build/extension for every row; appends a sample every `k` rows,
    /// and always for the very first and very last row seen so far (the caller re-adds the
    /// final row once the stream is known to have ended, via [`SparseXIndex::finalize_tail`]).
    ///
    /// # Errors
    ///
    /// Returns `NonMonotonicAxis` if `axis_value` orders before the previous sample.
    pub fn sample_during_build(
        &mut self,
        row_index: u64,
        axis_value: AxisValue,
    ) -> Result<()> {
        let due = row_index == 0 || row_index % self.k == 0;
        if !due {
            return Ok(());
        }
        self.push_checked(row_index, axis_value)
    }

    /// Forces a sample for the given row regardless of `k`-alignment; used to guarantee the
    /// last indexed row is always present, per the invariant in §3.
    ///
    /// # Errors
    ///
    /// Returns `NonMonotonicAxis` if `axis_value` orders before the previous sample.
    pub fn force_sample(&mut self, row_index: u64, axis_value: AxisValue) -> Result<()> {
        if self.samples.last().is_some_and(|s| s.row_index == row_index) {
            return Ok(());
        }
        self.push_checked(row_index, axis_value)
    }

    fn push_checked(&mut self, row_index: u64, axis_value: AxisValue) -> Result<()> {
        if let Some(last) = self.samples.last() {
            if let Some(ordering) = axis_value.partial_cmp(&last.axis_value) {
                if ordering == std::cmp::Ordering::Less {
                    return Err(Error::NonMonotonicAxis { row_index });
                }
            }
        }
        self.samples.push(Sample {
            axis_value,
            row_index,
        });
        Ok(())
    }

    /// Binary search for the largest sample with `axis_value <= target`; returns that
    /// sample's row index, or `0` if every sample is greater than `target`. For axis kinds
    /// that don't support ordering (opaque strings), returns `0`.
    #[must_use]
    pub fn locate_lower(&self, target: &AxisValue) -> u64 {
        if self.samples.is_empty() {
            return 0;
        }
        if matches!(target, AxisValue::String(_)) {
            return 0;
        }
        let mut lo = 0usize;
        let mut hi = self.samples.len();
        while lo < hi {
            let mid = (lo + hi) / 2;
            match self.samples[mid].axis_value.partial_cmp(target) {
                Some(std::cmp::Ordering::Less | std::cmp::Ordering::Equal) => lo = mid + 1,
                _ => hi = mid,
            }
        }
        if lo == 0 {
            self.samples[0].row_index
        } else {
            self.samples[lo - 1].row_index
        }
    }

    /// Binary search for the smallest sample with `axis_value >= target`; returns that
    /// sample's row index, or the last row if every sample is smaller than `target`.
    #[must_use]
    pub fn locate_upper(&self, target: &AxisValue) -> u64 {
        if self.samples.is_empty() {
            return 0;
        }
        if matches!(target, AxisValue::String(_)) {
            return self.samples.last().map_or(0, |s| s.row_index);
        }
        let mut lo = 0usize;
        let mut hi = self.samples.len();
        while lo < hi {
            let mid = (lo + hi) / 2;
            match self.samples[mid].axis_value.partial_cmp(target) {
                Some(std::cmp::Ordering::Less) => lo = mid + 1,
                _ => hi = mid,
            }
        }
        if lo >= self.samples.len() {
            self.samples.last().map_or(0, |s| s.row_index)
        } else {
            self.samples[lo].row_index
        }
    }
}
