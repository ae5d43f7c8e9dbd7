//! Engine façade (C9), per §4.9: binds C1–C8 into the public surface the presentation layer
//! calls.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use serde::Serialize;
use tracing::info;

use crate::assembler::assemble;
use crate::axis::{AxisKind, AxisValue};
use crate::coordinator::{Coordinator, FetchResult, DEFAULT_DEBOUNCE_DELAY, DEFAULT_THROTTLE_INTERVAL};
use crate::error::Result;
use crate::filter::infer_schema;
use crate::follower::{tail_threshold, PollOutcome, TailFollower};
use crate::index::{build_sparse_index, refine_range, RowIndex, SparseXIndex};
use crate::options::EngineOptions;
use crate::reader::read_range;
use crate::schema::{ColumnRole, QualityIssue, Schema};
use crate::viewport::{FetchOutcome, RequestToken, Viewport};

/// Sampling period for the sparse x-index, per §3.
const SPARSE_K: u64 = 1_000;
/// Upper bound on rows materialized by a single fetch, per §5's clipping provision.
const MAX_VIEWPORT_ROWS: u64 = 2_000_000;

/// Schema and row-count snapshot returned by [`Handle::schema`]. Serializable so a
/// presentation layer can ship it to a UI process as JSON.
#[derive(Debug, Clone, Serialize)]
pub struct SchemaInfo {
    pub axis_kind: AxisKind,
    pub columns: Vec<(String, bool)>,
    pub total_rows: u64,
    pub axis_range: Option<(AxisValue, AxisValue)>,
}

struct EngineInner {
    path: PathBuf,
    row_index: Arc<RwLock<RowIndex>>,
    sparse_index: Arc<RwLock<SparseXIndex>>,
    schema: Schema,
    quality: Vec<QualityIssue>,
    options: EngineOptions,
    epoch: Arc<AtomicU64>,
    coordinator: Coordinator,
    follower: Mutex<Option<TailFollower>>,
    follow_enabled: AtomicBool,
    paused: AtomicBool,
    last_rendered_row_hi: Arc<AtomicU64>,
    last_request: Mutex<Option<(AxisValue, AxisValue, RequestToken)>>,
    closed: AtomicBool,
}

/// A handle to an open engine. Cloning shares the same underlying engine; the engine is torn
/// down when the last clone drops, or earlier via [`Handle::close`].
#[derive(Clone)]
pub struct Handle {
    inner: Arc<EngineInner>,
}

impl std::fmt::Debug for Handle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Handle").finish_non_exhaustive()
    }
}

/// Entry point: binds C1–C8 behind the façade described in §4.9.
pub struct Engine;

impl Engine {
    /// Opens `path`, builds the row index / column schema / sparse x-index, and spawns the
    /// viewport coordinator (and, if `options.follow`, the tail follower).
    ///
    /// # Errors
    ///
    /// Returns `EmptyFile`, `NoHeader`, `NoNumericColumns`, `NonMonotonicAxis`, or `Io`, per §7.
    pub fn open(
        path: impl Into<PathBuf>,
        options: EngineOptions,
        callback: impl Fn(FetchOutcome) + Send + Sync + 'static,
    ) -> Result<Handle> {
        let path = path.into();
        let row_index = RowIndex::build(&path)?;
        let (schema, quality) =
            infer_schema(&path, &row_index, options.sample_rows_min, options.sample_ratio)?;
        let sparse_index = build_sparse_index(&path, &row_index, schema.axis_kind, SPARSE_K)?;

        info!(
            target: "index",
            total_rows = row_index.total_rows(),
            columns = schema.numeric_columns().count(),
            "engine opened"
        );

        let row_index = Arc::new(RwLock::new(row_index));
        let sparse_index = Arc::new(RwLock::new(sparse_index));
        let epoch = Arc::new(AtomicU64::new(0));
        let last_rendered_row_hi = Arc::new(AtomicU64::new(0));

        let fetch = build_fetch_fn(
            path.clone(),
            Arc::clone(&row_index),
            Arc::clone(&sparse_index),
            schema.clone(),
            options.max_display_points,
            options.minmax_ratio,
            Arc::clone(&last_rendered_row_hi),
        );

        let coordinator = Coordinator::spawn(
            Arc::clone(&epoch),
            fetch,
            Arc::new(callback),
            DEFAULT_THROTTLE_INTERVAL,
            DEFAULT_DEBOUNCE_DELAY,
        );

        let inner = Arc::new(EngineInner {
            path: path.clone(),
            row_index: Arc::clone(&row_index),
            sparse_index: Arc::clone(&sparse_index),
            schema,
            quality,
            options: options.clone(),
            epoch: Arc::clone(&epoch),
            coordinator,
            follower: Mutex::new(None),
            follow_enabled: AtomicBool::new(options.follow),
            paused: AtomicBool::new(false),
            last_rendered_row_hi: Arc::clone(&last_rendered_row_hi),
            last_request: Mutex::new(None),
            closed: AtomicBool::new(false),
        });

        if options.follow {
            let weak = Arc::downgrade(&inner);
            let is_at_tail = {
                let last_rendered_row_hi = Arc::clone(&last_rendered_row_hi);
                Arc::new(move |total: u64| {
                    let rendered = last_rendered_row_hi.load(Ordering::SeqCst);
                    total.saturating_sub(rendered) <= tail_threshold(total)
                })
            };
            let follower = TailFollower::spawn(
                path,
                options.poll_interval,
                Arc::clone(&row_index),
                Arc::clone(&sparse_index),
                inner.schema.axis_kind,
                is_at_tail,
                move |outcome| {
                    if let Some(inner) = weak.upgrade() {
                        handle_tick(&inner, outcome);
                    }
                },
            )?;
            *inner.follower.lock().unwrap() = Some(follower);
        }

        Ok(Handle { inner })
    }
}

impl Handle {
    /// Submits a viewport request. Non-blocking; deduplicates consecutive identical bounds.
    ///
    /// # Errors
    ///
    /// Returns `HandleClosed` if the handle was already closed.
    pub fn request_viewport(&self, x_start: AxisValue, x_end: AxisValue) -> Result<RequestToken> {
        if self.inner.closed.load(Ordering::SeqCst) {
            return Err(crate::error::Error::HandleClosed);
        }

        let mut last = self.inner.last_request.lock().unwrap();
        if let Some((prev_start, prev_end, prev_token)) = last.as_ref() {
            if *prev_start == x_start && *prev_end == x_end {
                return Ok(*prev_token);
            }
        }

        if self.inner.follow_enabled.load(Ordering::SeqCst) {
            let total = self.inner.row_index.read().unwrap().total_rows();
            let sparse = self.inner.sparse_index.read().unwrap();
            let approx_row = sparse.locate_upper(&x_end);
            let at_tail = total.saturating_sub(approx_row) <= tail_threshold(total);
            if !at_tail {
                self.inner.paused.store(true, Ordering::SeqCst);
            }
        }

        let token = self.inner.coordinator.request(Viewport {
            x_start: x_start.clone(),
            x_end: x_end.clone(),
        });
        *last = Some((x_start, x_end, token));
        Ok(token)
    }

    /// Enables or disables follow mode. Re-enabling clears the auto-pause set by a manual pan.
    pub fn set_follow(&self, enabled: bool) {
        self.inner.follow_enabled.store(enabled, Ordering::SeqCst);
        if enabled {
            self.inner.paused.store(false, Ordering::SeqCst);
        }
    }

    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.inner.paused.load(Ordering::SeqCst)
    }

    /// Bumps the epoch, rebuilds the row/sparse index from scratch, and re-emits the current
    /// viewport. Does not change the paused-follow state (an explicitly resolved open question).
    ///
    /// # Errors
    ///
    /// Returns `HandleClosed` if the handle was already closed, or `Io` if the rebuild fails
    /// to read the file.
    pub fn reload(&self) -> Result<()> {
        if self.inner.closed.load(Ordering::SeqCst) {
            return Err(crate::error::Error::HandleClosed);
        }
        rebuild_indices(&self.inner)?;
        self.inner.coordinator.bump_epoch();
        reissue_current_viewport(&self.inner);
        Ok(())
    }

    /// Stops the follower thread and marks the handle closed. The coordinator's worker thread
    /// stops when the last clone of this handle drops.
    pub fn close(&self) {
        self.inner.closed.store(true, Ordering::SeqCst);
        self.inner.follower.lock().unwrap().take();
    }

    #[must_use]
    pub fn schema(&self) -> SchemaInfo {
        let row_index = self.inner.row_index.read().unwrap();
        let sparse = self.inner.sparse_index.read().unwrap();
        SchemaInfo {
            axis_kind: self.inner.schema.axis_kind,
            columns: self
                .inner
                .schema
                .columns
                .iter()
                .map(|c| (c.name.clone(), matches!(c.role, ColumnRole::Numeric(_))))
                .collect(),
            total_rows: row_index.total_rows(),
            axis_range: sparse
                .first_axis_value()
                .cloned()
                .zip(sparse.last_axis_value().cloned()),
        }
    }

    #[must_use]
    pub fn quality(&self) -> Vec<QualityIssue> {
        self.inner.quality.clone()
    }
}

fn build_fetch_fn(
    path: PathBuf,
    row_index: Arc<RwLock<RowIndex>>,
    sparse_index: Arc<RwLock<SparseXIndex>>,
    schema: Schema,
    max_display_points: usize,
    minmax_ratio: usize,
    last_rendered_row_hi: Arc<AtomicU64>,
) -> Arc<crate::coordinator::FetchFn> {
    Arc::new(move |viewport: &Viewport| -> Result<FetchResult> {
        let row_index = row_index.read().unwrap();
        let sparse = sparse_index.read().unwrap();

        let total = row_index.total_rows();
        if total == 0 {
            return Ok(empty_result(viewport));
        }
        let axis_lo = sparse
            .first_axis_value()
            .cloned()
            .unwrap_or(AxisValue::Int64(0));
        let axis_hi = sparse
            .last_axis_value()
            .cloned()
            .unwrap_or(AxisValue::Int64(0));
        let normalized = viewport.clone().normalize(&axis_lo, &axis_hi);

        let (row_lo, mut row_hi) = refine_range(
            &path,
            &row_index,
            &sparse,
            schema.axis_kind,
            &normalized.x_start,
            &normalized.x_end,
        )?;

        let mut clipped = false;
        if row_hi - row_lo > MAX_VIEWPORT_ROWS {
            row_hi = row_lo + MAX_VIEWPORT_ROWS;
            clipped = true;
        }

        let chunk = read_range(&path, &row_index, &schema, row_lo, row_hi)?;
        last_rendered_row_hi.store(row_hi, Ordering::SeqCst);

        let traces = assemble(&chunk, max_display_points, minmax_ratio);
        let x_start = chunk.axis.first().cloned().unwrap_or(normalized.x_start);
        let x_end = chunk.axis.last().cloned().unwrap_or(normalized.x_end);

        Ok(FetchResult {
            x_start,
            x_end,
            clipped,
            traces,
            total_rows: total,
            malformed_rows: chunk.malformed_rows,
        })
    })
}

fn empty_result(viewport: &Viewport) -> FetchResult {
    FetchResult {
        x_start: viewport.x_start.clone(),
        x_end: viewport.x_end.clone(),
        clipped: false,
        traces: Vec::new(),
        total_rows: 0,
        malformed_rows: 0,
    }
}

fn rebuild_indices(inner: &EngineInner) -> Result<()> {
    // A file truncated to literally zero bytes has no header to parse; that is still a legal
    // state for an already-open handle, just an empty one, rather than an error to surface.
    let (fresh, sparse) = match RowIndex::build(&inner.path) {
        Ok(fresh) => {
            let sparse = build_sparse_index(&inner.path, &fresh, inner.schema.axis_kind, SPARSE_K)?;
            (fresh, sparse)
        }
        Err(crate::error::Error::EmptyFile) => (RowIndex::default(), SparseXIndex::new(SPARSE_K)),
        Err(err) => return Err(err),
    };
    *inner.row_index.write().unwrap() = fresh;
    *inner.sparse_index.write().unwrap() = sparse;
    Ok(())
}

fn reissue_current_viewport(inner: &EngineInner) {
    let last = inner.last_request.lock().unwrap().clone();
    if let Some((x_start, x_end, _)) = last {
        inner
            .coordinator
            .request(Viewport { x_start, x_end });
    }
}

fn handle_tick(inner: &EngineInner, outcome: PollOutcome) {
    match outcome {
        PollOutcome::Grown { at_tail, .. } => {
            let following = inner.follow_enabled.load(Ordering::SeqCst)
                && !inner.paused.load(Ordering::SeqCst);
            if at_tail && following {
                let last_start = inner
                    .last_request
                    .lock()
                    .unwrap()
                    .as_ref()
                    .map(|(s, _, _)| s.clone());
                let sparse = inner.sparse_index.read().unwrap();
                if let (Some(x_start), Some(x_end)) = (last_start, sparse.last_axis_value().cloned()) {
                    drop(sparse);
                    inner.coordinator.request(Viewport { x_start, x_end });
                }
            }
        }
        PollOutcome::Truncated => {
            if rebuild_indices(inner).is_ok() {
                inner.coordinator.bump_epoch();
                reissue_current_viewport(inner);
            }
        }
        PollOutcome::InPlaceEdit => {
            inner.coordinator.bump_epoch();
        }
        PollOutcome::Unchanged => {}
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::sync::mpsc;

    use super::*;

    fn write_tmp(contents: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        f.flush().unwrap();
        f
    }

    #[test]
    fn schema_info_serializes_to_json_for_a_ui_layer() {
        let f = write_tmp("t,a,b\n0,1.0,2.0\n1,1.5,2.5\n2,2.0,3.0\n");
        let (tx, _rx) = mpsc::channel();
        let handle = Engine::open(f.path(), EngineOptions::default(), move |outcome| {
            let _ = tx.send(outcome);
        })
        .unwrap();

        let info = handle.schema();
        let value: serde_json::Value = serde_json::to_value(&info).unwrap();
        assert_eq!(value["total_rows"], 3);
        assert_eq!(value["axis_kind"], "Int64");
        assert_eq!(value["columns"].as_array().unwrap().len(), 2);

        handle.close();
    }
}
