//! Tail follower (C7), per §4.7: polls file size/mtime, extends the row index on growth, and
//! decides whether the current viewport should track the tail.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::thread::{self, JoinHandle};
use std::time::{Duration, SystemTime};

use crossbeam_channel::{bounded, select, tick, Sender};
use tracing::{debug, trace, warn};

use crate::axis::AxisKind;
use crate::error::Error;
use crate::index::{extend_sparse_index, RowIndex, SparseXIndex};

/// Caps the tail-rubber-banding effect on huge files, per §4.7.
pub const MAX_TAIL_THRESHOLD: u64 = 100_000;
const TAIL_THRESHOLD_RATIO: f64 = 0.05;

#[must_use]
pub fn tail_threshold(total_rows: u64) -> u64 {
    ((total_rows as f64 * TAIL_THRESHOLD_RATIO) as u64).min(MAX_TAIL_THRESHOLD)
}

/// Tracks the last observed `(size, mtime)` of the watched file; the pause/follow decision
/// itself lives with the engine, which owns the viewport the follower state feeds into.
struct FollowerState {
    last_size: AtomicU64,
    last_mtime_secs: AtomicU64,
}

impl FollowerState {
    fn new(size: u64, mtime: SystemTime) -> Self {
        Self {
            last_size: AtomicU64::new(size),
            last_mtime_secs: AtomicU64::new(to_secs(mtime)),
        }
    }
}

fn to_secs(t: SystemTime) -> u64 {
    t.duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// What the watcher observed and decided on one poll tick.
pub enum PollOutcome {
    /// The file grew; the index was extended by `appended` rows. `at_tail` reflects whether the
    /// engine's current viewport should follow the new tail.
    Grown { appended: u64, at_tail: bool },
    /// The file shrank: the caller must bump the epoch and rebuild from scratch.
    Truncated,
    /// The file's size is unchanged but its last row's bytes changed underneath us.
    InPlaceEdit,
    /// Nothing observable changed.
    Unchanged,
}

pub struct TailFollower {
    stop: Sender<()>,
    handle: Option<JoinHandle<()>>,
}

impl TailFollower {
    /// Spawns the watcher thread. It selects between a `POLL_INTERVAL` ticker and its own stop
    /// channel, matching the channel-oriented shutdown style used elsewhere in the engine.
    /// `on_tick` is invoked with the poll outcome on the worker thread's own stack; it is
    /// responsible for taking whatever lock it needs on the shared row/sparse indices.
    pub fn spawn(
        path: PathBuf,
        poll_interval: Duration,
        row_index: Arc<RwLock<RowIndex>>,
        sparse_index: Arc<RwLock<SparseXIndex>>,
        axis_kind: AxisKind,
        is_at_tail: Arc<dyn Fn(u64) -> bool + Send + Sync>,
        mut on_tick: impl FnMut(PollOutcome) + Send + 'static,
    ) -> Result<Self, Error> {
        let metadata = std::fs::metadata(&path)?;
        let state = FollowerState::new(metadata.len(), metadata.modified()?);
        let (stop_tx, stop_rx) = bounded::<()>(0);

        let handle = thread::spawn(move || {
            let ticker = tick(poll_interval);
            loop {
                select! {
                    recv(ticker) -> _ => {
                        let outcome = poll_once(&path, &state, &row_index, &sparse_index, axis_kind, &*is_at_tail);
                        on_tick(outcome);
                    }
                    recv(stop_rx) -> _ => return,
                }
            }
        });

        Ok(Self {
            stop: stop_tx,
            handle: Some(handle),
        })
    }
}

impl Drop for TailFollower {
    fn drop(&mut self) {
        let _ = self.stop.send(());
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn poll_once(
    path: &std::path::Path,
    state: &FollowerState,
    row_index: &RwLock<RowIndex>,
    sparse_index: &RwLock<SparseXIndex>,
    axis_kind: AxisKind,
    is_at_tail: &(dyn Fn(u64) -> bool + Send + Sync),
) -> PollOutcome {
    let metadata = match std::fs::metadata(path) {
        Ok(m) => m,
        Err(err) => {
            warn!(target: "follower", error = %err, "poll failed to stat file");
            return PollOutcome::Unchanged;
        }
    };
    let size = metadata.len();
    let mtime = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);
    let last_size = state.last_size.load(Ordering::SeqCst);

    if size > last_size {
        let appended = {
            let mut idx = row_index.write().unwrap();
            let before = idx.total_rows();
            match idx.append_from(path) {
                Ok(n) => n,
                Err(err) => {
                    warn!(target: "follower", error = %err, "append_from failed; index needs rebuild");
                    state.last_size.store(size, Ordering::SeqCst);
                    state.last_mtime_secs.store(to_secs(mtime), Ordering::SeqCst);
                    return PollOutcome::Truncated;
                }
            };
            let after = idx.total_rows();
            let snapshot = idx.clone();
            drop(idx);
            if after > before {
                let mut sparse = sparse_index.write().unwrap();
                let _ = extend_sparse_index(path, &snapshot, axis_kind, before, &mut sparse);
            }
            after - before
        };
        state.last_size.store(size, Ordering::SeqCst);
        state.last_mtime_secs.store(to_secs(mtime), Ordering::SeqCst);
        let total = row_index.read().unwrap().total_rows();
        let at_tail = is_at_tail(total);
        trace!(target: "follower", appended, at_tail, "file grew");
        PollOutcome::Grown { appended, at_tail }
    } else if size < last_size {
        debug!(target: "follower", "truncation detected");
        state.last_size.store(size, Ordering::SeqCst);
        state.last_mtime_secs.store(to_secs(mtime), Ordering::SeqCst);
        PollOutcome::Truncated
    } else if to_secs(mtime) > state.last_mtime_secs.load(Ordering::SeqCst) {
        state.last_mtime_secs.store(to_secs(mtime), Ordering::SeqCst);
        let changed = row_index
            .read()
            .unwrap()
            .last_row_bytes_changed(path)
            .unwrap_or(true);
        if changed {
            debug!(target: "follower", "in-place edit of last row detected");
            PollOutcome::InPlaceEdit
        } else {
            PollOutcome::Unchanged
        }
    } else {
        PollOutcome::Unchanged
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tail_threshold_caps_at_max() {
        assert_eq!(tail_threshold(10_000_000), MAX_TAIL_THRESHOLD);
    }

    #[test]
    fn tail_threshold_scales_with_row_count() {
        assert_eq!(tail_threshold(1_000), 50);
    }
}
