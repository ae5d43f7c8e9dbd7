//! Viewport coordinator (C6), per §4.6: serializes interactive requests, throttles/debounces
//! them, and discards results that have gone stale by the time a fetch completes.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, trace};

use crate::axis::AxisValue;
use crate::error::Error;
use crate::viewport::{DiscardReason, FetchOutcome, RequestToken, Trace, Viewport};

pub const DEFAULT_THROTTLE_INTERVAL: Duration = Duration::from_millis(200);
pub const DEFAULT_DEBOUNCE_DELAY: Duration = Duration::from_millis(300);

/// What a fetch produces on success, before the coordinator wraps it into a callback payload.
pub struct FetchResult {
    pub x_start: AxisValue,
    pub x_end: AxisValue,
    pub clipped: bool,
    pub traces: Vec<Trace>,
    pub total_rows: u64,
    pub malformed_rows: u64,
}

pub type FetchFn = dyn Fn(&Viewport) -> Result<FetchResult, Error> + Send + Sync;
pub type CallbackFn = dyn Fn(FetchOutcome) + Send + Sync;

struct PendingRequest {
    token: RequestToken,
    version: u64,
    viewport: Viewport,
}

struct Mailbox {
    slot: Mutex<Option<PendingRequest>>,
    cv: Condvar,
    closed: Mutex<bool>,
}

impl Mailbox {
    fn new() -> Self {
        Self {
            slot: Mutex::new(None),
            cv: Condvar::new(),
            closed: Mutex::new(false),
        }
    }

    /// Overwrites any pending request; the mailbox holds only the latest user intent.
    fn push(&self, req: PendingRequest) {
        *self.slot.lock().unwrap() = Some(req);
        self.cv.notify_one();
    }

    fn close(&self) {
        *self.closed.lock().unwrap() = true;
        self.cv.notify_all();
    }

    fn is_closed(&self) -> bool {
        *self.closed.lock().unwrap()
    }

    /// Blocks until a request is pending, then waits a trailing debounce window for the
    /// *latest* request to settle, collapsing any rapid-fire intermediate changes.
    fn take_settled(&self, debounce: Duration) -> Option<PendingRequest> {
        let mut guard = self.slot.lock().unwrap();
        loop {
            if self.is_closed() {
                return None;
            }
            if guard.is_none() {
                guard = self.cv.wait(guard).unwrap();
                continue;
            }
            let (next_guard, timeout) = self.cv.wait_timeout(guard, debounce).unwrap();
            guard = next_guard;
            if timeout.timed_out() {
                return guard.take();
            }
            // Woken early: either a newer request replaced the slot (keep waiting for it to
            // settle) or we were closed.
        }
    }
}

/// Runs the C6 state machine on its own worker thread per handle.
pub struct Coordinator {
    mailbox: Arc<Mailbox>,
    next_token: AtomicU64,
    version: Arc<AtomicU64>,
    epoch: Arc<AtomicU64>,
    worker: Option<JoinHandle<()>>,
}

impl Coordinator {
    pub fn spawn(
        epoch: Arc<AtomicU64>,
        fetch: Arc<FetchFn>,
        callback: Arc<CallbackFn>,
        throttle: Duration,
        debounce: Duration,
    ) -> Self {
        let mailbox = Arc::new(Mailbox::new());
        let version = Arc::new(AtomicU64::new(0));
        let worker_mailbox = Arc::clone(&mailbox);
        let worker_epoch = Arc::clone(&epoch);
        let worker = thread::spawn(move || {
            worker_loop(&worker_mailbox, &worker_epoch, &*fetch, &*callback, throttle, debounce);
        });
        Self {
            mailbox,
            next_token: AtomicU64::new(1),
            version,
            epoch,
            worker: Some(worker),
        }
    }

    /// Submits a viewport request, returning its token. Non-blocking.
    pub fn request(&self, viewport: Viewport) -> RequestToken {
        let token = RequestToken(self.next_token.fetch_add(1, Ordering::Relaxed));
        let version = self.version.fetch_add(1, Ordering::SeqCst) + 1;
        trace!(target: "coordinator", token = token.0, version, "viewport requested");
        self.mailbox.push(PendingRequest {
            token,
            version,
            viewport,
        });
        token
    }

    /// Bumps the epoch, invalidating any in-flight or future-delivered result from a prior
    /// epoch, per §4.6's `any -> epoch-change -> IDLE` transition.
    pub fn bump_epoch(&self) -> u64 {
        let next = self.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(target: "coordinator", epoch = next, "epoch bumped");
        next
    }

    #[must_use]
    pub fn current_epoch(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }
}

impl Drop for Coordinator {
    fn drop(&mut self) {
        self.mailbox.close();
        if let Some(handle) = self.worker.take() {
            let _ = handle.join();
        }
    }
}

fn worker_loop(
    mailbox: &Mailbox,
    epoch: &AtomicU64,
    fetch: &FetchFn,
    callback: &CallbackFn,
    throttle: Duration,
    debounce: Duration,
) {
    let mut last_completion = Instant::now() - throttle;
    loop {
        let Some(mut req) = mailbox.take_settled(debounce) else {
            return; // mailbox closed
        };

        // Throttle from completion of the previous fetch, not from trigger.
        let since = last_completion.elapsed();
        if since < throttle {
            thread::sleep(throttle - since);
        }

        loop {
            let epoch_before = epoch.load(Ordering::SeqCst);
            trace!(target: "coordinator", token = req.token.0, epoch = epoch_before, "fetch starting");
            let outcome = fetch(&req.viewport);
            last_completion = Instant::now();
            let epoch_after = epoch.load(Ordering::SeqCst);

            if epoch_after != epoch_before {
                callback(FetchOutcome::Discarded {
                    token: req.token,
                    epoch: epoch_after,
                    reason: DiscardReason::EpochChanged,
                });
                break;
            }

            let newer = mailbox.slot.lock().unwrap().take();
            match newer {
                Some(newer_req) if newer_req.version > req.version => {
                    callback(FetchOutcome::Discarded {
                        token: req.token,
                        epoch: epoch_after,
                        reason: DiscardReason::Superseded,
                    });
                    req = newer_req;
                    continue; // FETCHING -> FETCHING: fetch the newer one immediately
                }
                other => {
                    deliver(outcome, &req, epoch_after, callback);
                    if let Some(pending) = other {
                        mailbox.push(pending);
                    }
                    break;
                }
            }
        }
    }
}

fn deliver(outcome: Result<FetchResult, Error>, req: &PendingRequest, epoch: u64, callback: &CallbackFn) {
    match outcome {
        Ok(result) => callback(FetchOutcome::Delivered {
            token: req.token,
            epoch,
            x_start: result.x_start,
            x_end: result.x_end,
            clipped: result.clipped,
            traces: result.traces,
            total_rows: result.total_rows,
            malformed_rows: result.malformed_rows,
        }),
        Err(err) => callback(FetchOutcome::Discarded {
            token: req.token,
            epoch,
            reason: DiscardReason::IoError(err.to_string()),
        }),
    }
}
