//! Progress and cancellation bridge between the engine and its caller.
//!
//! The caller owns a [`ProgressHandle`] and injects a clone into the engine.
//! The engine moves the byte counter forward as the contiguous persisted
//! prefix grows and polls the cancellation flag; the caller (typically a UI thread) reads the
//! counter and raises the flag. Everything is atomics, so any thread may read
//! or write at any time without blocking the transfer.
//!
//! [`ProgressReporter`] is an optional background thread that polls a handle
//! on an interval and forwards snapshots to a callback.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use super::orchestrator::TransferPhase;

/// Progress callback invoked by [`ProgressReporter`].
///
/// # Arguments
///
/// * `bytes_written` - Bytes durably written so far
/// * `total_bytes` - Total object size (0 while unknown)
/// * `phase` - Current coordinator phase
pub type ProgressCallback = Box<dyn Fn(u64, u64, TransferPhase) + Send + Sync>;

#[derive(Debug, Default)]
struct ProgressInner {
    bytes_written: AtomicU64,
    total_size: AtomicU64,
    cancelled: AtomicBool,
    phase: AtomicU8,
}

/// Shared progress counter and cancellation flag for one transfer.
///
/// Cloning is cheap and every clone observes the same state. Use one handle
/// per transfer so concurrent transfers never share counters.
#[derive(Debug, Clone, Default)]
pub struct ProgressHandle {
    inner: Arc<ProgressInner>,
}

impl ProgressHandle {
    /// Create a fresh handle with zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bytes durably written, including resumed bytes.
    ///
    /// Never decreases for the lifetime of the handle, across auto-retry
    /// attempts included.
    pub fn bytes_written(&self) -> u64 {
        self.inner.bytes_written.load(Ordering::SeqCst)
    }

    /// Total object size, or 0 while unknown.
    pub fn total_size(&self) -> u64 {
        self.inner.total_size.load(Ordering::SeqCst)
    }

    /// Progress as a ratio (0.0 to 1.0); 0.0 while the size is unknown.
    pub fn progress_ratio(&self) -> f64 {
        let total = self.total_size();
        if total == 0 {
            0.0
        } else {
            (self.bytes_written() as f64 / total as f64).min(1.0)
        }
    }

    /// Ask the engine to stop. Workers notice at their next poll point.
    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Current coordinator phase.
    pub fn phase(&self) -> TransferPhase {
        TransferPhase::from_u8(self.inner.phase.load(Ordering::SeqCst))
    }

    /// Raise the counter to `bytes`; lower values are ignored.
    pub(crate) fn advance_to(&self, bytes: u64) {
        self.inner.bytes_written.fetch_max(bytes, Ordering::SeqCst);
    }

    pub(crate) fn set_total(&self, total: u64) {
        self.inner.total_size.store(total, Ordering::SeqCst);
    }

    pub(crate) fn set_phase(&self, phase: TransferPhase) {
        self.inner.phase.store(phase as u8, Ordering::SeqCst);
    }
}

/// Periodic progress reporter.
///
/// Spawns a background thread that polls a [`ProgressHandle`] and invokes a
/// callback with the current snapshot. A final report is always delivered
/// when the reporter stops.
pub struct ProgressReporter {
    handle: Option<JoinHandle<()>>,
    done: Arc<AtomicBool>,
}

impl ProgressReporter {
    /// Start a new progress reporter.
    ///
    /// # Arguments
    ///
    /// * `progress` - Handle to poll
    /// * `callback` - Function to call with progress updates
    /// * `poll_interval` - How often to poll for updates
    pub fn start(
        progress: ProgressHandle,
        callback: ProgressCallback,
        poll_interval: Duration,
    ) -> Self {
        let done = Arc::new(AtomicBool::new(false));
        let done_clone = Arc::clone(&done);

        let handle = thread::spawn(move || {
            while !done_clone.load(Ordering::SeqCst) {
                callback(
                    progress.bytes_written(),
                    progress.total_size(),
                    progress.phase(),
                );
                thread::sleep(poll_interval);
            }

            // Final report
            callback(
                progress.bytes_written(),
                progress.total_size(),
                progress.phase(),
            );
        });

        Self {
            handle: Some(handle),
            done,
        }
    }

    /// Start a reporter with default 100ms poll interval.
    pub fn start_default(progress: ProgressHandle, callback: ProgressCallback) -> Self {
        Self::start(progress, callback, Duration::from_millis(100))
    }

    /// Stop the reporter and wait for the final report.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.done.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            handle.join().ok();
        }
    }
}

impl Drop for ProgressReporter {
    fn drop(&mut self) {
        self.shutdown();
    }
}
