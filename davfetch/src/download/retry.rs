//! Retry budgets for range fetches and whole transfers.
//!
//! Two nested loops share one [`RetryPolicy`]:
//!
//! - **Range level**: a worker retries the same claimed range up to
//!   `max_attempts_per_range` times, waiting `per_attempt_backoff` between
//!   attempts.
//! - **Transfer level**: the coordinator re-runs the whole transfer up to
//!   `max_attempts_whole_transfer` times, spreading `total_backoff_budget`
//!   evenly across the waits.
//!
//! All waits are slept in small slices so a raised cancellation flag is
//! noticed within one slice instead of after a multi-second backoff.

use std::thread;
use std::time::Duration;

// =============================================================================
// Retry Policy Constants
// =============================================================================

/// Default attempts per range (including the first).
pub const DEFAULT_RANGE_ATTEMPTS: u32 = 6;

/// Default wait between attempts at the same range (5 seconds).
pub const DEFAULT_RANGE_BACKOFF_SECS: u64 = 5;

/// Default whole-transfer attempts (including the first).
pub const DEFAULT_TRANSFER_ATTEMPTS: u32 = 3;

/// Default total wait spread across whole-transfer retries (60 seconds).
pub const DEFAULT_TRANSFER_WAIT_SECS: u64 = 60;

/// Number of slices a backoff wait is divided into for cancellation checks.
pub const BACKOFF_SLICES: u32 = 50;

/// Retry budgets for one transfer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum attempts at a single range (including the initial attempt).
    pub max_attempts_per_range: u32,
    /// Wait between attempts at the same range.
    pub per_attempt_backoff: Duration,
    /// Maximum whole-transfer attempts (including the initial attempt).
    pub max_attempts_whole_transfer: u32,
    /// Total wait spread across all whole-transfer retries.
    pub total_backoff_budget: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts_per_range: DEFAULT_RANGE_ATTEMPTS,
            per_attempt_backoff: Duration::from_secs(DEFAULT_RANGE_BACKOFF_SECS),
            max_attempts_whole_transfer: DEFAULT_TRANSFER_ATTEMPTS,
            total_backoff_budget: Duration::from_secs(DEFAULT_TRANSFER_WAIT_SECS),
        }
    }
}

impl RetryPolicy {
    /// Policy with a single attempt at every level.
    pub fn none() -> Self {
        Self {
            max_attempts_per_range: 1,
            per_attempt_backoff: Duration::ZERO,
            max_attempts_whole_transfer: 1,
            total_backoff_budget: Duration::ZERO,
        }
    }

    /// Set the range-level budget.
    pub fn with_range_attempts(mut self, max_attempts: u32, backoff: Duration) -> Self {
        self.max_attempts_per_range = max_attempts.max(1);
        self.per_attempt_backoff = backoff;
        self
    }

    /// Set the transfer-level budget.
    pub fn with_transfer_attempts(mut self, max_attempts: u32, total_wait: Duration) -> Self {
        self.max_attempts_whole_transfer = max_attempts.max(1);
        self.total_backoff_budget = total_wait;
        self
    }

    /// Delay before retrying a range after failed attempt `attempt` (1-based).
    ///
    /// Returns `None` when the range budget is spent.
    pub fn range_delay(&self, attempt: u32) -> Option<Duration> {
        if attempt < self.max_attempts_per_range.max(1) {
            Some(self.per_attempt_backoff)
        } else {
            None
        }
    }

    /// Delay before re-running the transfer after failed attempt `attempt` (1-based).
    ///
    /// Returns `None` when the transfer budget is spent.
    pub fn transfer_delay(&self, attempt: u32) -> Option<Duration> {
        let max_attempts = self.max_attempts_whole_transfer.max(1);
        if attempt >= max_attempts {
            return None;
        }
        Some(self.total_backoff_budget / (max_attempts - 1))
    }
}

/// Sleep for `total`, checking `cancelled` before each of `slices` slices.
///
/// Returns `false` as soon as cancellation is observed, `true` once the full
/// wait has elapsed.
pub fn sleep_in_slices(total: Duration, slices: u32, cancelled: impl Fn() -> bool) -> bool {
    let slices = slices.max(1);
    let slice = total / slices;
    for _ in 0..slices {
        if cancelled() {
            return false;
        }
        if !slice.is_zero() {
            thread::sleep(slice);
        }
    }
    !cancelled()
}
