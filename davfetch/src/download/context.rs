//! Shared state for one transfer attempt.
//!
//! A [`TransferContext`] is created per attempt, shared by reference with
//! every worker, and dropped when the attempt ends. It is never reused.
//!
//! The range cursor and the terminal error live behind one lock and are only
//! touched by two operations: [`TransferContext::claim_next`] and
//! [`TransferContext::record_error`]. Sink writes are serialized by the sink's
//! own lock, which is never held together with this one.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU16, AtomicU64, Ordering};

use parking_lot::Mutex;
use tracing::debug;

use super::progress::ProgressHandle;
use super::range::{ByteRange, RangePlan};
use crate::error::TransferError;

#[derive(Debug)]
struct CursorState {
    plan: RangePlan,
    error: Option<TransferError>,
}

/// Highest offset below which every byte has been written.
///
/// Ranges complete out of order; completed ranges above the watermark wait
/// in `pending` until the gap below them closes.
#[derive(Debug)]
struct Watermark {
    contiguous_end: u64,
    pending: BTreeMap<u64, u64>,
}

impl Watermark {
    fn new(start: u64) -> Self {
        Self {
            contiguous_end: start,
            pending: BTreeMap::new(),
        }
    }

    /// Mark `range` written and return the new contiguous end.
    fn complete(&mut self, range: ByteRange) -> u64 {
        if range.start > self.contiguous_end {
            self.pending.insert(range.start, range.end_exclusive());
            return self.contiguous_end;
        }
        self.contiguous_end = self.contiguous_end.max(range.end_exclusive());
        while let Some(entry) = self.pending.first_entry() {
            if *entry.key() > self.contiguous_end {
                break;
            }
            let end = entry.remove();
            self.contiguous_end = self.contiguous_end.max(end);
        }
        self.contiguous_end
    }
}

/// Shared, mutable state of one transfer attempt.
#[derive(Debug)]
pub struct TransferContext {
    url: String,
    resume_offset: u64,
    total_size: u64,
    chunk_size: u64,
    state: Mutex<CursorState>,
    watermark: Mutex<Watermark>,
    bytes_completed: AtomicU64,
    last_http_code: AtomicU16,
    progress: ProgressHandle,
}

impl TransferContext {
    /// Create the context for an attempt covering `[resume_offset, total_size)`.
    pub fn new(
        url: impl Into<String>,
        resume_offset: u64,
        total_size: u64,
        chunk_size: u64,
        progress: ProgressHandle,
    ) -> Self {
        let plan = RangePlan::new(resume_offset, total_size, chunk_size);
        Self {
            url: url.into(),
            resume_offset,
            total_size,
            chunk_size: plan.chunk_size(),
            state: Mutex::new(CursorState { plan, error: None }),
            watermark: Mutex::new(Watermark::new(resume_offset)),
            bytes_completed: AtomicU64::new(0),
            last_http_code: AtomicU16::new(0),
            progress,
        }
    }

    /// Remote URL being transferred.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Offset this attempt started from.
    pub fn resume_offset(&self) -> u64 {
        self.resume_offset
    }

    /// Total object size.
    pub fn total_size(&self) -> u64 {
        self.total_size
    }

    /// Bytes per range.
    pub fn chunk_size(&self) -> u64 {
        self.chunk_size
    }

    /// Progress handle shared with the caller.
    pub fn progress(&self) -> &ProgressHandle {
        &self.progress
    }

    /// Whether the caller asked to stop.
    pub fn is_cancelled(&self) -> bool {
        self.progress.is_cancelled()
    }

    /// Claim the next unclaimed range.
    ///
    /// Returns `None` once the plan is exhausted or a terminal error has been
    /// recorded; workers exit on `None`.
    pub fn claim_next(&self) -> Option<ByteRange> {
        let mut state = self.state.lock();
        if state.error.is_some() {
            return None;
        }
        let range = state.plan.next()?;
        debug!(url = %self.url, range = %range, "range claimed");
        Some(range)
    }

    /// Record a terminal error. Only the first error is kept.
    ///
    /// Returns `true` if this call recorded the error.
    pub fn record_error(&self, error: TransferError) -> bool {
        let mut state = self.state.lock();
        if state.error.is_some() {
            return false;
        }
        state.error = Some(error);
        true
    }

    /// Whether a terminal error has been recorded.
    pub fn has_error(&self) -> bool {
        self.state.lock().error.is_some()
    }

    /// Message of the recorded terminal error, if any.
    pub fn error_message(&self) -> Option<String> {
        self.state.lock().error.as_ref().map(|e| e.to_string())
    }

    /// Remove and return the recorded terminal error.
    pub fn take_error(&self) -> Option<TransferError> {
        self.state.lock().error.take()
    }

    /// Account for a range that has been written to the sink.
    ///
    /// The caller-visible counter follows the contiguous watermark, so bytes
    /// that a failed attempt later trims are never reported.
    pub fn record_written(&self, range: ByteRange, http_code: u16) {
        let contiguous_end = self.watermark.lock().complete(range);
        self.bytes_completed.fetch_add(range.len(), Ordering::SeqCst);
        self.last_http_code.store(http_code, Ordering::SeqCst);
        self.progress.advance_to(contiguous_end);
    }

    /// Account for a full-object body written at offset 0, ending the plan.
    pub fn record_full_object(&self, http_code: u16) {
        self.state.lock().plan.exhaust();
        if self.resume_offset < self.total_size {
            self.watermark
                .lock()
                .complete(ByteRange::new(self.resume_offset, self.total_size - 1));
        }
        let remaining = self.total_size.saturating_sub(self.resume_offset);
        self.bytes_completed.store(remaining, Ordering::SeqCst);
        self.last_http_code.store(http_code, Ordering::SeqCst);
        self.progress.advance_to(self.total_size);
    }

    /// Bytes written during this attempt.
    pub fn bytes_completed(&self) -> u64 {
        self.bytes_completed.load(Ordering::SeqCst)
    }

    /// Status code of the last successful write.
    pub fn last_http_code(&self) -> u16 {
        self.last_http_code.load(Ordering::SeqCst)
    }

    /// Highest offset below which every byte is persisted.
    pub fn persisted_watermark(&self) -> u64 {
        self.watermark.lock().contiguous_end
    }

    /// Whether every byte of `[resume_offset, total_size)` was written.
    pub fn is_complete(&self) -> bool {
        self.resume_offset + self.bytes_completed() >= self.total_size
    }
}
