//! Resume/retry coordinator.
//!
//! [`RangeDownloader`] drives one transfer through its phases:
//!
//! ```text
//! SizeUnknown ─► SizeResolved ─► LayoutChosen ─► Downloading ─┬─► Completed
//!      │                                         Resuming ────┤
//!      └─► (size unknown) single-shot GET ────────────────────┤
//!                                                             └─► Failed
//!                      AutoRetrying ◄── retryable failure ◄───┘
//! ```
//!
//! Each attempt re-reads local state, so bytes persisted by a failed attempt
//! are not fetched again. Whole-transfer retries are bounded by the
//! [`RetryPolicy`](super::RetryPolicy) transfer budget.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, error, info, warn};

use super::context::TransferContext;
use super::fetch::{fetch_whole, probe_range_support};
use super::progress::ProgressHandle;
use super::request::{LayoutKind, TransferRequest};
use super::retry::{sleep_in_slices, BACKOFF_SLICES};
use super::sink::{DirectSink, RangeSink, SplitLayout, SplitSink};
use super::strategy::{
    choose_kind, DownloadStrategy, ParallelStrategy, SequentialStrategy, StrategyKind,
};
use crate::config::{TransferConfig, MIB};
use crate::error::{TransferError, TransferFailure, TransferResult};
use crate::transport::{RemoteSize, TransportFactory};

/// Coordinator phase, readable through [`ProgressHandle::phase`].
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TransferPhase {
    #[default]
    SizeUnknown = 0,
    SizeResolved = 1,
    LayoutChosen = 2,
    Downloading = 3,
    Resuming = 4,
    AutoRetrying = 5,
    Completed = 6,
    Failed = 7,
}

impl TransferPhase {
    /// Decode a stored phase; unknown values map to `SizeUnknown`.
    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::SizeResolved,
            2 => Self::LayoutChosen,
            3 => Self::Downloading,
            4 => Self::Resuming,
            5 => Self::AutoRetrying,
            6 => Self::Completed,
            7 => Self::Failed,
            _ => Self::SizeUnknown,
        }
    }

    /// Whether the transfer has finished, successfully or not.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// Invoked once a split transfer is complete.
///
/// Platforms that can flag a directory as one logical file (an archive bit,
/// an extended attribute) do so here.
pub trait CompletionHook: Send + Sync {
    /// Called exactly once per completed split transfer.
    fn split_completed(&self, dir: &Path);
}

/// Result of a successful transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferOutcome {
    /// File (direct) or directory (split) holding the object.
    pub path: PathBuf,
    /// Layout used.
    pub layout: LayoutKind,
    /// How the last attempt fetched the data.
    pub strategy: StrategyKind,
    /// Object size.
    pub total_size: u64,
    /// Offset the last attempt resumed from.
    pub resumed_from: u64,
    /// Whole-transfer attempts made, including the successful one.
    pub attempts: u32,
    /// Number of part files, for split transfers.
    pub part_count: Option<u64>,
    /// Effective range size of the last attempt.
    pub chunk_size: u64,
    /// Workers used by the last attempt.
    pub workers: usize,
}

impl TransferOutcome {
    /// Bytes fetched by the last attempt.
    pub fn bytes_fetched(&self) -> u64 {
        self.total_size.saturating_sub(self.resumed_from)
    }
}

/// Failure of one attempt, with the bytes left persisted on disk.
#[derive(Debug)]
struct AttemptError {
    error: TransferError,
    persisted: u64,
}

impl AttemptError {
    /// Wrap an error raised while `persisted` bytes sit on disk.
    fn at(persisted: u64) -> impl FnOnce(TransferError) -> Self {
        move |error| Self { error, persisted }
    }
}

impl From<TransferError> for AttemptError {
    fn from(error: TransferError) -> Self {
        Self {
            error,
            persisted: 0,
        }
    }
}

/// Where one attempt writes, and how much of it is already there.
enum Placement {
    Direct { path: PathBuf, resume: u64 },
    Split { layout: SplitLayout, resume: u64 },
}

impl Placement {
    fn resume(&self) -> u64 {
        match self {
            Self::Direct { resume, .. } | Self::Split { resume, .. } => *resume,
        }
    }

    fn kind(&self) -> LayoutKind {
        match self {
            Self::Direct { .. } => LayoutKind::Direct,
            Self::Split { .. } => LayoutKind::Split,
        }
    }

    fn path(&self) -> &Path {
        match self {
            Self::Direct { path, .. } => path,
            Self::Split { layout, .. } => layout.dir(),
        }
    }
}

/// Chunked, parallel, resumable downloader.
///
/// Safe to share between threads; each call to [`download`](Self::download)
/// is an independent transfer with its own [`ProgressHandle`].
pub struct RangeDownloader {
    factory: Arc<dyn TransportFactory>,
    sizes: Arc<dyn RemoteSize>,
    config: TransferConfig,
    hook: Option<Arc<dyn CompletionHook>>,
}

impl RangeDownloader {
    /// Create a downloader.
    ///
    /// # Arguments
    ///
    /// * `factory` - Source of per-worker transports
    /// * `sizes` - Object size resolver
    /// * `config` - Engine tuning
    pub fn new(
        factory: Arc<dyn TransportFactory>,
        sizes: Arc<dyn RemoteSize>,
        config: TransferConfig,
    ) -> Self {
        Self {
            factory,
            sizes,
            config,
            hook: None,
        }
    }

    /// Create a downloader whose factory also resolves sizes.
    pub fn with_remote<R>(remote: Arc<R>, config: TransferConfig) -> Self
    where
        R: TransportFactory + RemoteSize + 'static,
    {
        let sizes: Arc<dyn RemoteSize> = remote.clone();
        Self::new(remote, sizes, config)
    }

    /// Set the hook run after a split transfer completes.
    pub fn with_completion_hook(mut self, hook: Arc<dyn CompletionHook>) -> Self {
        self.hook = Some(hook);
        self
    }

    /// Engine configuration.
    pub fn config(&self) -> &TransferConfig {
        &self.config
    }

    /// Fetch `request`, retrying the whole transfer on retryable failures.
    ///
    /// # Arguments
    ///
    /// * `request` - What to fetch and where
    /// * `progress` - Progress counter and cancellation flag for this transfer
    ///
    /// # Returns
    ///
    /// The outcome of the successful attempt, or the last error together
    /// with the number of bytes left persisted locally.
    pub fn download(
        &self,
        request: &TransferRequest,
        progress: &ProgressHandle,
    ) -> Result<TransferOutcome, TransferFailure> {
        let policy = &self.config.retry;
        let mut attempt = 1;

        loop {
            let started = Instant::now();
            let failure = match self.attempt(request, progress) {
                Ok(mut outcome) => {
                    outcome.attempts = attempt;
                    self.complete(&outcome, progress, started);
                    return Ok(outcome);
                }
                Err(failure) => failure,
            };

            let delay = if failure.error.is_transfer_retryable() {
                policy.transfer_delay(attempt)
            } else {
                None
            };

            let Some(delay) = delay else {
                return Err(self.fail(request, progress, failure, attempt));
            };

            warn!(
                url = %request.remote_url,
                attempt,
                max_attempts = policy.max_attempts_whole_transfer,
                persisted = failure.persisted,
                wait_secs = delay.as_secs_f64(),
                error = %failure.error,
                "transfer failed, retrying"
            );
            progress.set_phase(TransferPhase::AutoRetrying);

            if !sleep_in_slices(delay, BACKOFF_SLICES, || progress.is_cancelled()) {
                let cancelled = AttemptError {
                    error: TransferError::Cancelled,
                    persisted: failure.persisted,
                };
                return Err(self.fail(request, progress, cancelled, attempt));
            }
            attempt += 1;
        }
    }

    fn complete(&self, outcome: &TransferOutcome, progress: &ProgressHandle, started: Instant) {
        progress.set_phase(TransferPhase::Completed);

        let elapsed = started.elapsed().as_secs_f64();
        let mib = outcome.bytes_fetched() as f64 / MIB as f64;
        let avg = if elapsed > 0.0 { mib / elapsed } else { 0.0 };
        info!(
            path = %outcome.path.display(),
            strategy = %outcome.strategy,
            size = outcome.total_size,
            resumed_from = outcome.resumed_from,
            chunk_mb = outcome.chunk_size as f64 / MIB as f64,
            workers = outcome.workers,
            attempts = outcome.attempts,
            elapsed_secs = format!("{:.2}", elapsed),
            avg_mib_s = format!("{:.2}", avg),
            "PERF transfer complete"
        );

        if outcome.layout == LayoutKind::Split {
            if let Some(hook) = &self.hook {
                hook.split_completed(&outcome.path);
            }
        }
    }

    fn fail(
        &self,
        request: &TransferRequest,
        progress: &ProgressHandle,
        failure: AttemptError,
        attempts: u32,
    ) -> TransferFailure {
        progress.set_phase(TransferPhase::Failed);
        error!(
            url = %request.remote_url,
            attempts,
            persisted = failure.persisted,
            error = %failure.error,
            "transfer failed"
        );
        TransferFailure {
            error: failure.error,
            bytes_transferred: failure.persisted,
            attempts,
        }
    }

    fn attempt(
        &self,
        request: &TransferRequest,
        progress: &ProgressHandle,
    ) -> Result<TransferOutcome, AttemptError> {
        progress.set_phase(TransferPhase::SizeUnknown);

        let size = request
            .known_size()
            .or_else(|| self.sizes.remote_size(&request.remote_url).filter(|&s| s > 0));
        let Some(size) = size else {
            return self.single_shot(request, progress);
        };
        progress.set_total(size);
        progress.set_phase(TransferPhase::SizeResolved);

        let layout = request
            .layout
            .resolve(size, self.config.single_file_limit, self.config.force_split);
        let placement = self.place(request, layout, size)?;
        progress.set_phase(TransferPhase::LayoutChosen);

        let resume = placement.resume();
        if progress.is_cancelled() {
            return Err(AttemptError {
                error: TransferError::Cancelled,
                persisted: resume,
            });
        }
        info!(
            url = %request.remote_url,
            path = %placement.path().display(),
            layout = ?layout,
            size,
            resume,
            "transfer starting"
        );

        if resume >= size {
            info!(path = %placement.path().display(), size, "already complete");
            progress.advance_to(size);
            return Ok(self.outcome(&placement, StrategyKind::AlreadyComplete, size, 0, 0));
        }

        self.run_ranged(request, progress, placement, size)
    }

    /// Decide where the attempt writes and the persisted prefix there.
    fn place(
        &self,
        request: &TransferRequest,
        layout: LayoutKind,
        size: u64,
    ) -> TransferResult<Placement> {
        let target = request.target();
        match layout {
            LayoutKind::Direct => {
                let path = match self.usable_parent(target)? {
                    Some(parent) => parent.join(target.file_name().unwrap_or_default()),
                    None => target.to_path_buf(),
                };
                let existing = fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
                let resume = if existing < size { existing } else { 0 };
                Ok(Placement::Direct { path, resume })
            }
            LayoutKind::Split => {
                let mut split = SplitLayout::for_target(target, self.config.split_part_size);
                if let Some(parent) = self.usable_parent(split.dir())? {
                    split = split.relocated(&parent);
                }
                let resume = split.existing_size(size);
                Ok(Placement::Split {
                    layout: split,
                    resume,
                })
            }
        }
    }

    /// Ensure the parent of `path` exists.
    ///
    /// Returns `Some(fallback)` when the parent could not be created and the
    /// configured fallback directory should be used instead.
    fn usable_parent(&self, path: &Path) -> TransferResult<Option<PathBuf>> {
        let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) else {
            return Ok(None);
        };
        let Err(e) = fs::create_dir_all(parent) else {
            return Ok(None);
        };

        match &self.config.fallback_dir {
            Some(fallback) => {
                warn!(
                    parent = %parent.display(),
                    fallback = %fallback.display(),
                    error = %e,
                    "parent not usable, using fallback directory"
                );
                fs::create_dir_all(fallback)
                    .map_err(|e| TransferError::storage(fallback, e))?;
                Ok(Some(fallback.clone()))
            }
            None => Err(TransferError::storage(parent, e)),
        }
    }

    fn run_ranged(
        &self,
        request: &TransferRequest,
        progress: &ProgressHandle,
        placement: Placement,
        size: u64,
    ) -> Result<TransferOutcome, AttemptError> {
        let url = request.remote_url.as_str();
        let resume = placement.resume();
        let layout = placement.kind();

        progress.advance_to(resume);
        progress.set_phase(if resume > 0 {
            TransferPhase::Resuming
        } else {
            TransferPhase::Downloading
        });

        let workers = TransferConfig::clamp_workers(request.worker_count, layout);
        let chunk_size = self
            .config
            .effective_chunk_size(request.chunk_size_bytes, workers);

        let mut primary = self.factory.connect().map_err(AttemptError::at(resume))?;
        let kind = choose_kind(workers, size - resume, chunk_size, || {
            probe_range_support(primary.as_mut(), url, size)
        });
        let workers = if kind == StrategyKind::Parallel { workers } else { 1 };

        let sink: Box<dyn RangeSink> = match &placement {
            Placement::Direct { path, .. } => {
                let presize = (kind == StrategyKind::Parallel).then_some(size);
                let sink = DirectSink::open(path, resume, presize)
                    .map_err(AttemptError::at(resume))?;
                Box::new(sink)
            }
            Placement::Split { layout, .. } => Box::new(
                SplitSink::open(layout.clone(), resume).map_err(AttemptError::at(resume))?,
            ),
        };

        let strategy: Box<dyn DownloadStrategy> = match kind {
            StrategyKind::Parallel => Box::new(ParallelStrategy::new(
                workers,
                Arc::clone(&self.factory),
                self.config.retry.clone(),
                self.config.spawn.clone(),
            )),
            _ => Box::new(SequentialStrategy::new(self.config.retry.clone())),
        };

        info!(
            url,
            strategy = %kind,
            workers,
            chunk_size,
            remaining = size - resume,
            "fetching ranges"
        );

        let ctx = TransferContext::new(url, resume, size, chunk_size, progress.clone());
        let executed = strategy.execute(&ctx, sink.as_ref(), primary);

        // Every byte on disk is success, whatever a worker recorded afterwards
        let result = if ctx.is_complete() {
            if let Err(e) = &executed {
                debug!(url, error = %e, "all ranges written, ignoring late error");
            }
            Ok(())
        } else {
            executed.and_then(|()| {
                Err(TransferError::incomplete(
                    url,
                    resume + ctx.bytes_completed(),
                    size,
                ))
            })
        };

        if let Err(error) = result {
            let persisted = ctx.persisted_watermark();
            if let Err(e) = sink.truncate_to(persisted) {
                warn!(path = %sink.location().display(), error = %e, "could not trim partial data");
            }
            if let Err(e) = sink.flush() {
                warn!(path = %sink.location().display(), error = %e, "could not flush partial data");
            }
            return Err(AttemptError { error, persisted });
        }

        sink.flush().map_err(|error| AttemptError {
            error,
            persisted: ctx.persisted_watermark(),
        })?;

        Ok(self.outcome(&placement, kind, size, chunk_size, workers))
    }

    /// Fetch an object of unknown size with one unranged GET.
    fn single_shot(
        &self,
        request: &TransferRequest,
        progress: &ProgressHandle,
    ) -> Result<TransferOutcome, AttemptError> {
        let url = request.remote_url.as_str();
        if request.layout.requires_split(self.config.force_split) {
            return Err(TransferError::Configuration(format!(
                "size of {} is unknown; the split layout needs a known size",
                url
            ))
            .into());
        }

        if progress.is_cancelled() {
            return Err(TransferError::Cancelled.into());
        }

        info!(url, "size unknown, falling back to a single GET");
        let placement = self.place(request, LayoutKind::Direct, u64::MAX)?;
        progress.set_phase(TransferPhase::Downloading);

        let mut transport = self.factory.connect()?;
        let body = fetch_whole(transport.as_mut(), url)?;
        let len = body.len() as u64;

        let sink = DirectSink::create(placement.path())?;
        sink.write_at(0, &body)?;
        sink.flush()?;

        progress.set_total(len);
        progress.advance_to(len);

        Ok(TransferOutcome {
            path: placement.path().to_path_buf(),
            layout: LayoutKind::Direct,
            strategy: StrategyKind::SingleShot,
            total_size: len,
            resumed_from: 0,
            attempts: 1,
            part_count: None,
            chunk_size: len,
            workers: 1,
        })
    }

    fn outcome(
        &self,
        placement: &Placement,
        strategy: StrategyKind,
        size: u64,
        chunk_size: u64,
        workers: usize,
    ) -> TransferOutcome {
        let (resumed_from, part_count) = match placement {
            Placement::Direct { resume, .. } => (*resume, None),
            Placement::Split { layout, resume } => (*resume, Some(layout.part_count(size))),
        };
        let resumed_from = if strategy == StrategyKind::AlreadyComplete {
            size
        } else {
            resumed_from
        };
        TransferOutcome {
            path: placement.path().to_path_buf(),
            layout: placement.kind(),
            strategy,
            total_size: size,
            resumed_from,
            attempts: 1,
            part_count,
            chunk_size,
            workers,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_round_trip_through_u8() {
        for phase in [
            TransferPhase::SizeUnknown,
            TransferPhase::SizeResolved,
            TransferPhase::LayoutChosen,
            TransferPhase::Downloading,
            TransferPhase::Resuming,
            TransferPhase::AutoRetrying,
            TransferPhase::Completed,
            TransferPhase::Failed,
        ] {
            assert_eq!(TransferPhase::from_u8(phase as u8), phase);
        }
        assert_eq!(TransferPhase::from_u8(200), TransferPhase::SizeUnknown);
    }

    #[test]
    fn test_terminal_phases() {
        assert!(TransferPhase::Completed.is_terminal());
        assert!(TransferPhase::Failed.is_terminal());
        assert!(!TransferPhase::AutoRetrying.is_terminal());
    }

    #[test]
    fn test_outcome_bytes_fetched() {
        let outcome = TransferOutcome {
            path: PathBuf::from("/x"),
            layout: LayoutKind::Direct,
            strategy: StrategyKind::Sequential,
            total_size: 100,
            resumed_from: 40,
            attempts: 1,
            part_count: None,
            chunk_size: 10,
            workers: 1,
        };
        assert_eq!(outcome.bytes_fetched(), 60);
    }
}
