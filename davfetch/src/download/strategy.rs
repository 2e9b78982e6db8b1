//! Download strategies for ranged transfers.
//!
//! This module implements the Strategy pattern for sequential vs parallel
//! range fetching. Both strategies drive the same [`TransferContext`],
//! [`RangeSink`] and [`run_worker`] loop; they differ only in how many
//! workers run and where their transports come from.

use std::fmt;
use std::sync::Arc;

use tracing::{info, warn};

use super::context::TransferContext;
use super::retry::RetryPolicy;
use super::sink::RangeSink;
use super::worker::{run_worker, WorkerPool, WorkerSpawnConfig};
use crate::error::TransferResult;
use crate::transport::{RangeTransport, TransportFactory};

/// How a transfer was carried out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StrategyKind {
    /// Local data already covered the object; nothing was fetched.
    AlreadyComplete,
    /// One unranged GET for an object of unknown size.
    SingleShot,
    /// One worker fetching ranges in order.
    Sequential,
    /// A pool of workers fetching ranges concurrently.
    Parallel,
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::AlreadyComplete => "already-complete",
            Self::SingleShot => "single-shot",
            Self::Sequential => "sequential",
            Self::Parallel => "parallel",
        };
        f.write_str(name)
    }
}

/// Strategy for fetching the ranges of one attempt.
pub trait DownloadStrategy: Send + Sync {
    /// Which strategy this is.
    fn kind(&self) -> StrategyKind;

    /// Execute the strategy.
    ///
    /// # Arguments
    ///
    /// * `ctx` - Attempt state; ranges are claimed from it and results recorded in it
    /// * `sink` - Output sink, already prepared for the resume offset
    /// * `primary` - Transport already opened by the coordinator
    ///
    /// # Returns
    ///
    /// Ok(()) once every range was written, or the terminal error recorded
    /// by a worker.
    fn execute(
        &self,
        ctx: &TransferContext,
        sink: &dyn RangeSink,
        primary: Box<dyn RangeTransport>,
    ) -> TransferResult<()>;
}

fn finish(ctx: &TransferContext) -> TransferResult<()> {
    match ctx.take_error() {
        Some(error) => Err(error),
        None => Ok(()),
    }
}

/// Sequential download strategy.
///
/// Fetches ranges one at a time on the calling thread, reusing the primary
/// transport. A server that ignores `Range` and returns the complete object
/// is accepted here.
#[derive(Debug, Clone)]
pub struct SequentialStrategy {
    policy: RetryPolicy,
}

impl SequentialStrategy {
    /// Create a new sequential strategy.
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }
}

impl DownloadStrategy for SequentialStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Sequential
    }

    fn execute(
        &self,
        ctx: &TransferContext,
        sink: &dyn RangeSink,
        mut primary: Box<dyn RangeTransport>,
    ) -> TransferResult<()> {
        run_worker(ctx, primary.as_mut(), sink, &self.policy, true);
        finish(ctx)
    }
}

/// Parallel download strategy.
///
/// Runs `workers` threads against one context. Worker 0 uses the primary
/// transport; every other worker gets a fresh one from the factory.
pub struct ParallelStrategy {
    workers: usize,
    factory: Arc<dyn TransportFactory>,
    policy: RetryPolicy,
    pool: WorkerPool,
}

impl ParallelStrategy {
    /// Create a new parallel strategy.
    ///
    /// # Arguments
    ///
    /// * `workers` - Number of concurrent workers (minimum 1)
    /// * `factory` - Source of per-worker transports
    /// * `policy` - Range-level retry budget
    /// * `spawn` - Thread parameters for the workers
    pub fn new(
        workers: usize,
        factory: Arc<dyn TransportFactory>,
        policy: RetryPolicy,
        spawn: WorkerSpawnConfig,
    ) -> Self {
        Self {
            workers: workers.max(1),
            factory,
            policy,
            pool: WorkerPool::new(spawn),
        }
    }

    /// Configured worker count.
    pub fn workers(&self) -> usize {
        self.workers
    }

    fn connect_workers(
        &self,
        primary: Box<dyn RangeTransport>,
    ) -> Vec<Box<dyn RangeTransport>> {
        let mut transports = Vec::with_capacity(self.workers);
        transports.push(primary);
        for index in 1..self.workers {
            match self.factory.connect() {
                Ok(transport) => transports.push(transport),
                Err(e) => {
                    warn!(index, error = %e, "could not open worker transport");
                    break;
                }
            }
        }
        transports
    }
}

impl fmt::Debug for ParallelStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParallelStrategy")
            .field("workers", &self.workers)
            .field("policy", &self.policy)
            .field("pool", &self.pool)
            .finish()
    }
}

impl DownloadStrategy for ParallelStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Parallel
    }

    fn execute(
        &self,
        ctx: &TransferContext,
        sink: &dyn RangeSink,
        primary: Box<dyn RangeTransport>,
    ) -> TransferResult<()> {
        let transports = self.connect_workers(primary);
        let ran = self.pool.run(transports, |_, mut transport| {
            run_worker(ctx, transport.as_mut(), sink, &self.policy, false);
        })?;

        if ran < self.workers {
            info!(url = ctx.url(), requested = self.workers, ran, "ran with fewer workers");
        }
        finish(ctx)
    }
}

/// Pick the worker count and strategy for an attempt.
///
/// # Arguments
///
/// * `workers` - Clamped worker count
/// * `remaining` - Bytes left to fetch
/// * `chunk_size` - Effective chunk size
/// * `range_supported` - Lazily evaluated probe result; only called when
///   the other conditions already favor a pool
pub fn choose_kind(
    workers: usize,
    remaining: u64,
    chunk_size: u64,
    range_supported: impl FnOnce() -> bool,
) -> StrategyKind {
    if workers > 1 && remaining > chunk_size && range_supported() {
        StrategyKind::Parallel
    } else {
        StrategyKind::Sequential
    }
}
