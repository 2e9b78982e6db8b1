//! Worker threads and the per-worker fetch loop.
//!
//! [`WorkerPool`] is a plain spawn-N/join-all primitive: it starts one scoped
//! OS thread per state value, runs the same closure on each, and waits for
//! all of them. Thread naming and stack size come from [`WorkerSpawnConfig`]
//! rather than from engine logic.
//!
//! [`run_worker`] is the loop every worker runs against a shared
//! [`TransferContext`]: claim, fetch with local retry, write, account.

use std::thread;

use tracing::{debug, error, warn};

use super::context::TransferContext;
use super::fetch::{fetch_range, Accepted, STATUS_OK, STATUS_PARTIAL_CONTENT};
use super::retry::RetryPolicy;
use super::sink::RangeSink;
use crate::error::{TransferError, TransferResult};
use crate::transport::RangeTransport;

/// Default worker thread name prefix.
pub const DEFAULT_THREAD_PREFIX: &str = "davfetch-worker";

/// Thread creation parameters for workers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerSpawnConfig {
    /// Stack size per worker thread; platform default when `None`.
    pub stack_size: Option<usize>,
    /// Thread name prefix; the worker index is appended.
    pub name_prefix: String,
}

impl Default for WorkerSpawnConfig {
    fn default() -> Self {
        Self {
            stack_size: None,
            name_prefix: DEFAULT_THREAD_PREFIX.to_string(),
        }
    }
}

/// Spawns a fixed set of worker threads and joins them.
#[derive(Debug, Clone, Default)]
pub struct WorkerPool {
    spawn: WorkerSpawnConfig,
}

impl WorkerPool {
    /// Create a pool with the given thread parameters.
    pub fn new(spawn: WorkerSpawnConfig) -> Self {
        Self { spawn }
    }

    /// Run `work` once per element of `states`, each on its own thread.
    ///
    /// Blocks until every spawned thread has returned. If a thread cannot be
    /// spawned the pool continues with those already running; states left
    /// over are dropped. A worker panic is logged and otherwise ignored.
    ///
    /// # Returns
    ///
    /// The number of workers that ran, or a `Configuration` error if none
    /// could be started.
    pub fn run<T, F>(&self, states: Vec<T>, work: F) -> TransferResult<usize>
    where
        T: Send,
        F: Fn(usize, T) + Sync,
    {
        let requested = states.len();
        let work = &work;

        thread::scope(|scope| {
            let mut handles = Vec::with_capacity(requested);

            for (index, state) in states.into_iter().enumerate() {
                let mut builder =
                    thread::Builder::new().name(format!("{}-{}", self.spawn.name_prefix, index));
                if let Some(size) = self.spawn.stack_size {
                    builder = builder.stack_size(size);
                }

                match builder.spawn_scoped(scope, move || work(index, state)) {
                    Ok(handle) => handles.push(handle),
                    Err(e) => {
                        warn!(index, requested, error = %e, "failed to spawn worker thread");
                        break;
                    }
                }
            }

            let spawned = handles.len();
            for handle in handles {
                if handle.join().is_err() {
                    error!("worker thread panicked");
                }
            }

            if spawned == 0 && requested > 0 {
                return Err(TransferError::Configuration(
                    "no worker threads could be started".to_string(),
                ));
            }
            Ok(spawned)
        })
    }
}

/// Fetch-and-store loop run by each worker.
///
/// Exits when the plan is exhausted, when another worker has recorded a
/// terminal error, or after recording one itself. In-flight requests are not
/// interrupted; cancellation is only acted on when there is a range left to
/// start, so a flag raised after the last write does not fail the attempt.
///
/// # Arguments
///
/// * `ctx` - Shared attempt state
/// * `transport` - This worker's private transport
/// * `sink` - Shared output sink
/// * `policy` - Range-level retry budget
/// * `accept_full` - Whether a 200 with the whole object completes the transfer
pub fn run_worker(
    ctx: &TransferContext,
    transport: &mut dyn RangeTransport,
    sink: &dyn RangeSink,
    policy: &RetryPolicy,
    accept_full: bool,
) {
    loop {
        let Some(range) = ctx.claim_next() else {
            return;
        };
        if ctx.is_cancelled() {
            ctx.record_error(TransferError::Cancelled);
            return;
        }

        let outcome = fetch_range(transport, ctx, range, policy, accept_full).and_then(|accepted| {
            match accepted {
                Accepted::Partial(body) => {
                    sink.write_at(range.start, &body)?;
                    ctx.record_written(range, STATUS_PARTIAL_CONTENT);
                    Ok(false)
                }
                Accepted::Full(body) => {
                    debug!(url = ctx.url(), bytes = body.len(), "server sent full object");
                    sink.write_at(0, &body)?;
                    ctx.record_full_object(STATUS_OK);
                    Ok(true)
                }
            }
        });

        match outcome {
            Ok(false) => {}
            Ok(true) => return,
            Err(e) => {
                if ctx.record_error(e) {
                    if let Some(message) = ctx.error_message() {
                        error!(
                            url = ctx.url(),
                            range = %range,
                            error = %message,
                            "worker stopped transfer"
                        );
                    }
                }
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::download::progress::ProgressHandle;
    use crate::download::range::ByteRange;
    use crate::download::sink::DirectSink;
    use crate::transport::tests::{transport_error, ScriptedTransport};
    use crate::transport::RangeResponse;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tempfile::TempDir;

    fn policy() -> RetryPolicy {
        RetryPolicy::none().with_range_attempts(3, Duration::from_millis(1))
    }

    #[test]
    fn test_pool_runs_every_state() {
        let pool = WorkerPool::default();
        let seen = AtomicUsize::new(0);

        let spawned = pool
            .run(vec![1usize, 2, 3, 4], |_, value| {
                seen.fetch_add(value, Ordering::SeqCst);
            })
            .unwrap();

        assert_eq!(spawned, 4);
        assert_eq!(seen.load(Ordering::SeqCst), 10);
    }

    #[test]
    fn test_pool_names_threads() {
        let pool = WorkerPool::new(WorkerSpawnConfig {
            stack_size: Some(256 * 1024),
            name_prefix: "test-pool".to_string(),
        });
        let names = parking_lot::Mutex::new(Vec::new());

        pool.run(vec![(), ()], |_, _| {
            names
                .lock()
                .push(thread::current().name().unwrap_or_default().to_string());
        })
        .unwrap();

        let mut names = names.into_inner();
        names.sort();
        assert_eq!(names, vec!["test-pool-0", "test-pool-1"]);
    }

    #[test]
    fn test_pool_survives_panicking_worker() {
        let pool = WorkerPool::default();
        let finished = AtomicUsize::new(0);

        let spawned = pool.run(vec![(), (), ()], |index, _| {
            if index == 1 {
                panic!("worker blew up");
            }
            finished.fetch_add(1, Ordering::SeqCst);
        });

        // run() itself does not panic
        assert_eq!(spawned.unwrap(), 3);
        assert_eq!(finished.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_single_worker_writes_every_range() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("out.bin");
        let sink = DirectSink::create(&path).unwrap();
        let ctx = TransferContext::new("u", 0, 35, 10, ProgressHandle::new());
        let mut transport = ScriptedTransport::new(vec![]);

        run_worker(&ctx, &mut transport, &sink, &policy(), false);

        assert!(ctx.is_complete());
        assert!(!ctx.has_error());
        assert_eq!(transport.calls(), 4);
        assert_eq!(std::fs::read(&path).unwrap(), vec![0xAB; 35]);
        assert_eq!(ctx.last_http_code(), 206);
    }

    #[test]
    fn test_worker_records_fatal_error_and_stops() {
        let temp = TempDir::new().unwrap();
        let sink = DirectSink::create(&temp.path().join("out.bin")).unwrap();
        let ctx = TransferContext::new("u", 0, 100, 10, ProgressHandle::new());
        let mut transport = ScriptedTransport::new(vec![
            Ok(RangeResponse::new(206, vec![1u8; 10])),
            Ok(RangeResponse::new(403, "")),
        ]);

        run_worker(&ctx, &mut transport, &sink, &policy(), false);

        assert_eq!(ctx.take_error().unwrap().status(), Some(403));
        assert_eq!(ctx.bytes_completed(), 10);
        assert_eq!(ctx.persisted_watermark(), 10);
        assert_eq!(transport.calls(), 2);
    }

    #[test]
    fn test_worker_exhausts_range_budget() {
        let temp = TempDir::new().unwrap();
        let sink = DirectSink::create(&temp.path().join("out.bin")).unwrap();
        let ctx = TransferContext::new("u", 0, 100, 10, ProgressHandle::new());
        let mut transport =
            ScriptedTransport::new(vec![transport_error(), transport_error(), transport_error()]);

        run_worker(&ctx, &mut transport, &sink, &policy(), false);

        assert!(ctx.has_error());
        assert_eq!(ctx.bytes_completed(), 0);
        assert_eq!(transport.calls(), 3);
    }

    #[test]
    fn test_worker_observes_cancellation() {
        let temp = TempDir::new().unwrap();
        let sink = DirectSink::create(&temp.path().join("out.bin")).unwrap();
        let progress = ProgressHandle::new();
        progress.cancel();
        let ctx = TransferContext::new("u", 0, 100, 10, progress);
        let mut transport = ScriptedTransport::new(vec![]);

        run_worker(&ctx, &mut transport, &sink, &policy(), false);

        assert!(ctx.take_error().unwrap().is_cancelled());
        assert_eq!(transport.calls(), 0);
    }

    /// Serves `limit` ranges, raising the cancel flag with the last one.
    struct CancelAfter {
        progress: ProgressHandle,
        limit: usize,
        served: usize,
    }

    impl RangeTransport for CancelAfter {
        fn get(&mut self, _url: &str, range: Option<ByteRange>) -> TransferResult<RangeResponse> {
            self.served += 1;
            if self.served >= self.limit {
                self.progress.cancel();
            }
            let len = range.map(|r| r.len()).unwrap_or(0) as usize;
            Ok(RangeResponse::new(206, vec![7u8; len]))
        }
    }

    #[test]
    fn test_cancel_after_last_range_is_not_an_error() {
        let temp = TempDir::new().unwrap();
        let sink = DirectSink::create(&temp.path().join("out.bin")).unwrap();
        let progress = ProgressHandle::new();
        let ctx = TransferContext::new("u", 0, 40, 10, progress.clone());
        let mut transport = CancelAfter {
            progress: progress.clone(),
            limit: 4,
            served: 0,
        };

        run_worker(&ctx, &mut transport, &sink, &policy(), false);

        assert!(progress.is_cancelled());
        assert!(!ctx.has_error());
        assert!(ctx.is_complete());
    }

    #[test]
    fn test_cancel_with_ranges_left_stops_worker() {
        let temp = TempDir::new().unwrap();
        let sink = DirectSink::create(&temp.path().join("out.bin")).unwrap();
        let progress = ProgressHandle::new();
        let ctx = TransferContext::new("u", 0, 40, 10, progress.clone());
        let mut transport = CancelAfter {
            progress: progress.clone(),
            limit: 2,
            served: 0,
        };

        run_worker(&ctx, &mut transport, &sink, &policy(), false);

        assert!(ctx.take_error().unwrap().is_cancelled());
        assert_eq!(ctx.persisted_watermark(), 20);
        assert_eq!(transport.served, 2);
    }

    #[test]
    fn test_full_body_ends_sequential_loop() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("out.bin");
        let sink = DirectSink::create(&path).unwrap();
        let ctx = TransferContext::new("u", 0, 50, 10, ProgressHandle::new());
        let mut transport =
            ScriptedTransport::new(vec![Ok(RangeResponse::new(200, vec![5u8; 50]))]);

        run_worker(&ctx, &mut transport, &sink, &policy(), true);

        assert!(ctx.is_complete());
        assert_eq!(transport.calls(), 1);
        assert_eq!(std::fs::read(&path).unwrap(), vec![5u8; 50]);
    }
}
