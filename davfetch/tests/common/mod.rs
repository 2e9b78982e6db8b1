//! In-memory remote used by the transfer scenarios.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use davfetch::download::{ByteRange, ContentRange, RetryPolicy};
use davfetch::transport::RangeResponse;
use davfetch::{
    CompletionHook, ProgressHandle, RangeTransport, RemoteSize, TransferConfig, TransferError,
    TransferResult, TransportFactory,
};
use parking_lot::Mutex;

pub const URL: &str = "http://dav.test/files/object.bin";

/// Deterministic object contents.
pub fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

/// Config with millisecond backoffs so retry scenarios run fast.
pub fn fast_config() -> TransferConfig {
    TransferConfig::default().with_retry(
        RetryPolicy::default()
            .with_range_attempts(3, Duration::from_millis(1))
            .with_transfer_attempts(3, Duration::from_millis(4)),
    )
}

/// Misbehavior injected into a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// No response at all.
    Transport,
    /// Empty body with the given status.
    Status(u16),
    /// 206 without a body.
    EmptyBody,
    /// 206 carrying half of the requested bytes.
    Truncated,
    /// 200 carrying the whole object.
    FullBody,
    /// 200 carrying all but the last byte.
    ShortFull,
}

#[derive(Debug)]
struct Rule {
    start: Option<u64>,
    fault: Fault,
    remaining: Option<u32>,
}

#[derive(Default)]
struct MockState {
    rules: Vec<Rule>,
    requests: Vec<Option<ByteRange>>,
    served: usize,
    cancel_after: Option<(usize, ProgressHandle)>,
    observed: Option<ProgressHandle>,
    samples: Vec<u64>,
    connects: usize,
}

/// Scriptable remote serving [`pattern`] bytes.
///
/// Implements both [`TransportFactory`] and [`RemoteSize`]. The one-byte
/// probe request (`bytes=0-0`) is never faulted.
#[derive(Clone)]
pub struct MockRemote {
    data: Arc<Vec<u8>>,
    ranges_supported: bool,
    size_known: bool,
    max_connections: Option<usize>,
    state: Arc<Mutex<MockState>>,
}

impl MockRemote {
    pub fn new(len: usize) -> Self {
        Self {
            data: Arc::new(pattern(len)),
            ranges_supported: true,
            size_known: true,
            max_connections: None,
            state: Arc::new(Mutex::new(MockState::default())),
        }
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> u64 {
        self.data.len() as u64
    }

    /// Answer ranged requests with 200 and the whole object.
    pub fn without_range_support(mut self) -> Self {
        self.ranges_supported = false;
        self
    }

    /// Report no size from the size query.
    pub fn without_size(mut self) -> Self {
        self.size_known = false;
        self
    }

    /// Fail every connect beyond the first `n`.
    pub fn with_max_connections(mut self, n: usize) -> Self {
        self.max_connections = Some(n);
        self
    }

    /// Inject `fault` into the next `times` requests for the range starting at `start`.
    pub fn fail_at(&self, start: u64, fault: Fault, times: u32) {
        self.state.lock().rules.push(Rule {
            start: Some(start),
            fault,
            remaining: Some(times),
        });
    }

    /// Inject `fault` into every request.
    pub fn fail_always(&self, fault: Fault) {
        self.state.lock().rules.push(Rule {
            start: None,
            fault,
            remaining: None,
        });
    }

    /// Drop every injected fault.
    pub fn heal(&self) {
        self.state.lock().rules.clear();
    }

    /// Raise `progress`'s cancel flag after `n` ranges were served successfully.
    pub fn cancel_after(&self, n: usize, progress: &ProgressHandle) {
        let mut state = self.state.lock();
        state.served = 0;
        state.cancel_after = Some((n, progress.clone()));
    }

    /// Sample `progress`'s byte counter at every request.
    pub fn observe(&self, progress: &ProgressHandle) {
        let mut state = self.state.lock();
        state.samples.clear();
        state.observed = Some(progress.clone());
    }

    /// Counter values seen by [`MockRemote::observe`], in request order.
    pub fn progress_samples(&self) -> Vec<u64> {
        self.state.lock().samples.clone()
    }

    /// Every GET seen so far, probes included.
    pub fn requests(&self) -> Vec<Option<ByteRange>> {
        self.state.lock().requests.clone()
    }

    /// Ranged GETs other than the probe.
    pub fn range_requests(&self) -> Vec<ByteRange> {
        self.requests()
            .into_iter()
            .flatten()
            .filter(|r| !self.is_probe(*r))
            .collect()
    }

    pub fn probe_count(&self) -> usize {
        self.requests()
            .into_iter()
            .flatten()
            .filter(|r| self.is_probe(*r))
            .count()
    }

    pub fn connects(&self) -> usize {
        self.state.lock().connects
    }

    pub fn clear_log(&self) {
        self.state.lock().requests.clear();
    }

    fn is_probe(&self, range: ByteRange) -> bool {
        range == ByteRange::new(0, 0) && self.data.len() > 1
    }

    fn take_fault(state: &mut MockState, start: Option<u64>) -> Option<Fault> {
        let rule = state.rules.iter_mut().find(|rule| {
            let matches = rule.start.is_none() || rule.start == start;
            matches && rule.remaining != Some(0)
        })?;
        if let Some(remaining) = rule.remaining.as_mut() {
            *remaining -= 1;
        }
        Some(rule.fault)
    }

    fn full(&self) -> RangeResponse {
        RangeResponse::new(200, self.data.to_vec())
    }

    fn partial(&self, range: ByteRange, body: Vec<u8>) -> RangeResponse {
        let mut response = RangeResponse::new(206, body);
        response.content_range = Some(ContentRange {
            range,
            total: Some(self.len()),
        });
        response
    }

    fn slice(&self, range: ByteRange) -> Vec<u8> {
        let end = (range.end_exclusive() as usize).min(self.data.len());
        let start = (range.start as usize).min(end);
        self.data[start..end].to_vec()
    }

    fn serve(&self, url: &str, range: Option<ByteRange>) -> TransferResult<RangeResponse> {
        let mut state = self.state.lock();
        state.requests.push(range);
        if let Some(progress) = &state.observed {
            let written = progress.bytes_written();
            state.samples.push(written);
        }

        let probe = range.is_some_and(|r| self.is_probe(r));
        let fault = if probe {
            None
        } else {
            Self::take_fault(&mut state, range.map(|r| r.start))
        };

        if let Some(fault) = fault {
            return match (fault, range) {
                (Fault::Transport, _) => Err(TransferError::transport(url, "injected reset")),
                (Fault::Status(status), _) => Ok(RangeResponse::new(status, Vec::new())),
                (Fault::FullBody, _) => Ok(self.full()),
                (Fault::ShortFull, _) => {
                    Ok(RangeResponse::new(200, self.data[..self.data.len() - 1].to_vec()))
                }
                (Fault::EmptyBody, Some(r)) => Ok(self.partial(r, Vec::new())),
                (Fault::Truncated, Some(r)) => {
                    let mut body = self.slice(r);
                    body.truncate(body.len() / 2);
                    Ok(self.partial(r, body))
                }
                (_, None) => Ok(RangeResponse::new(200, Vec::new())),
            };
        }

        let response = match range {
            None => self.full(),
            Some(_) if !self.ranges_supported => self.full(),
            Some(r) => self.partial(r, self.slice(r)),
        };

        if !probe && range.is_some() {
            state.served += 1;
            if let Some((n, progress)) = &state.cancel_after {
                if state.served >= *n {
                    progress.cancel();
                }
            }
        }
        Ok(response)
    }
}

struct MockTransport {
    remote: MockRemote,
}

impl RangeTransport for MockTransport {
    fn get(&mut self, url: &str, range: Option<ByteRange>) -> TransferResult<RangeResponse> {
        self.remote.serve(url, range)
    }
}

impl TransportFactory for MockRemote {
    fn connect(&self) -> TransferResult<Box<dyn RangeTransport>> {
        let mut state = self.state.lock();
        if self.max_connections.is_some_and(|max| state.connects >= max) {
            return Err(TransferError::transport(URL, "connection limit reached"));
        }
        state.connects += 1;
        Ok(Box::new(MockTransport {
            remote: self.clone(),
        }))
    }
}

impl RemoteSize for MockRemote {
    fn remote_size(&self, _url: &str) -> Option<u64> {
        self.size_known.then(|| self.len())
    }
}

/// Records every split completion.
#[derive(Default)]
pub struct RecordingHook {
    calls: AtomicUsize,
    dirs: Mutex<Vec<PathBuf>>,
}

impl RecordingHook {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn dirs(&self) -> Vec<PathBuf> {
        self.dirs.lock().clone()
    }
}

impl CompletionHook for RecordingHook {
    fn split_completed(&self, dir: &Path) {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.dirs.lock().push(dir.to_path_buf());
    }
}

/// Concatenate parts `00`, `01`, ... of a split directory.
pub fn read_parts(dir: &Path) -> Vec<u8> {
    let mut out = Vec::new();
    for index in 0.. {
        match std::fs::read(dir.join(format!("{:02}", index))) {
            Ok(bytes) => out.extend(bytes),
            Err(_) => break,
        }
    }
    out
}

/// Start offsets of `ranges`, in request order.
pub fn starts(ranges: &[ByteRange]) -> Vec<u64> {
    ranges.iter().map(|r| r.start).collect()
}
