//! Ranged download engine.
//!
//! This module provides the machinery for fetching one remote object as a
//! sequence of HTTP byte ranges, including:
//! - Range planning and `Content-Range` parsing (`range`)
//! - Shared attempt state: range cursor, first error, persisted watermark (`context`)
//! - Per-range fetch with bounded retry (`fetch`, `retry`)
//! - Worker threads (`worker`)
//! - Sequential and parallel download strategies (`strategy`)
//! - Single-file and split-part output (`sink`)
//! - Real-time progress reporting and cancellation (`progress`)
//! - High-level resume/retry coordination (`orchestrator`)
//!
//! # Architecture
//!
//! The download system is organized using the Strategy pattern:
//!
//! ```text
//! RangeDownloader (orchestrator)
//!         │
//!         ├── DownloadStrategy (trait)
//!         │       ├── SequentialStrategy
//!         │       └── ParallelStrategy ── WorkerPool
//!         │
//!         ├── TransferContext (range cursor, first error)
//!         │
//!         ├── RangeSink (trait)
//!         │       ├── DirectSink
//!         │       └── SplitSink ── SplitLayout
//!         │
//!         └── ProgressHandle / ProgressReporter (real-time updates)
//! ```
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use davfetch::{ProgressHandle, RangeDownloader, ReqwestFactory, TransferConfig, TransferRequest};
//!
//! let remote = Arc::new(ReqwestFactory::new(Default::default())?);
//! let config = TransferConfig::default();
//! let request = TransferRequest::from_config("https://dav.example/a.nsp", "/sd/a.nsp", &config);
//!
//! let downloader = RangeDownloader::with_remote(remote, config);
//! let outcome = downloader.download(&request, &ProgressHandle::new())?;
//! println!("{} bytes via {}", outcome.total_size, outcome.strategy);
//! ```

mod context;
mod fetch;
mod orchestrator;
mod progress;
mod range;
mod request;
mod retry;
mod sink;
mod strategy;
mod worker;

// Public API
pub use context::TransferContext;
pub use orchestrator::{CompletionHook, RangeDownloader, TransferOutcome, TransferPhase};
pub use progress::{ProgressCallback, ProgressHandle, ProgressReporter};
pub use range::{range_at, ByteRange, ContentRange, RangePlan};
pub use request::{LayoutHint, LayoutKind, TransferRequest};
pub use retry::RetryPolicy;
pub use sink::{
    sanitize_component, DirectSink, RangeSink, SplitLayout, SplitSink, DEFAULT_PART_SIZE,
    MAX_BASE_NAME_LEN,
};
pub use strategy::{
    choose_kind, DownloadStrategy, ParallelStrategy, SequentialStrategy, StrategyKind,
};
pub use worker::{WorkerPool, WorkerSpawnConfig};
