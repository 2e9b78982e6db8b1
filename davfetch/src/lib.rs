//! DavFetch - resumable, parallel HTTP Range downloads for constrained devices.
//!
//! This library moves very large remote objects (multi-gigabyte archives) from
//! a WebDAV/HTTP server to local storage over slow, failure-prone links. It
//! splits the object into byte ranges, fetches them with a bounded pool of
//! worker threads, and writes them either into a single file or into a
//! directory of fixed-size part files for filesystems with a 4 GiB limit.
//!
//! # Architecture
//!
//! ```text
//! RangeDownloader (resume/retry coordinator)
//!         │
//!         ├── RemoteSize + TransportFactory (transport adapter seam)
//!         │
//!         ├── DownloadStrategy (trait)
//!         │       ├── SequentialStrategy
//!         │       └── ParallelStrategy ── WorkerPool
//!         │
//!         ├── TransferContext (range cursor + terminal error)
//!         │
//!         ├── RangeSink (trait)
//!         │       ├── DirectSink
//!         │       └── SplitSink
//!         │
//!         └── ProgressHandle (progress counter + cancellation flag)
//! ```

pub mod config;
pub mod download;
pub mod error;
pub mod logging;
pub mod transport;

pub use config::{ConfigFile, TransferConfig};
pub use download::{
    CompletionHook, LayoutHint, LayoutKind, ProgressHandle, RangeDownloader, StrategyKind,
    TransferOutcome, TransferPhase, TransferRequest,
};
pub use error::{TransferError, TransferFailure, TransferResult};
pub use logging::LoggingConfig;
pub use transport::{RangeTransport, RemoteSize, ReqwestFactory, TransportConfig, TransportFactory};
