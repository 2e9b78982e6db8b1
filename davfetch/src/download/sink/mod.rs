//! Output sinks for ranged transfers.
//!
//! A sink receives range bodies at absolute object offsets, possibly out of
//! order, and places them on disk. Two layouts share the [`RangeSink`]
//! contract:
//!
//! - [`DirectSink`] writes into a single file at the caller-chosen path.
//! - [`SplitSink`] maps offsets onto fixed-size part files (`00`, `01`, ...)
//!   inside a directory, so objects larger than the filesystem's single-file
//!   limit can still be stored.
//!
//! Every sink serializes its own writes behind one lock. Callers never hold
//! the transfer context lock while writing.

mod direct;
mod layout;
mod split;

pub use direct::DirectSink;
pub use layout::{sanitize_component, SplitLayout, DEFAULT_PART_SIZE, MAX_BASE_NAME_LEN};
pub use split::SplitSink;

use std::path::Path;

use crate::error::TransferResult;

/// Destination for range bodies.
pub trait RangeSink: Send + Sync {
    /// Write `bytes` starting at absolute object offset `offset`.
    ///
    /// The whole slice is written or an error is returned.
    fn write_at(&self, offset: u64, bytes: &[u8]) -> TransferResult<()>;

    /// Discard everything at or beyond `len`.
    fn truncate_to(&self, len: u64) -> TransferResult<()>;

    /// Flush buffered data to stable storage.
    fn flush(&self) -> TransferResult<()>;

    /// File or directory this sink writes to.
    fn location(&self) -> &Path;
}
