//! Transfer request and layout selection.

use std::path::{Path, PathBuf};

use crate::config::TransferConfig;

/// Caller preference for the on-disk layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum LayoutHint {
    /// Always one file at the target path.
    Direct,
    /// Always a directory of parts.
    Split,
    /// Split only when the object exceeds the single-file limit or the
    /// configuration forces it.
    #[default]
    Auto,
}

/// Layout chosen for a transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LayoutKind {
    Direct,
    Split,
}

impl LayoutHint {
    /// Resolve the hint for an object of `size` bytes.
    pub fn resolve(self, size: u64, single_file_limit: u64, force_split: bool) -> LayoutKind {
        match self {
            Self::Direct => LayoutKind::Direct,
            Self::Split => LayoutKind::Split,
            Self::Auto if force_split || size > single_file_limit => LayoutKind::Split,
            Self::Auto => LayoutKind::Direct,
        }
    }

    /// Whether this hint can only be satisfied by the split layout.
    pub fn requires_split(self, force_split: bool) -> bool {
        match self {
            Self::Direct => false,
            Self::Split => true,
            Self::Auto => force_split,
        }
    }
}

/// One remote object to fetch into one local target.
///
/// Immutable for the duration of a transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferRequest {
    /// Full URL of the remote object.
    pub remote_url: String,
    /// Caller-chosen local path. For split transfers the part directory is
    /// placed next to it under a sanitized name.
    pub local_target: PathBuf,
    /// Known object size; 0 means unknown and triggers a size query.
    pub expected_size: u64,
    /// Requested range size in bytes.
    pub chunk_size_bytes: u64,
    /// Requested worker count.
    pub worker_count: usize,
    /// Layout preference.
    pub layout: LayoutHint,
}

impl TransferRequest {
    /// Request with chunk size and worker count taken from `config`.
    pub fn from_config(
        remote_url: impl Into<String>,
        local_target: impl Into<PathBuf>,
        config: &TransferConfig,
    ) -> Self {
        Self {
            remote_url: remote_url.into(),
            local_target: local_target.into(),
            expected_size: 0,
            chunk_size_bytes: config.chunk_size_bytes(),
            worker_count: config.parallel_connections,
            layout: LayoutHint::Auto,
        }
    }

    /// Set the known object size.
    pub fn with_expected_size(mut self, size: u64) -> Self {
        self.expected_size = size;
        self
    }

    /// Set the range size in bytes.
    pub fn with_chunk_size(mut self, bytes: u64) -> Self {
        self.chunk_size_bytes = bytes;
        self
    }

    /// Set the worker count.
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.worker_count = workers;
        self
    }

    /// Set the layout preference.
    pub fn with_layout(mut self, layout: LayoutHint) -> Self {
        self.layout = layout;
        self
    }

    /// Known size, if any.
    pub fn known_size(&self) -> Option<u64> {
        Some(self.expected_size).filter(|&s| s > 0)
    }

    /// Local target path.
    pub fn target(&self) -> &Path {
        &self.local_target
    }
}
