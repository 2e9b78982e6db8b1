//! Engine configuration.
//!
//! [`TransferConfig`] holds the tuning knobs of the range engine: chunk
//! size, worker count, split layout geometry, the in-flight window cap and
//! retry budgets. Values are clamped when read, so a config built by hand
//! with out-of-range values still yields a safe transfer.
//!
//! [`ConfigFile`] loads the same settings (plus transport and logging
//! settings) from an INI file.

mod file;

pub use file::{default_config_path, ConfigError, ConfigFile};

use std::path::PathBuf;

use crate::download::{LayoutKind, RetryPolicy, WorkerSpawnConfig, DEFAULT_PART_SIZE};

// =============================================================================
// Engine Constants
// =============================================================================

/// One mebibyte.
pub const MIB: u64 = 1024 * 1024;

/// Default range size in MiB.
pub const DEFAULT_CHUNK_SIZE_MB: u64 = 8;

/// Smallest configurable range size in MiB.
pub const MIN_CHUNK_SIZE_MB: u64 = 1;

/// Largest configurable range size in MiB.
pub const MAX_CHUNK_SIZE_MB: u64 = 32;

/// Default number of concurrent connections.
pub const DEFAULT_PARALLEL_CONNECTIONS: usize = 4;

/// Worker ceiling for single-file transfers.
pub const MAX_DIRECT_WORKERS: usize = 32;

/// Worker ceiling for split transfers.
pub const MAX_SPLIT_WORKERS: usize = 16;

/// Default cap on `chunk_size * workers` (256 MiB).
pub const DEFAULT_MAX_WINDOW_BYTES: u64 = 256 * MIB;

/// Smallest accepted window cap (1 MiB).
pub const MIN_WINDOW_BYTES: u64 = MIB;

/// Largest object stored as a single file before splitting (4 GiB - 1).
pub const DEFAULT_SINGLE_FILE_LIMIT: u64 = 0xFFFF_FFFF;

/// Reduce `chunk_size` so that `chunk_size * workers` fits under `cap`.
///
/// The worker count is never changed. The result is at least one byte.
pub fn apply_window_cap(chunk_size: u64, workers: usize, cap: u64) -> u64 {
    let workers = workers.max(1) as u64;
    if chunk_size.saturating_mul(workers) <= cap {
        return chunk_size;
    }
    (cap / workers).max(1)
}

/// Tuning of the range engine.
#[derive(Debug, Clone)]
pub struct TransferConfig {
    /// Range size in MiB (clamped to 1..=32 when used).
    pub chunk_size_mb: u64,
    /// Requested concurrent connections (clamped per layout when used).
    pub parallel_connections: usize,
    /// Always use the split layout, whatever the object size.
    pub force_split: bool,
    /// Cap on bytes requested but not yet written.
    pub max_window_bytes: u64,
    /// Size of every split part but the last.
    pub split_part_size: u64,
    /// Objects larger than this are split.
    pub single_file_limit: u64,
    /// Range-level and transfer-level retry budgets.
    pub retry: RetryPolicy,
    /// Worker thread parameters.
    pub spawn: WorkerSpawnConfig,
    /// Parent directory used when the target's own parent is not usable.
    pub fallback_dir: Option<PathBuf>,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            chunk_size_mb: DEFAULT_CHUNK_SIZE_MB,
            parallel_connections: DEFAULT_PARALLEL_CONNECTIONS,
            force_split: false,
            max_window_bytes: DEFAULT_MAX_WINDOW_BYTES,
            split_part_size: DEFAULT_PART_SIZE,
            single_file_limit: DEFAULT_SINGLE_FILE_LIMIT,
            retry: RetryPolicy::default(),
            spawn: WorkerSpawnConfig::default(),
            fallback_dir: None,
        }
    }
}

impl TransferConfig {
    /// Set the range size in MiB.
    pub fn with_chunk_size_mb(mut self, mb: u64) -> Self {
        self.chunk_size_mb = mb;
        self
    }

    /// Set the requested connection count.
    pub fn with_parallel_connections(mut self, connections: usize) -> Self {
        self.parallel_connections = connections;
        self
    }

    /// Force the split layout.
    pub fn with_force_split(mut self, force: bool) -> Self {
        self.force_split = force;
        self
    }

    /// Set the in-flight window cap.
    pub fn with_max_window_bytes(mut self, bytes: u64) -> Self {
        self.max_window_bytes = bytes;
        self
    }

    /// Set the split part size.
    pub fn with_split_part_size(mut self, bytes: u64) -> Self {
        self.split_part_size = bytes;
        self
    }

    /// Set the single-file size limit.
    pub fn with_single_file_limit(mut self, bytes: u64) -> Self {
        self.single_file_limit = bytes;
        self
    }

    /// Set the retry budgets.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Set worker thread parameters.
    pub fn with_spawn(mut self, spawn: WorkerSpawnConfig) -> Self {
        self.spawn = spawn;
        self
    }

    /// Set the fallback parent directory.
    pub fn with_fallback_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.fallback_dir = Some(dir.into());
        self
    }

    /// Configured range size in bytes, clamped to 1..=32 MiB.
    pub fn chunk_size_bytes(&self) -> u64 {
        self.chunk_size_mb
            .clamp(MIN_CHUNK_SIZE_MB, MAX_CHUNK_SIZE_MB)
            * MIB
    }

    /// Window cap with the 1 MiB floor applied.
    pub fn window_cap(&self) -> u64 {
        self.max_window_bytes.max(MIN_WINDOW_BYTES)
    }

    /// Worker ceiling for a layout.
    pub fn max_workers(layout: LayoutKind) -> usize {
        match layout {
            LayoutKind::Direct => MAX_DIRECT_WORKERS,
            LayoutKind::Split => MAX_SPLIT_WORKERS,
        }
    }

    /// Clamp a requested worker count into the range allowed for `layout`.
    pub fn clamp_workers(requested: usize, layout: LayoutKind) -> usize {
        requested.clamp(1, Self::max_workers(layout))
    }

    /// Range size to use with `workers` workers, after the window cap.
    pub fn effective_chunk_size(&self, chunk_size: u64, workers: usize) -> u64 {
        apply_window_cap(chunk_size.max(1), workers, self.window_cap())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = TransferConfig::default();
        assert_eq!(config.chunk_size_bytes(), 8 * MIB);
        assert_eq!(config.parallel_connections, 4);
        assert!(!config.force_split);
        assert_eq!(config.window_cap(), 256 * MIB);
        assert_eq!(config.split_part_size, 4_294_901_760);
        assert!(config.fallback_dir.is_none());
    }

    #[test]
    fn test_chunk_size_is_clamped() {
        assert_eq!(TransferConfig::default().with_chunk_size_mb(0).chunk_size_bytes(), MIB);
        assert_eq!(
            TransferConfig::default().with_chunk_size_mb(500).chunk_size_bytes(),
            32 * MIB
        );
    }

    #[test]
    fn test_worker_clamp_depends_on_layout() {
        assert_eq!(TransferConfig::clamp_workers(0, LayoutKind::Direct), 1);
        assert_eq!(TransferConfig::clamp_workers(64, LayoutKind::Direct), 32);
        assert_eq!(TransferConfig::clamp_workers(64, LayoutKind::Split), 16);
        assert_eq!(TransferConfig::clamp_workers(6, LayoutKind::Split), 6);
    }

    #[test]
    fn test_window_cap_reduces_chunk() {
        let config = TransferConfig::default();
        // 32 MiB x 16 workers = 512 MiB, over the 256 MiB cap
        assert_eq!(config.effective_chunk_size(32 * MIB, 16), 16 * MIB);
        assert_eq!(config.effective_chunk_size(8 * MIB, 4), 8 * MIB);
    }

    #[test]
    fn test_window_cap_floor() {
        let config = TransferConfig::default().with_max_window_bytes(10);
        assert_eq!(config.window_cap(), MIB);
    }

    #[test]
    fn test_apply_window_cap_never_zero() {
        assert_eq!(apply_window_cap(100, 32, 10), 1);
    }

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn test_window_cap_enforced(
                chunk in 1u64..(64 * MIB),
                workers in 1usize..=32,
                cap in MIB..(512 * MIB),
            ) {
                let effective = apply_window_cap(chunk, workers, cap);
                prop_assert!(effective <= chunk);
                prop_assert!(effective * workers as u64 <= cap);
                if chunk * workers as u64 <= cap {
                    prop_assert_eq!(effective, chunk);
                }
            }
        }
    }
}
