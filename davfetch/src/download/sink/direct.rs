//! Single-file sink.

use std::fs::{self, File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use tracing::debug;

use super::RangeSink;
use crate::error::{TransferError, TransferResult};

/// Writes ranges into one file at their absolute offsets.
///
/// The file handle is shared by every worker; seek and write happen under a
/// single lock so two workers can never interleave between them.
#[derive(Debug)]
pub struct DirectSink {
    path: PathBuf,
    file: Mutex<File>,
}

impl DirectSink {
    /// Open the target for a transfer resuming at `resume_offset`.
    ///
    /// Any bytes at or beyond `resume_offset` are discarded. When `presize`
    /// is given the file is extended to that length up front so out-of-order
    /// writes never grow it mid-transfer.
    ///
    /// # Arguments
    ///
    /// * `path` - Target file path (parent directories are created)
    /// * `resume_offset` - Length of the already persisted prefix
    /// * `presize` - Final object length to pre-extend to, if any
    pub fn open(path: &Path, resume_offset: u64, presize: Option<u64>) -> TransferResult<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| TransferError::storage(parent, e))?;
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .map_err(|e| TransferError::storage(path, e))?;

        file.set_len(resume_offset)
            .map_err(|e| TransferError::storage(path, e))?;

        if let Some(size) = presize.filter(|&size| size > resume_offset) {
            file.set_len(size)
                .map_err(|e| TransferError::storage(path, e))?;
            debug!(path = %path.display(), size, "pre-extended target");
        }

        Ok(Self {
            path: path.to_path_buf(),
            file: Mutex::new(file),
        })
    }

    /// Create or truncate `path` and return an empty sink.
    pub fn create(path: &Path) -> TransferResult<Self> {
        Self::open(path, 0, None)
    }
}

impl RangeSink for DirectSink {
    fn write_at(&self, offset: u64, bytes: &[u8]) -> TransferResult<()> {
        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(offset))
            .map_err(|e| TransferError::storage(&self.path, e))?;
        file.write_all(bytes)
            .map_err(|e| TransferError::storage(&self.path, e))
    }

    fn truncate_to(&self, len: u64) -> TransferResult<()> {
        self.file
            .lock()
            .set_len(len)
            .map_err(|e| TransferError::storage(&self.path, e))
    }

    fn flush(&self) -> TransferResult<()> {
        let mut file = self.file.lock();
        file.flush()
            .and_then(|_| file.sync_data())
            .map_err(|e| TransferError::storage(&self.path, e))
    }

    fn location(&self) -> &Path {
        &self.path
    }
}
