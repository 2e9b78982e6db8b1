//! Multi-part sink for objects above the single-file limit.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Seek, SeekFrom, Write};
use std::path::Path;

use parking_lot::Mutex;
use tracing::{debug, info};

use super::layout::SplitLayout;
use super::RangeSink;
use crate::error::{TransferError, TransferResult};

#[derive(Debug)]
struct OpenPart {
    index: u64,
    file: File,
}

/// Writes ranges into fixed-size part files.
///
/// At most one part is open at a time. A write that straddles a part
/// boundary is split and the remainder goes to the next part, which is
/// created on demand.
#[derive(Debug)]
pub struct SplitSink {
    layout: SplitLayout,
    current: Mutex<Option<OpenPart>>,
}

impl SplitSink {
    /// Prepare the split directory for a transfer resuming at `resume_offset`.
    ///
    /// A plain file occupying the directory path is removed, the directory
    /// tree is created, and everything at or beyond `resume_offset` is
    /// discarded: the part holding that offset is truncated and later parts
    /// are deleted.
    pub fn open(layout: SplitLayout, resume_offset: u64) -> TransferResult<Self> {
        let dir = layout.dir();

        if dir.is_file() {
            info!(path = %dir.display(), "removing file in place of split directory");
            fs::remove_file(dir).map_err(|e| TransferError::storage(dir, e))?;
        }
        fs::create_dir_all(dir).map_err(|e| TransferError::storage(dir, e))?;

        discard_from(&layout, resume_offset)?;

        Ok(Self {
            layout,
            current: Mutex::new(None),
        })
    }

    /// Geometry this sink writes with.
    pub fn layout(&self) -> &SplitLayout {
        &self.layout
    }

    fn open_part(&self, index: u64) -> TransferResult<File> {
        let path = self.layout.part_path(index);
        debug!(path = %path.display(), "opening part");
        OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(|e| TransferError::storage(&path, e))
    }
}

/// Truncate the part containing `len` and delete every later part.
fn discard_from(layout: &SplitLayout, len: u64) -> TransferResult<()> {
    let (index, within) = layout.locate(len);

    let keep = layout.part_path(index);
    match OpenOptions::new().write(true).open(&keep) {
        Ok(file) => file
            .set_len(within)
            .map_err(|e| TransferError::storage(&keep, e))?,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(TransferError::storage(&keep, e)),
    }

    let mut next = index + 1;
    loop {
        let path = layout.part_path(next);
        match fs::remove_file(&path) {
            Ok(()) => debug!(path = %path.display(), "removed stale part"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => break,
            Err(e) => return Err(TransferError::storage(&path, e)),
        }
        next += 1;
    }
    Ok(())
}

impl RangeSink for SplitSink {
    fn write_at(&self, offset: u64, bytes: &[u8]) -> TransferResult<()> {
        let mut current = self.current.lock();
        let mut offset = offset;
        let mut remaining = bytes;

        while !remaining.is_empty() {
            let (index, within) = self.layout.locate(offset);
            let room = self.layout.part_size() - within;
            let take = remaining.len().min(usize::try_from(room).unwrap_or(usize::MAX));

            let part = match current.take() {
                Some(part) if part.index == index => current.insert(part),
                _ => {
                    let file = self.open_part(index)?;
                    current.insert(OpenPart { index, file })
                }
            };

            let path = self.layout.part_path(index);
            part.file
                .seek(SeekFrom::Start(within))
                .map_err(|e| TransferError::storage(&path, e))?;
            part.file
                .write_all(&remaining[..take])
                .map_err(|e| TransferError::storage(&path, e))?;

            offset += take as u64;
            remaining = &remaining[take..];
        }
        Ok(())
    }

    fn truncate_to(&self, len: u64) -> TransferResult<()> {
        let mut current = self.current.lock();
        *current = None;
        discard_from(&self.layout, len)
    }

    fn flush(&self) -> TransferResult<()> {
        let mut current = self.current.lock();
        if let Some(part) = current.as_mut() {
            let path = self.layout.part_path(part.index);
            part.file
                .flush()
                .and_then(|_| part.file.sync_data())
                .map_err(|e| TransferError::storage(&path, e))?;
        }
        Ok(())
    }

    fn location(&self) -> &Path {
        self.layout.dir()
    }
}
