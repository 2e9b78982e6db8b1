//! On-disk layout of split transfers.
//!
//! A split object is stored as a directory whose name is derived from the
//! target file name, holding fixed-size parts named `00`, `01`, ... Every
//! part except the last is exactly `part_size` bytes; concatenating the parts
//! in index order yields the original object.
//!
//! The part files are the only resume checkpoint. [`SplitLayout::existing_size`]
//! recovers the persisted prefix by probing parts in order.

use std::fs;
use std::path::{Path, PathBuf};

/// Default part size: 4 GiB minus 64 KiB, under the FAT32 single-file limit.
pub const DEFAULT_PART_SIZE: u64 = 4_294_901_760;

/// Maximum length of the sanitized base name (before the extension).
pub const MAX_BASE_NAME_LEN: usize = 80;

fn is_allowed(byte: u8) -> bool {
    byte.is_ascii_alphanumeric()
        || matches!(byte, b' ' | b'-' | b'_' | b'[' | b']' | b'(' | b')' | b'+')
}

/// Derive a filesystem-safe directory name from a remote file name.
///
/// Every byte of the base name outside `[A-Za-z0-9 _-[]()+]` becomes `_`,
/// leading and trailing spaces and underscores are trimmed, an empty result
/// becomes `file`, and the base is capped at [`MAX_BASE_NAME_LEN`] bytes. The
/// extension (from the last `.` that is not the first character) is kept
/// as-is.
pub fn sanitize_component(name: &str) -> String {
    let (base, ext) = match name.rfind('.') {
        Some(dot) if dot > 0 => name.split_at(dot),
        _ => (name, ""),
    };

    let replaced: String = base
        .bytes()
        .map(|b| if is_allowed(b) { b as char } else { '_' })
        .collect();

    let mut safe = replaced.trim_matches(|c| c == ' ' || c == '_').to_string();
    if safe.is_empty() {
        safe.push_str("file");
    }
    safe.truncate(MAX_BASE_NAME_LEN);

    safe.push_str(ext);
    safe
}

/// Directory and part geometry of a split transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitLayout {
    dir: PathBuf,
    part_size: u64,
}

impl SplitLayout {
    /// Layout rooted at `dir`. A zero part size is treated as one byte.
    pub fn new(dir: impl Into<PathBuf>, part_size: u64) -> Self {
        Self {
            dir: dir.into(),
            part_size: part_size.max(1),
        }
    }

    /// Layout for a caller-chosen target path.
    ///
    /// The directory sits next to the target, named after the sanitized
    /// target file name.
    pub fn for_target(target: &Path, part_size: u64) -> Self {
        let parent = target.parent().unwrap_or_else(|| Path::new(""));
        Self::new(parent.join(Self::dir_name(target)), part_size)
    }

    /// Sanitized directory name for `target`.
    pub fn dir_name(target: &Path) -> String {
        let name = target
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        sanitize_component(&name)
    }

    /// Same geometry, moved under a different parent directory.
    pub fn relocated(&self, parent: &Path) -> Self {
        let name = self.dir.file_name().map(PathBuf::from).unwrap_or_default();
        Self::new(parent.join(name), self.part_size)
    }

    /// Split directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Size of every part but the last.
    pub fn part_size(&self) -> u64 {
        self.part_size
    }

    /// File name of part `index` (two-digit, zero-padded).
    pub fn part_name(index: u64) -> String {
        format!("{:02}", index)
    }

    /// Path of part `index`.
    pub fn part_path(&self, index: u64) -> PathBuf {
        self.dir.join(Self::part_name(index))
    }

    /// Part index and offset within that part for an absolute offset.
    pub fn locate(&self, offset: u64) -> (u64, u64) {
        (offset / self.part_size, offset % self.part_size)
    }

    /// Number of parts an object of `total` bytes occupies.
    pub fn part_count(&self, total: u64) -> u64 {
        total.div_ceil(self.part_size)
    }

    /// Length part `index` has once an object of `total` bytes is complete.
    pub fn expected_part_len(&self, index: u64, total: u64) -> u64 {
        let start = index.saturating_mul(self.part_size);
        total.saturating_sub(start).min(self.part_size)
    }

    /// Number of leading parts that are present with their final length.
    pub fn existing_part_count(&self, total: u64) -> u64 {
        let mut count = 0;
        while count < self.part_count(total) {
            let expected = self.expected_part_len(count, total);
            match fs::metadata(self.part_path(count)) {
                Ok(meta) if meta.is_file() && meta.len() == expected => count += 1,
                _ => break,
            }
        }
        count
    }

    /// Bytes persisted in complete leading parts; the resume offset.
    pub fn existing_size(&self, total: u64) -> u64 {
        let parts = self.existing_part_count(total);
        (parts * self.part_size).min(total)
    }

    /// Lengths of the parts present on disk, from `00` up to the first gap.
    pub fn scan(&self) -> Vec<(u64, u64)> {
        let mut parts = Vec::new();
        for index in 0.. {
            match fs::metadata(self.part_path(index)) {
                Ok(meta) if meta.is_file() => parts.push((index, meta.len())),
                _ => break,
            }
        }
        parts
    }
}
