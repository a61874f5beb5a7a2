// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Persisted `relativeOffset -> fileOffset` mapping for one segment.
//!
//! Grounded on `examples/clockworklabs-SpacetimeDB/crates/commitlog/src/index/indexfile.rs`
//! (`memmap2`-backed index file, binary search over sorted keys). Our keys are always dense
//! (`0..entryCount`, one file offset per entry, since a segment never has gaps), so a flat
//! `u64` array indexed directly by relative offset replaces that file's binary search — the
//! persistence mechanism (append-only memory-mapped file of fixed-width records) is the same
//! idiom, simplified for a dense key space.

use crate::error::Result;
use memmap2::MmapMut;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

const ENTRY_SIZE: usize = 8;

/// Sentinel stored for a relative offset that minor compaction has reclaimed: no file offset
/// is valid for it any more, so lookups must report absence rather than a stale byte range.
const HOLE: u64 = u64::MAX;

/// Grows the backing file and re-maps it in power-of-two-ish steps so appends are amortized.
const GROWTH_INCREMENT: u64 = 4096 * ENTRY_SIZE as u64;

/// An append-only, memory-mapped array of file offsets, one per entry in a segment.
pub struct OffsetIndex {
    path: PathBuf,
    file: std::fs::File,
    mmap: Option<MmapMut>,
    len: usize,
    capacity: usize,
}

impl OffsetIndex {
    /// Number of slots (live or hole) persisted in the index file at `path`, derived purely
    /// from its on-disk size. `0` if the file does not exist. A flushed index file is always
    /// exactly `len * 8` bytes (see [`Self::flush`]), so this is the logical entry count of a
    /// sealed segment without needing a separate count stored anywhere else.
    pub fn persisted_len(path: impl AsRef<Path>) -> Result<usize> {
        match std::fs::metadata(path.as_ref()) {
            Ok(meta) => Ok(meta.len() as usize / ENTRY_SIZE),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(0),
            Err(e) => Err(e.into()),
        }
    }

    /// Opens (creating if absent) the offset index file at `path`, loading `len` existing
    /// entries written by a prior process.
    pub fn open(path: impl AsRef<Path>, len: usize) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&path)?;

        let needed = (len * ENTRY_SIZE) as u64;
        let current_len = file.metadata()?.len();
        if current_len < needed {
            file.set_len(needed.max(GROWTH_INCREMENT))?;
        }

        let capacity = (file.metadata()?.len() as usize) / ENTRY_SIZE;
        let mmap = if file.metadata()?.len() > 0 {
            // Safety: `file` is open for read+write and sized above; the file is exclusively
            // ours (not shared with another process) for the lifetime of this mapping.
            #[allow(unsafe_code)]
            Some(unsafe { MmapMut::map_mut(&file)? })
        } else {
            None
        };

        Ok(Self {
            path,
            file,
            mmap,
            len,
            capacity,
        })
    }

    /// Number of entries currently recorded.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns the file offset of the entry at `relative_offset`, or `None` if it is out of
    /// range or has been reclaimed by compaction (a [`HOLE`] sentinel).
    #[must_use]
    pub fn get(&self, relative_offset: usize) -> Option<u64> {
        if relative_offset >= self.len {
            return None;
        }
        let mmap = self.mmap.as_ref()?;
        let start = relative_offset * ENTRY_SIZE;
        let bytes: [u8; 8] = mmap[start..start + ENTRY_SIZE].try_into().ok()?;
        let offset = u64::from_le_bytes(bytes);
        (offset != HOLE).then_some(offset)
    }

    /// Appends the file offset for the next entry (must be called in order).
    pub fn push(&mut self, file_offset: u64) -> Result<()> {
        self.push_raw(file_offset)
    }

    /// Appends a reclaimed-entry marker for the next relative offset.
    pub fn push_hole(&mut self) -> Result<()> {
        self.push_raw(HOLE)
    }

    fn push_raw(&mut self, value: u64) -> Result<()> {
        if self.len >= self.capacity {
            self.grow()?;
        }

        let mmap = self.mmap.as_mut().expect("grow() ensures a mapping exists");
        let start = self.len * ENTRY_SIZE;
        mmap[start..start + ENTRY_SIZE].copy_from_slice(&value.to_le_bytes());
        self.len += 1;
        Ok(())
    }

    /// Drops every entry past `new_len`, used when truncating the tail segment.
    pub fn truncate(&mut self, new_len: usize) -> Result<()> {
        self.len = new_len.min(self.len);
        self.flush()
    }

    /// Flushes the memory map to disk and shrinks the backing file to exactly `len` entries.
    pub fn flush(&mut self) -> Result<()> {
        if let Some(mmap) = self.mmap.as_ref() {
            mmap.flush()?;
        }
        self.file.set_len((self.len * ENTRY_SIZE) as u64)?;
        self.file.sync_all()?;
        Ok(())
    }

    fn grow(&mut self) -> Result<()> {
        let new_capacity = self.capacity + GROWTH_INCREMENT as usize / ENTRY_SIZE;
        self.file.set_len((new_capacity * ENTRY_SIZE) as u64)?;
        // Safety: see `open`'s mapping above; `self.file` was just grown to `new_capacity`.
        #[allow(unsafe_code)]
        {
            self.mmap = Some(unsafe { MmapMut::map_mut(&self.file)? });
        }
        self.capacity = new_capacity;
        Ok(())
    }

    /// Rebuilds an index file from scratch given the sequence of file offsets (used during
    /// recovery when the persisted index is missing or fails to validate).
    pub fn rebuild(path: impl AsRef<Path>, offsets: &[u64]) -> Result<Self> {
        Self::rebuild_with_holes(path, &offsets.iter().map(|&o| Some(o)).collect::<Vec<_>>())
    }

    /// Rebuilds an index file from scratch given one slot per logical relative offset, `None`
    /// marking a hole left by minor compaction.
    pub fn rebuild_with_holes(path: impl AsRef<Path>, slots: &[Option<u64>]) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            std::fs::remove_file(path)?;
        }
        let mut index = Self::open(path, 0)?;
        for slot in slots {
            match slot {
                Some(offset) => index.push(*offset)?,
                None => index.push_hole()?,
            }
        }
        index.flush()?;
        Ok(index)
    }

    /// Path of the backing file, exposed for diagnostics.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn persisted_len_matches_flushed_file_size() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("0000000001.index");
        assert_eq!(OffsetIndex::persisted_len(&path).expect("missing file"), 0);

        let mut idx = OffsetIndex::open(&path, 0).expect("open");
        for i in 0..7 {
            idx.push(i).expect("push");
        }
        idx.push_hole().expect("push_hole");
        idx.flush().expect("flush");

        assert_eq!(OffsetIndex::persisted_len(&path).expect("stat"), 8);
    }

    #[test]
    fn push_and_get() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("0000000001.index");
        let mut idx = OffsetIndex::open(&path, 0).expect("open");

        for i in 0..10 {
            idx.push(i * 37).expect("push");
        }
        idx.flush().expect("flush");

        assert_eq!(idx.len(), 10);
        for i in 0..10 {
            assert_eq!(idx.get(i as usize), Some(i * 37));
        }
        assert_eq!(idx.get(10), None);
    }

    #[test]
    fn reopen_preserves_entries() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("0000000001.index");
        {
            let mut idx = OffsetIndex::open(&path, 0).expect("open");
            for i in 0..5 {
                idx.push(i * 11).expect("push");
            }
            idx.flush().expect("flush");
        }

        let idx = OffsetIndex::open(&path, 5).expect("reopen");
        assert_eq!(idx.len(), 5);
        assert_eq!(idx.get(4), Some(44));
    }

    #[test]
    fn truncate_drops_tail() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("0000000001.index");
        let mut idx = OffsetIndex::open(&path, 0).expect("open");
        for i in 0..20 {
            idx.push(i).expect("push");
        }
        idx.truncate(5).expect("truncate");
        assert_eq!(idx.len(), 5);
        assert_eq!(idx.get(5), None);
        assert_eq!(idx.get(4), Some(4));
    }

    #[test]
    fn holes_read_back_as_none() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("0000000001.index");
        let mut idx = OffsetIndex::open(&path, 0).expect("open");
        idx.push(10).expect("push");
        idx.push_hole().expect("push_hole");
        idx.push(30).expect("push");
        idx.flush().expect("flush");

        assert_eq!(idx.get(0), Some(10));
        assert_eq!(idx.get(1), None);
        assert_eq!(idx.get(2), Some(30));
        assert_eq!(idx.len(), 3);
    }

    #[test]
    fn rebuild_with_holes_preserves_gaps() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("0000000001.index");
        let idx = OffsetIndex::rebuild_with_holes(&path, &[Some(1), None, Some(3)]).expect("rebuild");
        assert_eq!(idx.get(0), Some(1));
        assert_eq!(idx.get(1), None);
        assert_eq!(idx.get(2), Some(3));
    }

    #[test]
    fn rebuild_from_scratch() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("0000000001.index");
        let offsets: Vec<u64> = (0..50).map(|i| i * 13).collect();
        let idx = OffsetIndex::rebuild(&path, &offsets).expect("rebuild");
        assert_eq!(idx.len(), 50);
        assert_eq!(idx.get(49), Some(49 * 13));
    }
}
