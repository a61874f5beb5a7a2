// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! A single append-only segment file plus its sidecar index and cleaner bitset.
//!
//! Generalizes the teacher's `Segment<C>` (`src/segment/mod.rs`: immutable payload bytes,
//! `gc_stats`, `stale_ratio()`) from a value-log blob segment to a Raft log segment: entries
//! are appended in strict index order instead of being looked up by key, and a segment's
//! tail (not just its whole body) can be truncated, since Raft must be able to discard a
//! losing suffix.

pub mod clean_bitset;
pub mod descriptor;
pub mod manager;
pub mod offset_index;
pub mod reader;

use crate::codec::encode_entry;
use crate::entry::Entry;
use crate::error::{Error, Result};
use clean_bitset::CleanBitset;
use descriptor::{SegmentDescriptor, DESCRIPTOR_LEN};
use offset_index::OffsetIndex;
use reader::{to_entry, SegmentScanner};
use std::fs::{File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::RwLock;

pub use crate::id::SegmentId;

fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

fn segment_file_stem(name: &str, id: SegmentId, version: u32) -> String {
    format!("{name}-{id:020}-{version:010}")
}

/// Returns the three sidecar paths (log, index, clean) for a segment.
pub fn segment_paths(dir: &Path, name: &str, id: SegmentId, version: u32) -> (PathBuf, PathBuf, PathBuf) {
    let stem = segment_file_stem(name, id, version);
    (
        dir.join(format!("{stem}.log")),
        dir.join(format!("{stem}.index")),
        dir.join(format!("{stem}.clean")),
    )
}

struct SegmentState {
    file: File,
    offset_index: OffsetIndex,
    clean_bitset: CleanBitset,
    entry_count: u32,
    byte_size: u64,
    sealed: bool,
}

/// An append-only file holding the contiguous entry range `[first_index, last_index]`.
pub struct Segment {
    /// Unique identifier of this segment.
    pub id: SegmentId,
    /// The index of the first entry stored in this segment.
    pub first_index: u64,
    /// On-disk format version of this segment.
    pub segment_version: u32,
    /// Maximum number of entries this segment may hold.
    pub max_entries: u32,
    /// Maximum number of bytes this segment may hold.
    pub max_bytes: u32,
    log_path: PathBuf,
    state: RwLock<SegmentState>,
}

impl std::fmt::Debug for Segment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Segment")
            .field("id", &self.id)
            .field("first_index", &self.first_index)
            .field("segment_version", &self.segment_version)
            .finish_non_exhaustive()
    }
}

impl Segment {
    /// Creates a brand new, writable, empty segment on disk at `segment_version` 1.
    pub fn create(
        dir: &Path,
        name: &str,
        id: SegmentId,
        first_index: u64,
        max_entries: u32,
        max_bytes: u32,
    ) -> Result<Self> {
        Self::create_versioned(dir, name, id, 1, first_index, max_entries, max_bytes)
    }

    /// Creates a brand new, writable, empty segment at an explicit `segment_version`, used
    /// by compaction to stage a rewrite of an existing `id` range.
    pub fn create_versioned(
        dir: &Path,
        name: &str,
        id: SegmentId,
        segment_version: u32,
        first_index: u64,
        max_entries: u32,
        max_bytes: u32,
    ) -> Result<Self> {
        let (log_path, index_path, clean_path) = segment_paths(dir, name, id, segment_version);

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&log_path)?;

        let descriptor = SegmentDescriptor {
            id,
            segment_version,
            first_index,
            max_entries,
            max_bytes,
            sealed: false,
            updated_millis: now_millis(),
        };
        descriptor.write(&mut file)?;
        file.sync_all()?;

        let offset_index = OffsetIndex::open(&index_path, 0)?;
        let clean_bitset = CleanBitset::new(clean_path, 0);

        log::debug!(
            "created segment {id} v{segment_version} at {first_index} in {}",
            log_path.display()
        );

        Ok(Self {
            id,
            first_index,
            segment_version,
            max_entries,
            max_bytes,
            log_path,
            state: RwLock::new(SegmentState {
                file,
                offset_index,
                clean_bitset,
                entry_count: 0,
                byte_size: 0,
                sealed: false,
            }),
        })
    }

    /// Builds a sealed, rewritten segment for `crate::compaction::minor`/`major`: `slots[i]`
    /// is the live entry at relative offset `i`, or `None` for one compaction has reclaimed.
    /// `first_index` and the logical slot count (`slots.len()`) are preserved from the source
    /// range so the segment still covers the same index window; `get()` on a hole returns
    /// `None` exactly as if the index had never been read.
    pub fn create_compacted(
        dir: &Path,
        name: &str,
        id: SegmentId,
        segment_version: u32,
        first_index: u64,
        max_entries: u32,
        max_bytes: u32,
        slots: &[Option<Entry>],
    ) -> Result<Self> {
        let (log_path, index_path, clean_path) = segment_paths(dir, name, id, segment_version);
        let tmp_log_path = log_path.with_extension("log.tmp");

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&tmp_log_path)?;
        file.seek(SeekFrom::Start(DESCRIPTOR_LEN))?;

        let mut offset_index = OffsetIndex::open(&index_path, 0)?;
        let mut clean_bitset = CleanBitset::new(&clean_path, slots.len());
        let mut byte_size = 0u64;

        for (relative, slot) in slots.iter().enumerate() {
            match slot {
                Some(entry) => {
                    let file_offset = DESCRIPTOR_LEN + byte_size;
                    let mut buf = Vec::new();
                    let written = encode_entry(entry, relative as u32, &mut buf)?;
                    file.write_all(&buf)?;
                    offset_index.push(file_offset)?;
                    byte_size += written;
                }
                None => {
                    offset_index.push_hole()?;
                    clean_bitset.mark_clean(relative)?;
                }
            }
        }

        let descriptor = SegmentDescriptor {
            id,
            segment_version,
            first_index,
            max_entries,
            max_bytes,
            sealed: true,
            updated_millis: now_millis(),
        };
        file.seek(SeekFrom::Start(0))?;
        descriptor.write(&mut file)?;
        file.sync_all()?;
        offset_index.flush()?;
        clean_bitset.flush()?;

        // Rename only after every byte is fsynced: a crash before this point leaves just an
        // orphaned `.log.tmp` for `sweep_tmp_files` to remove, with the old segment still the
        // one the manifest points at (§8 scenario 6).
        std::fs::rename(&tmp_log_path, &log_path)?;
        let file = OpenOptions::new().read(true).write(true).open(&log_path)?;

        log::debug!(
            "wrote compacted segment {id} v{segment_version}: {} live of {} slots",
            slots.iter().filter(|s| s.is_some()).count(),
            slots.len()
        );

        Ok(Self {
            id,
            first_index,
            segment_version,
            max_entries,
            max_bytes,
            log_path,
            state: RwLock::new(SegmentState {
                file,
                offset_index,
                clean_bitset,
                entry_count: slots.len() as u32,
                byte_size,
                sealed: true,
            }),
        })
    }

    /// Opens an existing segment file, rebuilding its sidecars from the body if they are
    /// missing or do not validate. `lenient` allows a torn trailing frame (used for the tail
    /// segment during crash recovery); a non-tail, already-sealed segment must scan cleanly.
    pub fn open(dir: &Path, name: &str, id: SegmentId, version: u32, lenient: bool) -> Result<Self> {
        let (log_path, index_path, clean_path) = segment_paths(dir, name, id, version);

        let mut file = OpenOptions::new().read(true).write(true).open(&log_path)?;
        file.seek(SeekFrom::Start(0))?;
        let descriptor = SegmentDescriptor::read(&mut file).map_err(|e| Error::CorruptSegment {
            segment_id: id,
            reason: e.to_string(),
        })?;

        let mut scanner = SegmentScanner::open(&log_path, DESCRIPTOR_LEN, lenient)?;
        // (relative_offset, file_offset) for every physically present frame, in file order.
        let mut found: Vec<(u32, u64)> = Vec::new();
        let mut byte_size: u64 = 0;
        let mut max_relative_seen: Option<u32> = None;

        for scanned in &mut scanner {
            let scanned = scanned?;
            let entry = to_entry(descriptor.first_index, &scanned);
            let relative = scanned.decoded.relative_offset;

            if !descriptor.sealed {
                // The writable tail is never compacted, so it must be exactly contiguous.
                let next_expected = descriptor.first_index + u64::from(relative);
                if found.len() as u32 != relative || entry.index != next_expected {
                    return Err(Error::CorruptSegment {
                        segment_id: id,
                        reason: format!(
                            "non-contiguous entry in writable segment: expected relative offset {}, found {relative}",
                            found.len()
                        ),
                    });
                }
            }

            found.push((relative, scanned.file_offset));
            byte_size += scanned.consumed;
            max_relative_seen = Some(max_relative_seen.map_or(relative, |m| m.max(relative)));
        }

        if scanner.torn() {
            log::warn!(
                "segment {id} tail was torn; recovered {} entries, truncating file to {} bytes",
                found.len(),
                scanner.position()
            );
            file.set_len(scanner.position())?;
        }

        // A sealed, possibly-compacted segment's logical size is authoritative in the
        // persisted offset index (its length covers trailing holes a body scan alone cannot
        // distinguish from "not yet written"). A writable tail always equals what was
        // physically scanned.
        let entry_count: u32 = if descriptor.sealed {
            let persisted_len = OffsetIndex::persisted_len(&index_path)? as u32;
            persisted_len.max(max_relative_seen.map_or(0, |m| m + 1))
        } else {
            found.len() as u32
        };

        let slots: Vec<Option<u64>> = {
            let mut slots = vec![None; entry_count as usize];
            for (relative, file_offset) in &found {
                slots[*relative as usize] = Some(*file_offset);
            }
            slots
        };

        let offset_index = match OffsetIndex::open(&index_path, entry_count as usize) {
            Ok(idx) if idx.len() == entry_count as usize => idx,
            _ => OffsetIndex::rebuild_with_holes(&index_path, &slots)?,
        };

        let mut clean_bitset = CleanBitset::open(clean_path, entry_count as usize)?;
        for (relative, slot) in slots.iter().enumerate() {
            if slot.is_none() {
                clean_bitset.mark_clean(relative)?;
            }
        }

        log::debug!(
            "recovered segment {id} v{} with {entry_count} entries (sealed={})",
            descriptor.segment_version,
            descriptor.sealed
        );

        Ok(Self {
            id,
            first_index: descriptor.first_index,
            segment_version: descriptor.segment_version,
            max_entries: descriptor.max_entries,
            max_bytes: descriptor.max_bytes,
            log_path,
            state: RwLock::new(SegmentState {
                file,
                offset_index,
                clean_bitset,
                entry_count,
                byte_size,
                sealed: descriptor.sealed,
            }),
        })
    }

    /// Returns the path to this segment's log file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.log_path
    }

    /// Appends `entry` at the current tail. `entry.index` must equal `first_index +
    /// entry_count()`.
    pub fn append(&self, entry: &Entry) -> Result<()> {
        let mut state = self.state.write().expect("lock poisoned");

        if state.sealed {
            return Err(Error::Sealed);
        }

        let expected = self.first_index + u64::from(state.entry_count);
        if entry.index != expected {
            return Err(Error::NonMonotonicIndex {
                got: entry.index,
                expected,
            });
        }

        if state.entry_count >= self.max_entries {
            return Err(Error::SegmentFull);
        }

        let mut buf = Vec::new();
        let written = encode_entry(entry, state.entry_count, &mut buf)?;

        if state.byte_size + written > u64::from(self.max_bytes) {
            return Err(Error::SegmentFull);
        }

        let file_offset = DESCRIPTOR_LEN + state.byte_size;
        state.file.seek(SeekFrom::Start(file_offset))?;
        state.file.write_all(&buf)?;

        state.offset_index.push(file_offset)?;
        state.entry_count += 1;
        state.byte_size += written;

        log::trace!("appended index {} to segment {}", entry.index, self.id);
        Ok(())
    }

    /// Reads the entry at `index`, or `None` if it falls outside this segment's current
    /// range (including entries already reclaimed by compaction).
    pub fn get(&self, index: u64) -> Result<Option<Entry>> {
        let state = self.state.read().expect("lock poisoned");
        if index < self.first_index {
            return Ok(None);
        }
        let relative = index - self.first_index;
        if relative >= u64::from(state.entry_count) {
            return Ok(None);
        }

        let file_offset = match state.offset_index.get(relative as usize) {
            Some(offset) => offset,
            None => return Ok(None), // reclaimed by a prior minor compaction
        };

        let mut file = File::open(&self.log_path)?;
        file.seek(SeekFrom::Start(file_offset))?;
        let decoded = crate::codec::decode_entry(&mut file)?;

        Ok(Some(Entry {
            index,
            term: decoded.term,
            kind: decoded.kind,
            time: decoded.time,
            payload: decoded.payload,
        }))
    }

    /// Marks the entry at `index` clean. No-op if already clean.
    pub fn mark_clean(&self, index: u64) -> Result<()> {
        let mut state = self.state.write().expect("lock poisoned");
        if index < self.first_index {
            return Err(Error::OutOfRange {
                index,
                first_index: self.first_index,
                last_index: self.first_index + u64::from(state.entry_count).saturating_sub(1),
            });
        }
        let relative = (index - self.first_index) as usize;
        state.clean_bitset.mark_clean(relative)
    }

    /// Discards every entry with relative offset `> keep_count - 1`; only valid while the
    /// segment is not sealed.
    pub fn truncate(&self, keep_count: u32) -> Result<()> {
        let mut state = self.state.write().expect("lock poisoned");
        if state.sealed {
            return Err(Error::Sealed);
        }
        if keep_count >= state.entry_count {
            return Ok(());
        }

        let new_byte_size = if keep_count == 0 {
            0
        } else {
            state
                .offset_index
                .get(keep_count as usize)
                .map(|offset| offset - DESCRIPTOR_LEN)
                .unwrap_or(state.byte_size)
        };

        state.file.set_len(DESCRIPTOR_LEN + new_byte_size)?;
        state.offset_index.truncate(keep_count as usize)?;
        state.entry_count = keep_count;
        state.byte_size = new_byte_size;

        log::debug!(
            "truncated segment {} to {keep_count} entries ({new_byte_size} bytes)",
            self.id
        );
        Ok(())
    }

    /// Seals the segment, making further appends and truncations fail, and persists the
    /// `sealed` flag into the descriptor.
    pub fn seal(&self) -> Result<()> {
        let mut state = self.state.write().expect("lock poisoned");
        if state.sealed {
            return Ok(());
        }
        state.sealed = true;
        self.rewrite_descriptor(&mut state)?;
        log::debug!("sealed segment {}", self.id);
        Ok(())
    }

    /// Re-opens a previously sealed segment for writing, making it the tail again. Used when a
    /// truncation point lands in a segment that a roll had already sealed.
    pub fn unseal(&self) -> Result<()> {
        let mut state = self.state.write().expect("lock poisoned");
        if !state.sealed {
            return Ok(());
        }
        state.sealed = false;
        self.rewrite_descriptor(&mut state)?;
        log::debug!("unsealed segment {} to become the writable tail", self.id);
        Ok(())
    }

    fn rewrite_descriptor(&self, state: &mut SegmentState) -> Result<()> {
        let descriptor = SegmentDescriptor {
            id: self.id,
            segment_version: self.segment_version,
            first_index: self.first_index,
            max_entries: self.max_entries,
            max_bytes: self.max_bytes,
            sealed: state.sealed,
            updated_millis: now_millis(),
        };
        state.file.seek(SeekFrom::Start(0))?;
        descriptor.write(&mut state.file)?;
        state.file.sync_all()?;
        Ok(())
    }

    /// Flushes the log file, offset index, and clean bitset to disk.
    pub fn flush(&self) -> Result<()> {
        let mut state = self.state.write().expect("lock poisoned");
        state.file.flush()?;
        state.file.sync_all()?;
        state.offset_index.flush()?;
        state.clean_bitset.flush()?;
        Ok(())
    }

    /// Returns whether the segment is sealed.
    #[must_use]
    pub fn is_sealed(&self) -> bool {
        self.state.read().expect("lock poisoned").sealed
    }

    /// Returns the number of entries currently stored in the segment.
    #[must_use]
    pub fn entry_count(&self) -> u32 {
        self.state.read().expect("lock poisoned").entry_count
    }

    /// Returns the number of bytes currently used by the segment's entries.
    #[must_use]
    pub fn byte_size(&self) -> u64 {
        self.state.read().expect("lock poisoned").byte_size
    }

    /// Highest index present, or `first_index - 1` if the segment is empty.
    #[must_use]
    pub fn last_index(&self) -> u64 {
        self.first_index + u64::from(self.entry_count()).saturating_sub(1)
    }

    /// Returns whether the segment holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entry_count() == 0
    }

    /// Returns the number of entries not yet marked clean.
    #[must_use]
    pub fn live_count(&self) -> u32 {
        self.state.read().expect("lock poisoned").clean_bitset.live_count()
    }

    /// Returns the fraction of entries marked clean.
    #[must_use]
    pub fn clean_ratio(&self) -> f32 {
        self.state.read().expect("lock poisoned").clean_bitset.clean_ratio()
    }

    /// Whether `index` has been marked clean.
    #[must_use]
    pub fn is_clean(&self, index: u64) -> bool {
        let state = self.state.read().expect("lock poisoned");
        if index < self.first_index {
            return false;
        }
        state.clean_bitset.is_clean((index - self.first_index) as usize)
    }

    /// Iterates every live entry, in order, for compaction or log-wide scans.
    pub fn scan(&self) -> Result<SegmentScanner> {
        SegmentScanner::open(&self.log_path, DESCRIPTOR_LEN, false)
    }

    /// Removes this segment's files from disk. Caller must ensure it has already been
    /// unlinked from the manager's manifest.
    pub fn remove_files(&self) -> Result<()> {
        let state = self.state.read().expect("lock poisoned");
        let _ = std::fs::remove_file(&self.log_path);
        let _ = std::fs::remove_file(state.offset_index.path());
        let _ = std::fs::remove_file(state.clean_bitset.path());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::EntryKind;
    use test_log::test;

    fn mk_entry(index: u64, payload: &[u8]) -> Entry {
        Entry::new(index, 1, EntryKind::Command, 1000 + index, payload)
    }

    #[test]
    fn append_and_get() -> Result<()> {
        let dir = tempfile::tempdir().expect("tempdir");
        let seg = Segment::create(dir.path(), "raft", 1, 1, 100, 1024 * 1024)?;

        for i in 1..=10 {
            seg.append(&mk_entry(i, format!("payload-{i}").as_bytes()))?;
        }

        let entry = seg.get(5)?.expect("present");
        assert_eq!(entry.index, 5);
        assert_eq!(&*entry.payload, b"payload-5");
        assert!(seg.get(11)?.is_none());
        Ok(())
    }

    #[test]
    fn rejects_non_monotonic_append() -> Result<()> {
        let dir = tempfile::tempdir().expect("tempdir");
        let seg = Segment::create(dir.path(), "raft", 1, 1, 100, 1024 * 1024)?;
        seg.append(&mk_entry(1, b"a"))?;
        let err = seg.append(&mk_entry(3, b"b")).unwrap_err();
        assert!(matches!(err, Error::NonMonotonicIndex { .. }));
        Ok(())
    }

    #[test]
    fn full_when_max_entries_reached() -> Result<()> {
        let dir = tempfile::tempdir().expect("tempdir");
        let seg = Segment::create(dir.path(), "raft", 1, 1, 2, 1024 * 1024)?;
        seg.append(&mk_entry(1, b"a"))?;
        seg.append(&mk_entry(2, b"b"))?;
        assert!(matches!(seg.append(&mk_entry(3, b"c")), Err(Error::SegmentFull)));
        Ok(())
    }

    #[test]
    fn seal_rejects_append_and_truncate() -> Result<()> {
        let dir = tempfile::tempdir().expect("tempdir");
        let seg = Segment::create(dir.path(), "raft", 1, 1, 100, 1024 * 1024)?;
        seg.append(&mk_entry(1, b"a"))?;
        seg.seal()?;
        assert!(matches!(seg.append(&mk_entry(2, b"b")), Err(Error::Sealed)));
        assert!(matches!(seg.truncate(0), Err(Error::Sealed)));
        Ok(())
    }

    #[test]
    fn truncate_drops_tail_and_allows_reappend() -> Result<()> {
        let dir = tempfile::tempdir().expect("tempdir");
        let seg = Segment::create(dir.path(), "raft", 1, 1, 100, 1024 * 1024)?;
        for i in 1..=10 {
            seg.append(&mk_entry(i, b"x"))?;
        }
        seg.truncate(5)?;
        assert_eq!(seg.entry_count(), 5);
        assert!(seg.get(6)?.is_none());
        seg.append(&mk_entry(6, b"y"))?;
        assert_eq!(seg.get(6)?.unwrap().payload.as_ref(), b"y");
        Ok(())
    }

    #[test]
    fn recovers_after_reopen() -> Result<()> {
        let dir = tempfile::tempdir().expect("tempdir");
        {
            let seg = Segment::create(dir.path(), "raft", 1, 1, 100, 1024 * 1024)?;
            for i in 1..=20 {
                seg.append(&mk_entry(i, b"hello"))?;
            }
            seg.mark_clean(3)?;
            seg.flush()?;
        }

        let seg = Segment::open(dir.path(), "raft", 1, 1, true)?;
        assert_eq!(seg.entry_count(), 20);
        assert!(seg.is_clean(3));
        assert!(!seg.is_clean(4));
        assert_eq!(seg.get(20)?.unwrap().payload.as_ref(), b"hello");
        Ok(())
    }

    #[test]
    fn compacted_segment_has_holes_and_survives_reopen() -> Result<()> {
        let dir = tempfile::tempdir().expect("tempdir");
        let source = Segment::create(dir.path(), "raft", 1, 1, 100, 1024 * 1024)?;
        let mut entries = Vec::new();
        for i in 1..=10u64 {
            let entry = mk_entry(i, format!("v{i}").as_bytes());
            source.append(&entry)?;
            entries.push(entry);
        }

        // Drop every even relative offset (entries 2, 4, 6, 8, 10).
        let slots: Vec<Option<Entry>> = entries
            .into_iter()
            .enumerate()
            .map(|(relative, entry)| if relative % 2 == 0 { None } else { Some(entry) })
            .collect();

        let compacted = Segment::create_compacted(dir.path(), "raft", 1, 2, 1, 100, 1024 * 1024, &slots)?;
        assert!(compacted.get(2)?.is_none());
        assert_eq!(compacted.get(3)?.unwrap().payload.as_ref(), b"v3");
        assert_eq!(compacted.last_index(), 10);
        assert_eq!(compacted.live_count(), 5);
        drop(compacted);

        let reopened = Segment::open(dir.path(), "raft", 1, 2, false)?;
        assert!(reopened.get(2)?.is_none());
        assert!(reopened.get(4)?.is_none());
        assert_eq!(reopened.get(9)?.unwrap().payload.as_ref(), b"v9");
        assert_eq!(reopened.last_index(), 10);
        assert_eq!(reopened.live_count(), 5);
        Ok(())
    }

    #[test]
    fn recovers_from_torn_tail() -> Result<()> {
        let dir = tempfile::tempdir().expect("tempdir");
        let path;
        {
            let seg = Segment::create(dir.path(), "raft", 1, 1, 100, 1024 * 1024)?;
            for i in 1..=5 {
                seg.append(&mk_entry(i, b"hello-world"))?;
            }
            seg.flush()?;
            path = seg.path().to_path_buf();
        }

        // Corrupt the final bytes to simulate a crash mid-write.
        let len = std::fs::metadata(&path)?.len();
        let file = OpenOptions::new().write(true).open(&path)?;
        file.set_len(len - 5)?;

        let seg = Segment::open(dir.path(), "raft", 1, 1, true)?;
        assert_eq!(seg.entry_count(), 4);
        assert!(seg.get(5)?.is_none());
        assert_eq!(seg.get(4)?.unwrap().index, 4);
        Ok(())
    }
}
