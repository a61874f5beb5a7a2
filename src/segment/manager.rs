// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Owns the ordered set of segments for one log and mediates every structural change:
//! rolling the tail, and atomically installing a compaction's rewritten segments.
//!
//! Grounded on the teacher's `src/manifest.rs` (`SegmentManifest<C>`: `RwLock<HashMap<..>>`,
//! `rewrite_atomic` tempfile-then-rename-then-fsync helper, `atomic_swap`, `recover`) and
//! `src/segment/multi_writer.rs` (`rotate()` segment-rolling idiom), generalized from a
//! hash-keyed, value-addressed segment set to an ordered, index-ranged one.

use super::{Segment, SegmentId};
use crate::error::{Error, Result};
use crate::id::IdGenerator;
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

const MANIFEST_MAGIC: u64 = 0x0047_414D_464F_4C52; // "RLOFMAG\0" roughly, little meaning beyond a tag

/// One entry in the persisted manifest: which `(id, version)` pair is currently live.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct ManifestEntry {
    id: SegmentId,
    version: u32,
}

/// Atomically rewrites `path` with the bytes produced by `write_body`, using a same-directory
/// tempfile so the rename is guaranteed to be on the same filesystem (and therefore atomic).
///
/// Directly mirrors the teacher's `rewrite_atomic` in `src/manifest.rs`.
pub(crate) fn rewrite_atomic(path: &Path, write_body: impl FnOnce(&mut dyn Write) -> std::io::Result<()>) -> Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    write_body(tmp.as_file_mut())?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| Error::Io(e.error))?;

    #[cfg(not(target_os = "windows"))]
    {
        if let Ok(dir_file) = std::fs::File::open(dir) {
            let _ = dir_file.sync_all();
        }
    }
    Ok(())
}

fn write_manifest(path: &Path, entries: &[ManifestEntry]) -> Result<()> {
    rewrite_atomic(path, |w| {
        w.write_u64::<BigEndian>(MANIFEST_MAGIC)?;
        w.write_u32::<BigEndian>(entries.len() as u32)?;
        for entry in entries {
            w.write_u64::<BigEndian>(entry.id)?;
            w.write_u32::<BigEndian>(entry.version)?;
        }
        Ok(())
    })
}

fn read_manifest(path: &Path) -> Result<Vec<ManifestEntry>> {
    let bytes = std::fs::read(path)?;
    let mut cursor = &bytes[..];
    let magic = cursor.read_u64::<BigEndian>()?;
    if magic != MANIFEST_MAGIC {
        return Err(Error::CorruptSegment {
            segment_id: 0,
            reason: "manifest magic mismatch".into(),
        });
    }
    let count = cursor.read_u32::<BigEndian>()?;
    let mut entries = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let id = cursor.read_u64::<BigEndian>()?;
        let version = cursor.read_u32::<BigEndian>()?;
        entries.push(ManifestEntry { id, version });
    }
    Ok(entries)
}

/// Owns every [`Segment`] belonging to one named log, in ascending `first_index` order.
pub struct SegmentManager {
    dir: PathBuf,
    name: String,
    manifest_path: PathBuf,
    segments: RwLock<Vec<Arc<Segment>>>,
    id_generator: IdGenerator,
    max_entries: u32,
    max_bytes: u32,
}

impl SegmentManager {
    /// Bootstraps a brand-new log with a single empty segment starting at index 1.
    pub fn create_new(dir: &Path, name: &str, max_entries: u32, max_bytes: u32) -> Result<Self> {
        std::fs::create_dir_all(dir)?;
        let manifest_path = dir.join(format!("{name}.manifest"));

        let first = Segment::create(dir, name, 1, 1, max_entries, max_bytes)?;
        write_manifest(&manifest_path, &[ManifestEntry { id: 1, version: 1 }])?;

        log::info!("created new log '{name}' in {}", dir.display());

        Ok(Self {
            dir: dir.to_path_buf(),
            name: name.to_string(),
            manifest_path,
            segments: RwLock::new(vec![Arc::new(first)]),
            id_generator: IdGenerator::new(2),
            max_entries,
            max_bytes,
        })
    }

    /// Recovers a log from disk: reads the manifest, opens every listed segment (the tail
    /// leniently, to tolerate a torn trailing write), verifies contiguity, and sweeps any
    /// leftover `.tmp` files from a compaction that never finished installing.
    pub fn recover(dir: &Path, name: &str, max_entries: u32, max_bytes: u32) -> Result<Self> {
        let manifest_path = dir.join(format!("{name}.manifest"));
        sweep_tmp_files(dir)?;

        let entries = read_manifest(&manifest_path)?;
        if entries.is_empty() {
            return Err(Error::CorruptSegment {
                segment_id: 0,
                reason: "manifest lists no segments".into(),
            });
        }

        let mut segments = Vec::with_capacity(entries.len());
        let mut highest_id = 0;
        for (i, entry) in entries.iter().enumerate() {
            let is_tail = i + 1 == entries.len();
            let segment = Segment::open(dir, name, entry.id, entry.version, is_tail)?;
            highest_id = highest_id.max(entry.id);
            segments.push(Arc::new(segment));
        }

        for pair in segments.windows(2) {
            let (prev, next) = (&pair[0], &pair[1]);
            let expected_next = prev.last_index() + 1;
            if next.first_index != expected_next {
                return Err(Error::CorruptSegment {
                    segment_id: next.id,
                    reason: format!(
                        "gap in segment chain: expected first_index {expected_next}, found {}",
                        next.first_index
                    ),
                });
            }
        }

        // A roll seals the old tail and allocates a new one before returning; if the process
        // crashed in between, the manifest's last segment is sealed with no writable
        // successor. Recovery must restore writability by allocating that successor now.
        let tail_sealed = segments.last().expect("checked non-empty").is_sealed();

        log::info!(
            "recovered log '{name}' with {} segments (tail sealed={tail_sealed})",
            segments.len()
        );

        let manager = Self {
            dir: dir.to_path_buf(),
            name: name.to_string(),
            manifest_path,
            segments: RwLock::new(segments),
            id_generator: IdGenerator::new(highest_id + 1),
            max_entries,
            max_bytes,
        };

        if tail_sealed {
            manager.roll()?;
        }

        Ok(manager)
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Returns the segment containing `index`, if any is currently live.
    #[must_use]
    pub fn segment_for_index(&self, index: u64) -> Option<Arc<Segment>> {
        let segments = self.segments.read().expect("lock poisoned");
        // Ascending by first_index; binary search for the last segment whose first_index <= index.
        let pos = segments.partition_point(|s| s.first_index <= index);
        if pos == 0 {
            return None;
        }
        let candidate = &segments[pos - 1];
        if index <= candidate.last_index() {
            Some(Arc::clone(candidate))
        } else {
            None
        }
    }

    #[must_use]
    pub fn tail(&self) -> Arc<Segment> {
        Arc::clone(
            self.segments
                .read()
                .expect("lock poisoned")
                .last()
                .expect("a log always has at least one segment"),
        )
    }

    #[must_use]
    pub fn first_index(&self) -> u64 {
        self.segments
            .read()
            .expect("lock poisoned")
            .first()
            .map(|s| s.first_index)
            .unwrap_or(1)
    }

    #[must_use]
    pub fn last_index(&self) -> u64 {
        self.tail().last_index()
    }

    /// All segments, oldest first. Used by the compactor to pick candidates.
    #[must_use]
    pub fn list_segments(&self) -> Vec<Arc<Segment>> {
        self.segments.read().expect("lock poisoned").clone()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.segments.read().expect("lock poisoned").len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Seals the current tail and allocates a new writable segment after it.
    ///
    /// Ordering matters for crash safety: the new segment is registered in the in-memory
    /// list and the manifest is rewritten (which makes the new segment durable and
    /// discoverable) only after the old tail has been sealed on disk, mirroring the
    /// teacher's `rollover()` discipline of installing the new before retiring the old.
    pub fn roll(&self) -> Result<Arc<Segment>> {
        let mut segments = self.segments.write().expect("lock poisoned");
        let old_tail = segments.last().expect("non-empty").clone();
        old_tail.seal()?;
        old_tail.flush()?;

        let new_id = self.id_generator.next();
        let new_first_index = old_tail.last_index() + 1;
        let new_segment = Arc::new(Segment::create(
            &self.dir,
            &self.name,
            new_id,
            new_first_index,
            self.max_entries,
            self.max_bytes,
        )?);

        segments.push(Arc::clone(&new_segment));
        self.write_manifest_locked(&segments)?;

        log::debug!(
            "rolled log '{}': sealed segment {} ({} entries), opened segment {} at {new_first_index}",
            self.name,
            old_tail.id,
            old_tail.entry_count(),
            new_id
        );

        Ok(new_segment)
    }

    /// Atomically replaces the contiguous run of segments with ids in `old_ids` with a single
    /// rewritten `new_segment`. Used by both minor and major compaction installation.
    ///
    /// The new segment is spliced into the list and the manifest rewritten to reference it
    /// *before* the old segments' files are removed, so a crash during file removal still
    /// leaves a fully valid log (recovery will simply find the old files orphaned and they
    /// can be swept, since the manifest never mentions them again).
    pub fn replace(&self, old_ids: &[SegmentId], new_segment: Arc<Segment>) -> Result<Vec<Arc<Segment>>> {
        let mut segments = self.segments.write().expect("lock poisoned");

        let first_pos = segments
            .iter()
            .position(|s| s.id == old_ids[0])
            .ok_or(Error::CorruptSegment {
                segment_id: old_ids[0],
                reason: "replace() target not found in manager".into(),
            })?;

        let removed: Vec<Arc<Segment>> = segments.splice(first_pos..first_pos + old_ids.len(), [new_segment]).collect();

        self.write_manifest_locked(&segments)?;

        log::info!(
            "installed compacted segment {} replacing {} old segment(s) in log '{}'",
            segments[first_pos].id,
            removed.len(),
            self.name
        );

        Ok(removed)
    }

    /// Discards every segment entirely after `index`, and truncates the segment containing
    /// `index` down to it. Used by `Log::truncate`. `index` must be `>= first_index()`.
    pub fn truncate_after(&self, index: u64) -> Result<()> {
        let mut segments = self.segments.write().expect("lock poisoned");

        // segments[..cut_pos] start at or before `index` and are kept (the last one possibly
        // truncated); segments[cut_pos..] start strictly after `index` and are dropped whole.
        let cut_pos = segments.partition_point(|s| s.first_index <= index);
        if cut_pos == 0 {
            return Err(Error::OutOfRange {
                index,
                first_index: segments.first().map_or(1, |s| s.first_index),
                last_index: segments.last().map_or(0, |s| s.last_index()),
            });
        }

        let removed: Vec<Arc<Segment>> = segments.split_off(cut_pos);

        let keep_segment = segments.last().expect("cut_pos > 0 implies non-empty");
        let keep_count = (index + 1 - keep_segment.first_index) as u32;

        // `keep_segment` is only sealed here if a roll had already made it non-tail before this
        // truncation dropped everything after it; re-open it so it becomes the writable tail.
        if keep_segment.is_sealed() {
            keep_segment.unseal()?;
        }
        if keep_count < keep_segment.entry_count() {
            keep_segment.truncate(keep_count)?;
        }

        self.write_manifest_locked(&segments)?;

        for segment in &removed {
            segment.remove_files()?;
        }

        log::info!(
            "truncated log '{}' to index {index}, removed {} trailing segment(s)",
            self.name,
            removed.len()
        );

        Ok(())
    }

    fn write_manifest_locked(&self, segments: &[Arc<Segment>]) -> Result<()> {
        let entries: Vec<ManifestEntry> = segments
            .iter()
            .map(|s| ManifestEntry {
                id: s.id,
                version: s.segment_version,
            })
            .collect();
        write_manifest(&self.manifest_path, &entries)
    }
}

/// Removes any `.log.tmp` files left behind by a compaction that staged a rewrite but never
/// finished renaming it into place before a crash (§8 scenario 6).
fn sweep_tmp_files(dir: &Path) -> Result<()> {
    if !dir.exists() {
        return Ok(());
    }
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) == Some("tmp") {
            log::warn!("sweeping leftover compaction temp file {}", path.display());
            let _ = std::fs::remove_file(&path);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::{Entry, EntryKind};
    use test_log::test;

    fn mk_entry(index: u64) -> Entry {
        Entry::new(index, 1, EntryKind::Command, index, b"x")
    }

    #[test]
    fn rolls_when_segment_fills() -> Result<()> {
        let dir = tempfile::tempdir().expect("tempdir");
        let manager = SegmentManager::create_new(dir.path(), "raft", 4, 1024 * 1024)?;

        for i in 1..=4 {
            manager.tail().append(&mk_entry(i))?;
        }
        assert!(matches!(manager.tail().append(&mk_entry(5)), Err(Error::SegmentFull)));

        manager.roll()?;
        manager.tail().append(&mk_entry(5))?;

        assert_eq!(manager.len(), 2);
        assert_eq!(manager.tail().first_index, 5);
        Ok(())
    }

    #[test]
    fn segment_for_index_finds_owner() -> Result<()> {
        let dir = tempfile::tempdir().expect("tempdir");
        let manager = SegmentManager::create_new(dir.path(), "raft", 4, 1024 * 1024)?;
        for i in 1..=4 {
            manager.tail().append(&mk_entry(i))?;
        }
        manager.roll()?;
        for i in 5..=7 {
            manager.tail().append(&mk_entry(i))?;
        }

        let seg = manager.segment_for_index(2).expect("present");
        assert_eq!(seg.first_index, 1);
        let seg = manager.segment_for_index(6).expect("present");
        assert_eq!(seg.first_index, 5);
        assert!(manager.segment_for_index(100).is_none());
        Ok(())
    }

    #[test]
    fn recover_round_trip() -> Result<()> {
        let dir = tempfile::tempdir().expect("tempdir");
        {
            let manager = SegmentManager::create_new(dir.path(), "raft", 4, 1024 * 1024)?;
            for i in 1..=10 {
                if manager.tail().append(&mk_entry(i)).is_err() {
                    manager.roll()?;
                    manager.tail().append(&mk_entry(i))?;
                }
            }
            manager.tail().flush()?;
        }

        let manager = SegmentManager::recover(dir.path(), "raft", 4, 1024 * 1024)?;
        assert_eq!(manager.last_index(), 10);
        Ok(())
    }

    #[test]
    fn truncate_after_drops_trailing_segments() -> Result<()> {
        let dir = tempfile::tempdir().expect("tempdir");
        let manager = SegmentManager::create_new(dir.path(), "raft", 4, 1024 * 1024)?;
        for i in 1..=4 {
            manager.tail().append(&mk_entry(i))?;
        }
        manager.roll()?;
        for i in 5..=8 {
            manager.tail().append(&mk_entry(i))?;
        }

        manager.truncate_after(5)?;
        assert_eq!(manager.last_index(), 5);
        assert_eq!(manager.len(), 2);
        Ok(())
    }

    #[test]
    fn truncate_after_unseals_kept_segment() -> Result<()> {
        let dir = tempfile::tempdir().expect("tempdir");
        let manager = SegmentManager::create_new(dir.path(), "raft", 4, 1024 * 1024)?;
        for i in 1..=4 {
            manager.tail().append(&mk_entry(i))?;
        }
        manager.roll()?;
        for i in 5..=8 {
            manager.tail().append(&mk_entry(i))?;
        }
        manager.roll()?;
        for i in 9..=10 {
            manager.tail().append(&mk_entry(i))?;
        }

        // Index 6 lands in the now-sealed second segment, not the current tail.
        let kept = manager.segment_for_index(6).expect("present");
        assert!(kept.is_sealed());

        manager.truncate_after(6)?;
        assert_eq!(manager.last_index(), 6);
        assert_eq!(manager.len(), 2);

        let tail = manager.tail();
        assert!(!tail.is_sealed());
        tail.append(&mk_entry(7))?;
        assert_eq!(manager.last_index(), 7);
        Ok(())
    }
}
