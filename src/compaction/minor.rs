// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Minor compaction: drops cleaned, non-tombstone entries from an otherwise-live segment.

use super::strategy::{above_threshold, has_live_tombstone};
use crate::entry::Entry;
use crate::error::Result;
use crate::log::Log;
use crate::segment::reader::to_entry;
use crate::segment::Segment;
use std::sync::Arc;

/// Segments eligible for a minor pass: clean ratio at or above `threshold`, and no live
/// (uncleaned) tombstone — minor never removes a tombstone, so a segment holding a live one is
/// left entirely for major compaction.
pub fn select_candidates(log: &Log, threshold: f32) -> Result<Vec<Arc<Segment>>> {
    let mut candidates = Vec::new();
    for segment in above_threshold(log, threshold) {
        if !has_live_tombstone(&segment)? {
            candidates.push(segment);
        }
    }
    Ok(candidates)
}

/// Rewrites `segment` in place, dropping every cleaned non-tombstone entry. Returns the
/// number of entries reclaimed; `0` means nothing was installed (segment left untouched).
pub fn compact_segment(log: &Log, segment: &Arc<Segment>) -> Result<usize> {
    let manager = log.manager();
    let mut slots: Vec<Option<Entry>> = vec![None; segment.entry_count() as usize];
    let mut reclaimed = 0usize;

    for scanned in segment.scan()? {
        let scanned = scanned?;
        let entry = to_entry(segment.first_index, &scanned);
        let relative = scanned.decoded.relative_offset as usize;

        if entry.kind.is_tombstone() {
            // Kept regardless of clean state; only major compaction may drop a tombstone.
            slots[relative] = Some(entry);
            continue;
        }

        if segment.is_clean(entry.index) {
            reclaimed += 1;
            continue;
        }

        slots[relative] = Some(entry);
    }

    if reclaimed == 0 {
        return Ok(0);
    }

    let new_segment = Arc::new(Segment::create_compacted(
        manager.dir(),
        manager.name(),
        segment.id,
        segment.segment_version + 1,
        segment.first_index,
        segment.max_entries,
        segment.max_bytes,
        &slots,
    )?);

    let removed = manager.replace(&[segment.id], new_segment)?;
    for old in &removed {
        old.remove_files()?;
    }

    log::info!(
        "minor compaction reclaimed {reclaimed} entries from segment {} (now v{})",
        segment.id,
        segment.segment_version + 1
    );
    Ok(reclaimed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::EntryKind;
    use test_log::test;

    fn mk_entry(index: u64, kind: EntryKind) -> Entry {
        Entry::new(index, 1, kind, index, format!("v{index}").as_bytes())
    }

    #[test]
    fn reclaims_clean_entries_and_bumps_version() -> Result<()> {
        let dir = tempfile::tempdir().expect("tempdir");
        let log = Log::open(dir.path(), "raft", 10, 1024 * 1024)?;
        for i in 1..=10 {
            log.append(mk_entry(i, EntryKind::Command))?;
        }
        log.manager().roll()?; // seal segment 1 so it becomes compactible

        for i in (1..=10).step_by(2) {
            log.commit(i, None)?.clean()?;
        }

        let candidates = select_candidates(&log, 0.4)?;
        assert_eq!(candidates.len(), 1);
        let reclaimed = compact_segment(&log, &candidates[0])?;
        assert_eq!(reclaimed, 5);

        assert!(log.get(1)?.is_none());
        assert_eq!(log.get(2)?.unwrap().payload.as_ref(), b"v2");
        assert_eq!(log.manager().segment_for_index(2).unwrap().segment_version, 2);
        Ok(())
    }

    #[test]
    fn skips_segment_with_live_tombstone() -> Result<()> {
        let dir = tempfile::tempdir().expect("tempdir");
        let log = Log::open(dir.path(), "raft", 10, 1024 * 1024)?;
        for i in 1..=9 {
            log.append(mk_entry(i, EntryKind::Command))?;
        }
        log.append(mk_entry(10, EntryKind::Unregister))?;
        log.manager().roll()?;

        for i in (1..=9).step_by(2) {
            log.commit(i, None)?.clean()?;
        }

        let candidates = select_candidates(&log, 0.3)?;
        assert!(candidates.is_empty());
        Ok(())
    }
}
