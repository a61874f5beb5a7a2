// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Candidate selection for a compaction pass.
//!
//! Generalizes the teacher's deleted `gc/mod.rs` (`GcStrategy` trait, `StaleThresholdStrategy`
//! picking segments whose stale ratio crosses a fixed cutoff) to the Raft log: candidates are
//! chosen from the live segment list rather than a value-log's blob set, and minor compaction
//! additionally excludes segments carrying a live (uncleaned) tombstone.

use crate::entry::EntryKind;
use crate::log::Log;
use crate::segment::reader::to_entry;
use crate::segment::Segment;
use std::sync::Arc;

/// Segments sealed, non-empty, and at or above `threshold` clean ratio, oldest (lowest id)
/// first as the segment list is already ordered.
#[must_use]
pub fn above_threshold(log: &Log, threshold: f32) -> Vec<Arc<Segment>> {
    let tail_id = log.manager().tail().id;
    log.manager()
        .list_segments()
        .into_iter()
        .filter(|s| s.id != tail_id && s.is_sealed() && !s.is_empty() && s.clean_ratio() >= threshold)
        .collect()
}

/// Every sealed, non-empty segment other than the tail, regardless of clean ratio — the
/// candidate pool for a major sweep.
#[must_use]
pub fn all_sealed(log: &Log) -> Vec<Arc<Segment>> {
    let tail_id = log.manager().tail().id;
    log.manager()
        .list_segments()
        .into_iter()
        .filter(|s| s.id != tail_id && s.is_sealed() && !s.is_empty())
        .collect()
}

/// Whether `segment` currently holds a physically-present tombstone entry that has not yet
/// been marked clean. Minor compaction must skip such a segment entirely (see §4.5): the
/// tombstone cannot be removed by minor, and removing its non-tombstone neighbors while it is
/// still live gains nothing a later pass wouldn't also gain once the tombstone clears.
pub fn has_live_tombstone(segment: &Segment) -> crate::error::Result<bool> {
    for scanned in segment.scan()? {
        let scanned = scanned?;
        let entry = to_entry(segment.first_index, &scanned);
        if entry.kind == EntryKind::Unregister && !segment.is_clean(entry.index) {
            return Ok(true);
        }
    }
    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::Entry;
    use test_log::test;

    fn mk_entry(index: u64, kind: EntryKind) -> Entry {
        Entry::new(index, 1, kind, index, b"x")
    }

    #[test]
    fn detects_live_tombstone() -> crate::error::Result<()> {
        let dir = tempfile::tempdir().expect("tempdir");
        let segment = Segment::create(dir.path(), "raft", 1, 1, 10, 1024 * 1024)?;
        segment.append(&mk_entry(1, EntryKind::Command))?;
        segment.append(&mk_entry(2, EntryKind::Unregister))?;
        assert!(has_live_tombstone(&segment)?);

        segment.mark_clean(2)?;
        assert!(!has_live_tombstone(&segment)?);
        Ok(())
    }
}
