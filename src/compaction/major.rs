// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Major compaction: a global sweep that drops every cleaned entry, tombstone or not.
//!
//! Unlike [`crate::compaction::minor`], major compaction has no entry it must preserve: once
//! the embedding state machine has called [`crate::commit::Commit::clean`] on a tombstone, the
//! dependent entries it was protecting are assumed already reclaimed (or themselves clean), so
//! the tombstone itself is free to go too.

use super::strategy::all_sealed;
use crate::entry::Entry;
use crate::error::Result;
use crate::log::Log;
use crate::segment::reader::to_entry;
use crate::segment::Segment;
use std::sync::Arc;

/// Every sealed, non-empty segment other than the tail is a candidate for a major sweep,
/// regardless of its current clean ratio.
#[must_use]
pub fn select_candidates(log: &Log) -> Vec<Arc<Segment>> {
    all_sealed(log)
}

/// Rewrites `segment` in place, dropping every entry marked clean. Returns the number of
/// entries reclaimed; `0` means nothing was installed.
pub fn compact_segment(log: &Log, segment: &Arc<Segment>) -> Result<usize> {
    let manager = log.manager();
    let mut slots: Vec<Option<Entry>> = vec![None; segment.entry_count() as usize];
    let mut reclaimed = 0usize;

    for scanned in segment.scan()? {
        let scanned = scanned?;
        let entry = to_entry(segment.first_index, &scanned);
        let relative = scanned.decoded.relative_offset as usize;

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
        "major compaction reclaimed {reclaimed} entries from segment {} (now v{})",
        segment.id,
        segment.segment_version + 1
    );
    Ok(reclaimed)
}
