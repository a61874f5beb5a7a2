// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Tracks which applied entries are no longer needed by the state machine.
//!
//! Generalizes the teacher's `segment/gc_stats.rs` (`GcStats { stale_items: AtomicU64,
//! stale_bytes: AtomicU64 }`) from a pair of aggregate, write-only counters into a routing
//! layer over each segment's [`crate::segment::clean_bitset::CleanBitset`]: the cleaner finds
//! the owning segment for an index and flips its bit, rather than incrementing a log-wide
//! total, since compaction candidate selection needs a per-segment ratio.

use crate::error::{Error, Result};
use crate::segment::manager::SegmentManager;
use std::sync::Arc;

/// Routes `clean(index)` calls to the owning segment's bitset.
pub struct Cleaner {
    manager: Arc<SegmentManager>,
}

impl Cleaner {
    /// Creates a new cleaner routing to segments owned by `manager`.
    #[must_use]
    pub fn new(manager: Arc<SegmentManager>) -> Self {
        Self { manager }
    }

    /// Marks `index` clean. Idempotent; fails with [`Error::OutOfRange`] if `index` is not
    /// currently covered by any live segment.
    pub fn clean(&self, index: u64) -> Result<()> {
        let segment = self
            .manager
            .segment_for_index(index)
            .ok_or(Error::OutOfRange {
                index,
                first_index: self.manager.first_index(),
                last_index: self.manager.last_index(),
            })?;
        segment.mark_clean(index)?;
        log::trace!("cleaned index {index}");
        Ok(())
    }

    /// Fraction of cleaned entries in the segment owning `index`, or `None` if `index` is out
    /// of range.
    #[must_use]
    pub fn clean_ratio_for(&self, index: u64) -> Option<f32> {
        self.manager.segment_for_index(index).map(|s| s.clean_ratio())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::{Entry, EntryKind};
    use test_log::test;

    #[test]
    fn clean_marks_owning_segment() -> Result<()> {
        let dir = tempfile::tempdir().expect("tempdir");
        let manager = Arc::new(SegmentManager::create_new(dir.path(), "raft", 100, 1024 * 1024)?);
        for i in 1..=10 {
            manager
                .tail()
                .append(&Entry::new(i, 1, EntryKind::Command, i, b"x"))?;
        }

        let cleaner = Cleaner::new(Arc::clone(&manager));
        cleaner.clean(5)?;

        let segment = manager.segment_for_index(5).expect("present");
        assert!(segment.is_clean(5));
        assert!(!segment.is_clean(4));
        Ok(())
    }

    #[test]
    fn clean_out_of_range_errors() -> Result<()> {
        let dir = tempfile::tempdir().expect("tempdir");
        let manager = Arc::new(SegmentManager::create_new(dir.path(), "raft", 100, 1024 * 1024)?);
        let cleaner = Cleaner::new(manager);
        assert!(matches!(cleaner.clean(500), Err(Error::OutOfRange { .. })));
        Ok(())
    }
}
