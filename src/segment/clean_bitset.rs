// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Per-segment bitset recording which relative offsets have been marked clean.
//!
//! Generalizes the teacher's `segment/gc_stats.rs` (`GcStats { stale_items: AtomicU64,
//! stale_bytes: AtomicU64 }`) from a pair of aggregate counters into a queryable per-index
//! bit, since the cleaner (`crate::cleaner::Cleaner`) must answer "is *this* index clean",
//! not just "how many are clean". The aggregate live count the teacher tracked is kept
//! alongside the bits for O(1) ratio checks during compaction candidate selection.

use crate::error::Result;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};

/// A fixed-length bitset plus a live-count cache, persisted as a flat byte file (one bit per
/// entry, packed 8-to-a-byte) with a 4-byte trailing entry count for validation on load.
pub struct CleanBitset {
    path: PathBuf,
    bits: Vec<u8>,
    entry_count: usize,
    live_count: AtomicU32,
    dirty: bool,
}

impl CleanBitset {
    /// Creates a fresh, all-live bitset for a segment with `entry_count` entries.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, entry_count: usize) -> Self {
        Self {
            path: path.into(),
            bits: vec![0_u8; entry_count.div_ceil(8)],
            entry_count,
            live_count: AtomicU32::new(entry_count as u32),
            dirty: true,
        }
    }

    /// Loads a previously persisted bitset, or falls back to a fresh all-live one if the
    /// sidecar file is absent or its length does not match `entry_count`.
    pub fn open(path: impl Into<PathBuf>, entry_count: usize) -> Result<Self> {
        let path = path.into();
        if let Ok(mut file) = std::fs::File::open(&path) {
            let mut buf = Vec::new();
            file.read_to_end(&mut buf)?;
            if buf.len() >= 4 {
                let (bits, trailer) = buf.split_at(buf.len() - 4);
                let stored_count = u32::from_le_bytes(trailer.try_into().expect("4 bytes"));
                if stored_count as usize == entry_count && bits.len() == entry_count.div_ceil(8) {
                    let live = entry_count as u32 - count_ones(bits, entry_count);
                    return Ok(Self {
                        path,
                        bits: bits.to_vec(),
                        entry_count,
                        live_count: AtomicU32::new(live),
                        dirty: false,
                    });
                }
                log::warn!(
                    "clean bitset at {} is stale or malformed, rebuilding as all-live",
                    path.display()
                );
            }
        }
        Ok(Self::new(path, entry_count))
    }

    /// Marks `relative_offset` clean. Idempotent.
    pub fn mark_clean(&mut self, relative_offset: usize) -> Result<()> {
        if relative_offset >= self.entry_count {
            return Err(crate::error::Error::OutOfRange {
                index: relative_offset as u64,
                first_index: 0,
                last_index: self.entry_count as u64,
            });
        }
        let byte = relative_offset / 8;
        let bit = 1 << (relative_offset % 8);
        if self.bits[byte] & bit == 0 {
            self.bits[byte] |= bit;
            self.live_count.fetch_sub(1, Ordering::Release);
            self.dirty = true;
        }
        Ok(())
    }

    #[must_use]
    pub fn is_clean(&self, relative_offset: usize) -> bool {
        if relative_offset >= self.entry_count {
            return false;
        }
        let byte = relative_offset / 8;
        let bit = 1 << (relative_offset % 8);
        self.bits[byte] & bit != 0
    }

    #[must_use]
    pub fn live_count(&self) -> u32 {
        self.live_count.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn entry_count(&self) -> usize {
        self.entry_count
    }

    /// Fraction of entries that have been cleaned, in `[0.0, 1.0]`.
    #[must_use]
    pub fn clean_ratio(&self) -> f32 {
        if self.entry_count == 0 {
            return 0.0;
        }
        let cleaned = self.entry_count as u32 - self.live_count();
        cleaned as f32 / self.entry_count as f32
    }

    /// Persists the bitset if it has changed since the last flush.
    pub fn flush(&mut self) -> Result<()> {
        if !self.dirty {
            return Ok(());
        }
        let tmp_path = self.path.with_extension("clean.tmp");
        {
            let mut file = std::fs::File::create(&tmp_path)?;
            file.write_all(&self.bits)?;
            file.write_all(&(self.entry_count as u32).to_le_bytes())?;
            file.sync_all()?;
        }
        std::fs::rename(&tmp_path, &self.path)?;
        self.dirty = false;
        Ok(())
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn count_ones(bits: &[u8], entry_count: usize) -> u32 {
    let mut count = 0u32;
    for i in 0..entry_count {
        let byte = i / 8;
        let bit = 1 << (i % 8);
        if bits[byte] & bit != 0 {
            count += 1;
        }
    }
    count
}
