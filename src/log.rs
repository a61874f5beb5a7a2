// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Public façade over a segmented, replicated log.
//!
//! Generalizes the teacher's `src/value_log.rs` (`ValueLog<C>(Arc<ValueLogInner<C>>)`,
//! `open()` dispatching to `recover()`/`create_new()` on a marker file, a `rollover_guard`
//! serializing structural changes) from a blob value log to the Raft entry log: `append`
//! replaces the blob writer-registration path, `get`/`truncate`/`iterator` replace the
//! key-addressed blob read path.

use crate::cleaner::Cleaner;
use crate::commit::{clamp_monotonic, Commit};
use crate::entry::Entry;
use crate::error::{Error, Result};
use crate::segment::manager::SegmentManager;
use std::ops::Deref;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

struct LogInner {
    name: String,
    manager: Arc<SegmentManager>,
    cleaner: Arc<Cleaner>,
    leak_counter: Arc<AtomicU64>,
    last_applied_time: AtomicU64,
    append_guard: Mutex<()>,
}

/// A segmented, append-only, compacting replicated log.
///
/// Cheaply `Clone`-able: internally an `Arc`, so the [`crate::compaction`] pool and the Raft
/// layer can share one log concurrently, exactly like the teacher's `ValueLog<C>`.
#[derive(Clone)]
pub struct Log(Arc<LogInner>);

impl Deref for Log {
    type Target = SegmentManager;

    fn deref(&self) -> &Self::Target {
        &self.0.manager
    }
}

impl Log {
    pub(crate) fn from_manager(name: &str, manager: Arc<SegmentManager>) -> Self {
        let cleaner = Arc::new(Cleaner::new(Arc::clone(&manager)));
        Self(Arc::new(LogInner {
            name: name.to_string(),
            manager,
            cleaner,
            leak_counter: Arc::new(AtomicU64::new(0)),
            last_applied_time: AtomicU64::new(0),
            append_guard: Mutex::new(()),
        }))
    }

    /// Opens an existing log under `dir`, or bootstraps a new one if no manifest exists yet.
    pub fn open(dir: &Path, name: &str, max_entries: u32, max_bytes: u32) -> Result<Self> {
        let manifest_path = dir.join(format!("{name}.manifest"));
        let manager = if manifest_path.exists() {
            SegmentManager::recover(dir, name, max_entries, max_bytes)?
        } else {
            SegmentManager::create_new(dir, name, max_entries, max_bytes)?
        };
        Ok(Self::from_manager(name, Arc::new(manager)))
    }

    /// Returns the name of this log.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.0.name
    }

    /// Number of [`Commit`] handles dropped without being terminated, since open.
    #[must_use]
    pub fn leaked_commit_count(&self) -> u64 {
        self.0.leak_counter.load(Ordering::Relaxed)
    }

    /// Appends `entry`, rolling to a new segment first if the current tail is full.
    /// `entry.index` must equal `last_index() + 1`.
    pub fn append(&self, entry: Entry) -> Result<u64> {
        let _guard = self.0.append_guard.lock().expect("lock poisoned");

        let expected = self.manager().last_index() + 1;
        if entry.index != expected {
            return Err(Error::NonMonotonicIndex {
                got: entry.index,
                expected,
            });
        }

        let tail = self.manager().tail();
        match tail.append(&entry) {
            Ok(()) => {}
            Err(Error::SegmentFull) => {
                self.manager().roll()?;
                self.manager().tail().append(&entry)?;
            }
            Err(e) => return Err(e),
        }

        Ok(entry.index)
    }

    /// Reads the entry at `index`, or `None` if it is out of range or has already been
    /// reclaimed by compaction.
    pub fn get(&self, index: u64) -> Result<Option<Entry>> {
        match self.manager().segment_for_index(index) {
            Some(segment) => segment.get(index),
            None => Ok(None),
        }
    }

    /// Returns whether `index` is currently present in the log.
    #[must_use]
    pub fn contains(&self, index: u64) -> bool {
        self.manager().segment_for_index(index).is_some()
    }

    /// Returns the index of the first entry still present in the log.
    #[must_use]
    pub fn first_index(&self) -> u64 {
        self.manager().first_index()
    }

    /// Returns the index of the last entry appended to the log.
    #[must_use]
    pub fn last_index(&self) -> u64 {
        self.manager().last_index()
    }

    /// Discards every entry after `index` (used to overwrite a losing Raft suffix).
    pub fn truncate(&self, index: u64) -> Result<()> {
        self.manager().truncate_after(index)
    }

    /// Flushes the writable tail segment to disk.
    pub fn flush(&self) -> Result<()> {
        self.manager().tail().flush()
    }

    /// Builds a [`Commit`] handle for the entry at `index`, to be handed to the state
    /// machine. Clamps the entry's replayed time to be non-decreasing across successive
    /// commits (see [`clamp_monotonic`]).
    pub fn commit(&self, index: u64, session: Option<u64>) -> Result<Commit> {
        let mut entry = self.get(index)?.ok_or(Error::OutOfRange {
            index,
            first_index: self.first_index(),
            last_index: self.last_index(),
        })?;

        let clamped = clamp_monotonic(self.0.last_applied_time.load(Ordering::Acquire), entry.time);
        self.0.last_applied_time.store(clamped, Ordering::Release);
        entry.time = clamped;

        Ok(Commit::new(
            entry,
            session,
            Arc::clone(&self.0.cleaner),
            Arc::clone(&self.0.leak_counter),
        ))
    }

    /// Shared handle to this log's [`Cleaner`], for wiring into a [`crate::compaction`] pool.
    #[must_use]
    pub fn cleaner(&self) -> Arc<Cleaner> {
        Arc::clone(&self.0.cleaner)
    }

    /// Shared handle to this log's [`SegmentManager`], for wiring into a
    /// [`crate::compaction`] pool.
    #[must_use]
    pub fn manager(&self) -> Arc<SegmentManager> {
        Arc::clone(&self.0.manager)
    }

    /// Iterates entries from `from` (inclusive) to the current `last_index()`, skipping any
    /// already reclaimed by compaction.
    #[must_use]
    pub fn iterator(&self, from: u64) -> LogIterator {
        LogIterator {
            log: self.clone(),
            next_index: from,
        }
    }
}

/// Sequential iterator over a [`Log`]'s live entries.
pub struct LogIterator {
    log: Log,
    next_index: u64,
}

impl Iterator for LogIterator {
    type Item = Result<Entry>;

    fn next(&mut self) -> Option<Self::Item> {
        while self.next_index <= self.log.last_index() {
            let index = self.next_index;
            self.next_index += 1;
            match self.log.get(index) {
                Ok(Some(entry)) => return Some(Ok(entry)),
                Ok(None) => continue,
                Err(e) => return Some(Err(e)),
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::EntryKind;
    use test_log::test;

    fn mk_entry(index: u64) -> Entry {
        Entry::new(index, 1, EntryKind::Command, index, format!("e{index}").as_bytes())
    }

    #[test]
    fn append_get_round_trip() -> Result<()> {
        let dir = tempfile::tempdir().expect("tempdir");
        let log = Log::open(dir.path(), "raft", 1000, 64 * 1024 * 1024)?;
        for i in 1..=1000 {
            log.append(mk_entry(i))?;
        }
        assert_eq!(log.last_index(), 1000);
        assert_eq!(log.get(500)?.unwrap().payload.as_ref(), b"e500");
        Ok(())
    }

    #[test]
    fn rolls_across_multiple_segments() -> Result<()> {
        let dir = tempfile::tempdir().expect("tempdir");
        let log = Log::open(dir.path(), "raft", 100, 64 * 1024 * 1024)?;
        for i in 1..=350 {
            log.append(mk_entry(i))?;
        }
        assert_eq!(log.manager().len(), 4);
        assert_eq!(log.get(250)?.unwrap().index, 250);
        Ok(())
    }

    #[test]
    fn rejects_non_monotonic_append() -> Result<()> {
        let dir = tempfile::tempdir().expect("tempdir");
        let log = Log::open(dir.path(), "raft", 100, 64 * 1024 * 1024)?;
        log.append(mk_entry(1))?;
        assert!(matches!(log.append(mk_entry(3)), Err(Error::NonMonotonicIndex { .. })));
        Ok(())
    }

    #[test]
    fn truncate_then_reappend() -> Result<()> {
        let dir = tempfile::tempdir().expect("tempdir");
        let log = Log::open(dir.path(), "raft", 100, 64 * 1024 * 1024)?;
        for i in 1..=500 {
            log.append(mk_entry(i))?;
        }
        log.truncate(120)?;
        assert_eq!(log.last_index(), 120);
        log.append(mk_entry(121))?;
        assert_eq!(log.get(121)?.unwrap().index, 121);
        Ok(())
    }

    #[test]
    fn iterator_yields_in_order() -> Result<()> {
        let dir = tempfile::tempdir().expect("tempdir");
        let log = Log::open(dir.path(), "raft", 100, 64 * 1024 * 1024)?;
        for i in 1..=250 {
            log.append(mk_entry(i))?;
        }
        let collected: Vec<u64> = log.iterator(100).map(|e| e.expect("ok").index).collect();
        assert_eq!(collected, (100..=250).collect::<Vec<_>>());
        Ok(())
    }

    #[test]
    fn reopen_recovers_state() -> Result<()> {
        let dir = tempfile::tempdir().expect("tempdir");
        {
            let log = Log::open(dir.path(), "raft", 100, 64 * 1024 * 1024)?;
            for i in 1..=250 {
                log.append(mk_entry(i))?;
            }
            log.flush()?;
        }

        let log = Log::open(dir.path(), "raft", 100, 64 * 1024 * 1024)?;
        assert_eq!(log.last_index(), 250);
        assert_eq!(log.get(200)?.unwrap().payload.as_ref(), b"e200");
        Ok(())
    }
}
