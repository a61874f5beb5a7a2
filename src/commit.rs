// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! The bounded-lifetime handle surrendered to the state machine for one applied entry.
//!
//! Generalizes the teacher's `src/handle.rs` (`ValueHandle { segment_id, offset }`, a plain
//! data pointer with no lifecycle) into a handle with the `Open` -> `{Closed, Cleaned}` state
//! machine the spec requires (§4.6): the state machine must terminate every handle with
//! exactly one terminal call, and a handle dropped without termination is a detectable leak,
//! neither of which a plain data struct can express.

use crate::cleaner::Cleaner;
use crate::entry::{Entry, EntryKind};
use crate::error::{Error, Result};
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};
use std::sync::Arc;

const STATE_OPEN: u8 = 0;
const STATE_CLOSED: u8 = 1;
const STATE_CLEANED: u8 = 2;

/// Clamps a replayed entry's wall-clock time to be non-decreasing relative to the previous
/// commit, so the state machine always observes a monotone clock even if a leader's local
/// time moved backward between two entries (e.g. after an NTP step).
#[must_use]
pub fn clamp_monotonic(previous: u64, raw: u64) -> u64 {
    previous.max(raw)
}

/// A single applied entry, handed to the state machine with shared ownership of the
/// underlying [`Cleaner`] so it can report the entry reclaimable on `clean()`.
///
/// Exactly one of [`Commit::close`] or [`Commit::clean`] must be called before the handle is
/// dropped. A second terminal call (or a field accessor after termination) returns
/// [`Error::InvalidState`]. A handle dropped while still `Open` logs a warning and increments
/// a shared leak counter rather than panicking, since a leak is a bug in the embedding state
/// machine, not in the log itself.
pub struct Commit {
    entry: Entry,
    session: Option<u64>,
    state: AtomicU8,
    cleaner: Arc<Cleaner>,
    leak_counter: Arc<AtomicU64>,
}

impl Commit {
    pub(crate) fn new(
        entry: Entry,
        session: Option<u64>,
        cleaner: Arc<Cleaner>,
        leak_counter: Arc<AtomicU64>,
    ) -> Self {
        Self {
            entry,
            session,
            state: AtomicU8::new(STATE_OPEN),
            cleaner,
            leak_counter,
        }
    }

    fn check_open(&self) -> Result<()> {
        if self.state.load(Ordering::Acquire) == STATE_OPEN {
            Ok(())
        } else {
            Err(Error::InvalidState)
        }
    }

    /// Returns the log index of the entry this handle wraps.
    #[must_use]
    pub fn index(&self) -> u64 {
        self.entry.index
    }

    /// Returns the term of the entry this handle wraps.
    #[must_use]
    pub fn term(&self) -> u64 {
        self.entry.term
    }

    /// Returns the timestamp of the entry this handle wraps.
    #[must_use]
    pub fn time(&self) -> u64 {
        self.entry.time
    }

    /// Returns the client session associated with this entry, if any.
    #[must_use]
    pub fn session(&self) -> Option<u64> {
        self.session
    }

    /// Returns the kind of the entry this handle wraps.
    #[must_use]
    pub fn kind(&self) -> EntryKind {
        self.entry.kind
    }

    /// The entry's payload, if the handle has not yet been terminated.
    pub fn operation(&self) -> Result<&[u8]> {
        self.check_open()?;
        Ok(&self.entry.payload)
    }

    /// Terminates the handle leaving the entry live (not eligible for reclamation).
    pub fn close(&self) -> Result<()> {
        self.state
            .compare_exchange(STATE_OPEN, STATE_CLOSED, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(|_| Error::InvalidState)
    }

    /// Terminates the handle, marking the entry reclaimable by the cleaner.
    pub fn clean(&self) -> Result<()> {
        self.state
            .compare_exchange(STATE_OPEN, STATE_CLEANED, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| Error::InvalidState)?;
        self.cleaner.clean(self.entry.index)
    }
}

impl Drop for Commit {
    fn drop(&mut self) {
        if self.state.load(Ordering::Acquire) == STATE_OPEN {
            log::warn!(
                "commit handle for index {} dropped without close()/clean() — leak",
                self.entry.index
            );
            self.leak_counter.fetch_add(1, Ordering::Relaxed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::EntryKind;
    use crate::segment::manager::SegmentManager;
    use test_log::test;

    fn setup() -> (Arc<Cleaner>, Arc<AtomicU64>, tempfile::TempDir) {
        let dir = tempfile::tempdir().expect("tempdir");
        let manager = Arc::new(
            SegmentManager::create_new(dir.path(), "raft", 100, 1024 * 1024).expect("create"),
        );
        manager
            .tail()
            .append(&Entry::new(1, 1, EntryKind::Command, 10, b"x"))
            .expect("append");
        (Arc::new(Cleaner::new(manager)), Arc::new(AtomicU64::new(0)), dir)
    }

    #[test]
    fn close_then_clean_is_invalid_state() {
        let (cleaner, leaks, _dir) = setup();
        let commit = Commit::new(
            Entry::new(1, 1, EntryKind::Command, 10, b"x"),
            None,
            cleaner,
            leaks,
        );
        commit.close().expect("first close ok");
        assert!(matches!(commit.clean(), Err(Error::InvalidState)));
    }

    #[test]
    fn double_close_is_invalid_state() {
        let (cleaner, leaks, _dir) = setup();
        let commit = Commit::new(
            Entry::new(1, 1, EntryKind::Command, 10, b"x"),
            None,
            cleaner,
            leaks,
        );
        commit.close().expect("first close ok");
        assert!(matches!(commit.close(), Err(Error::InvalidState)));
    }

    #[test]
    fn clean_marks_entry_and_transitions() {
        let (cleaner, leaks, _dir) = setup();
        let commit = Commit::new(
            Entry::new(1, 1, EntryKind::Command, 10, b"x"),
            None,
            Arc::clone(&cleaner),
            leaks,
        );
        commit.clean().expect("clean ok");
        assert_eq!(cleaner.clean_ratio_for(1), Some(1.0));
    }

    #[test]
    fn drop_without_termination_increments_leak_counter() {
        let (cleaner, leaks, _dir) = setup();
        {
            let _commit = Commit::new(
                Entry::new(1, 1, EntryKind::Command, 10, b"x"),
                None,
                cleaner,
                Arc::clone(&leaks),
            );
        }
        assert_eq!(leaks.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn clamp_monotonic_never_goes_backward() {
        assert_eq!(clamp_monotonic(100, 50), 100);
        assert_eq!(clamp_monotonic(100, 150), 150);
    }
}
