// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use std::sync::Arc;

/// The Raft term in which an entry was proposed.
pub type Term = u64;

/// The 1-based, strictly-increasing position of an entry in a log.
pub type Index = u64;

/// Tag identifying what an [`Entry`]'s payload represents.
///
/// `Query` is intentionally excluded: queries are answered from already-applied state and
/// have no representation here, so they cannot be appended to the log.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
#[non_exhaustive]
pub enum EntryKind {
    /// A state-machine command.
    Command,
    /// Raft no-op written by a new leader to commit entries from prior terms.
    NoOp,
    /// Cluster membership change.
    Configuration,
    /// Client session keep-alive.
    KeepAlive,
    /// Client session registration.
    Register,
    /// Client session termination; carries a tombstone: dependent entries (the session's
    /// prior commands) cannot be reclaimed until a major compaction removes both.
    Unregister,
}

impl EntryKind {
    /// Whether removing this entry requires a major compaction rather than a minor one.
    ///
    /// Tombstone-carrying kinds invalidate earlier entries, so a minor compaction (which
    /// only drops already-cleaned, non-tombstone entries in place) must never remove them.
    #[must_use]
    pub fn is_tombstone(self) -> bool {
        matches!(self, Self::Unregister)
    }

    pub(crate) fn to_tag(self) -> u16 {
        match self {
            Self::Command => 0,
            Self::NoOp => 1,
            Self::Configuration => 2,
            Self::KeepAlive => 3,
            Self::Register => 4,
            Self::Unregister => 5,
        }
    }

    pub(crate) fn from_tag(tag: u16) -> Option<Self> {
        match tag {
            0 => Some(Self::Command),
            1 => Some(Self::NoOp),
            2 => Some(Self::Configuration),
            3 => Some(Self::KeepAlive),
            4 => Some(Self::Register),
            5 => Some(Self::Unregister),
            _ => None,
        }
    }
}

/// A single entry in the replicated log.
///
/// `time` is the leader's wall-clock instant assigned at append, in milliseconds since the
/// Unix epoch; see [`crate::commit::clamp_monotonic`] for how replay keeps it non-decreasing.
#[derive(Clone, Debug)]
pub struct Entry {
    /// Position of this entry in the log.
    pub index: Index,
    /// Term in which this entry was proposed.
    pub term: Term,
    /// What kind of operation this entry carries.
    pub kind: EntryKind,
    /// Leader wall-clock time at append, millis since the Unix epoch.
    pub time: u64,
    /// Opaque, application-defined payload bytes.
    pub payload: Arc<[u8]>,
}

impl Entry {
    /// Builds an entry, copying `payload` into a fresh, cheaply-clonable buffer.
    #[must_use]
    pub fn new(index: Index, term: Term, kind: EntryKind, time: u64, payload: &[u8]) -> Self {
        Self {
            index,
            term,
            kind,
            time,
            payload: Arc::from(payload),
        }
    }
}
