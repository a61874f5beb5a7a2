// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::SegmentId;

/// Errors that can occur while operating a replicated log.
///
/// Internal-only control-flow signals (segment full, sealed) are intercepted by the
/// [`crate::Log`] façade and never surface past it; every other variant here is part of
/// the externally documented error contract.
#[derive(Debug)]
#[non_exhaustive]
pub enum Error {
    /// Underlying I/O failure.
    Io(std::io::Error),

    /// A sealed segment's descriptor or checksum did not validate on open.
    CorruptSegment {
        /// Segment that failed to validate.
        segment_id: SegmentId,
        /// Human-readable reason.
        reason: String,
    },

    /// An entry was requested at an index outside `[firstIndex, lastIndex]`.
    OutOfRange {
        /// Requested index.
        index: u64,
        /// Current first index of the log.
        first_index: u64,
        /// Current last index of the log.
        last_index: u64,
    },

    /// `append` was called with an index other than `lastIndex() + 1`.
    NonMonotonicIndex {
        /// Index that was appended.
        got: u64,
        /// Index that was expected.
        expected: u64,
    },

    /// A [`crate::Commit`] handle was used after being terminated.
    InvalidState,

    /// Segment full; internal signal absorbed by [`crate::Log::append`] to trigger a roll.
    SegmentFull,

    /// Write attempted against a sealed segment; internal signal.
    Sealed,

    /// Builder validation failed.
    Config(String),

    /// Entry framing failed to decode (bad tag, truncated buffer).
    Decode(String),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "I/O error: {e}"),
            Self::CorruptSegment { segment_id, reason } => {
                write!(f, "segment {segment_id} is corrupt: {reason}")
            }
            Self::OutOfRange {
                index,
                first_index,
                last_index,
            } => write!(
                f,
                "index {index} out of range [{first_index}, {last_index}]"
            ),
            Self::NonMonotonicIndex { got, expected } => {
                write!(f, "non-monotonic append: got index {got}, expected {expected}")
            }
            Self::InvalidState => write!(f, "commit handle used after termination"),
            Self::SegmentFull => write!(f, "segment is full"),
            Self::Sealed => write!(f, "segment is sealed"),
            Self::Config(msg) => write!(f, "invalid configuration: {msg}"),
            Self::Decode(msg) => write!(f, "failed to decode entry: {msg}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

/// Result type used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;
