// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Sequential segment body scanner.
//!
//! Generalizes the teacher's `segment/reader.rs` (`Iterator<Item = Result<(key, value,
//! checksum)>>` terminated by a trailer magic) to a Raft segment: there is no trailer to
//! terminate on, so the scanner instead distinguishes a clean end-of-file from a torn
//! trailing frame, which is how recovery (`crate::segment::manager`) detects and truncates a
//! crash-interrupted write to the tail segment.

use crate::codec::{decode_entry, DecodedEntry};
use crate::entry::Entry;
use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::Path;

/// One scanned record: the entry plus the file offset it started at, needed to rebuild the
/// offset index.
pub struct ScannedEntry {
    /// File offset (absolute, including the leading descriptor) this frame started at.
    pub file_offset: u64,
    /// Bytes consumed by this frame.
    pub consumed: u64,
    /// The decoded frame contents (missing `index`, assigned by the caller).
    pub decoded: DecodedEntry,
}

/// Scans entry frames sequentially starting at `start_offset`.
///
/// When `lenient` is `true` (used during recovery scanning of the tail segment), a short
/// read or checksum failure at the current position is treated as a torn trailing write:
/// the iterator simply ends instead of yielding an error, and the caller inspects
/// [`SegmentScanner::torn`] to find out whether that happened.
pub struct SegmentScanner {
    inner: BufReader<File>,
    position: u64,
    lenient: bool,
    torn: bool,
    done: bool,
}

impl SegmentScanner {
    /// Opens `path` and seeks to `start_offset` before scanning.
    pub fn open(path: impl AsRef<Path>, start_offset: u64, lenient: bool) -> crate::Result<Self> {
        let mut file = File::open(path)?;
        file.seek(SeekFrom::Start(start_offset))?;
        Ok(Self {
            inner: BufReader::new(file),
            position: start_offset,
            lenient,
            torn: false,
            done: false,
        })
    }

    /// Whether the scan stopped because of a torn trailing frame (only meaningful when
    /// `lenient` was set).
    #[must_use]
    pub fn torn(&self) -> bool {
        self.torn
    }

    /// File offset immediately past the last successfully scanned frame.
    #[must_use]
    pub fn position(&self) -> u64 {
        self.position
    }
}

impl Iterator for SegmentScanner {
    type Item = crate::Result<ScannedEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        // A zero-length peek distinguishes "no more bytes" from "a frame started but was
        // cut short", since read_exact on an empty reader also returns UnexpectedEof.
        let mut probe = [0_u8; 1];
        match self.inner.read(&mut probe) {
            Ok(0) => {
                self.done = true;
                return None;
            }
            Ok(_) => {
                // Rewind the single probed byte by re-reading the frame from `position`.
                if let Err(e) = self.inner.seek(SeekFrom::Start(self.position)) {
                    self.done = true;
                    return Some(Err(e.into()));
                }
            }
            Err(e) => {
                self.done = true;
                return Some(Err(e.into()));
            }
        }

        let start = self.position;
        match decode_entry(&mut self.inner) {
            Ok(decoded) => {
                self.position = start + decoded.consumed;
                Some(Ok(ScannedEntry {
                    file_offset: start,
                    consumed: decoded.consumed,
                    decoded,
                }))
            }
            Err(e) => {
                self.done = true;
                if self.lenient {
                    self.torn = true;
                    log::warn!(
                        "torn trailing entry frame at offset {start} ({e}), truncating recovery scan here"
                    );
                    None
                } else {
                    Some(Err(e))
                }
            }
        }
    }
}

/// Materializes one scanned record into an [`Entry`] given the segment's `first_index`; the
/// record's position within the segment is carried in its own frame (see `crate::codec`).
pub fn to_entry(first_index: u64, scanned: &ScannedEntry) -> Entry {
    Entry {
        index: first_index + u64::from(scanned.decoded.relative_offset),
        term: scanned.decoded.term,
        kind: scanned.decoded.kind,
        time: scanned.decoded.time,
        payload: scanned.decoded.payload.clone(),
    }
}
