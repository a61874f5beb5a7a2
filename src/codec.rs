// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! On-disk framing for a single log entry.
//!
//! Layout, little-endian throughout (mirrors the trailing-checksum framing used by
//! `commitlog`'s `Commit::write`/`StoredCommit::decode`, adapted to frame one entry instead
//! of a batch):
//!
//! ```text
//! u32 length          -- byte count of everything between this field and the checksum
//! u16 type_tag        -- EntryKind
//! u16 reserved        -- zero, reserved for future flags
//! u32 relative_offset -- entry's position within its segment (index - firstIndex)
//! u64 term
//! u64 time_millis
//! u32 payload_len
//! [u8; payload_len] payload
//! u32 crc32c          -- checksum over [type_tag .. payload] inclusive
//! ```
//!
//! `relative_offset` is carried in the frame itself, rather than inferred from physical
//! position, because minor compaction (`crate::compaction::minor`) rewrites a segment
//! keeping only its live entries: the surviving frames are packed contiguously in the file
//! but are no longer contiguous in relative offset, so a reopened segment needs each frame to
//! say where it belongs.

use crate::entry::{Entry, EntryKind};
use crate::error::{Error, Result};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Read, Write};
use std::sync::Arc;

/// Fixed portion of the frame: type_tag(2) + reserved(2) + relative_offset(4) + term(8) +
/// time(8) + payload_len(4).
const HEADER_LEN: usize = 2 + 2 + 4 + 8 + 8 + 4;

/// Encodes `entry` at `relative_offset` into `writer`, returning the total number of bytes
/// written (including the leading length field and trailing checksum).
pub fn encode_entry<W: Write>(entry: &Entry, relative_offset: u32, writer: &mut W) -> Result<u64> {
    let length = (HEADER_LEN + entry.payload.len()) as u32;

    let mut body = Vec::with_capacity(4 + length as usize);
    body.write_u32::<LittleEndian>(length)?;
    body.write_u16::<LittleEndian>(entry.kind.to_tag())?;
    body.write_u16::<LittleEndian>(0)?;
    body.write_u32::<LittleEndian>(relative_offset)?;
    body.write_u64::<LittleEndian>(entry.term)?;
    body.write_u64::<LittleEndian>(entry.time)?;
    body.write_u32::<LittleEndian>(entry.payload.len() as u32)?;
    body.write_all(&entry.payload)?;

    let checksum = crc32c::crc32c(&body[4..]);

    writer.write_all(&body)?;
    writer.write_u32::<LittleEndian>(checksum)?;

    Ok(body.len() as u64 + 4)
}

/// A decoded entry, missing the absolute `index` field that only the caller (who knows the
/// segment's `firstIndex`) can supply by adding it to `relative_offset`.
pub struct DecodedEntry {
    /// Position of this entry within its segment.
    pub relative_offset: u32,
    /// Term the entry was proposed in.
    pub term: u64,
    /// Kind tag.
    pub kind: EntryKind,
    /// Leader wall-clock time, millis since epoch.
    pub time: u64,
    /// Payload bytes.
    pub payload: Arc<[u8]>,
    /// Total bytes consumed from the reader, including length prefix and checksum.
    pub consumed: u64,
}

/// Decodes one entry frame from `reader`.
///
/// Returns `Err(Error::Decode(..))` for a structurally invalid frame (bad tag, checksum
/// mismatch) and propagates `Err(Error::Io(..))` for a short read, which the caller
/// (recovery scanning the tail segment) treats as a torn write and truncates at.
pub fn decode_entry<R: Read>(reader: &mut R) -> Result<DecodedEntry> {
    let length = reader.read_u32::<LittleEndian>()?;
    if (length as usize) < HEADER_LEN {
        return Err(Error::Decode(format!(
            "frame length {length} shorter than header ({HEADER_LEN})"
        )));
    }

    let mut body = vec![0_u8; length as usize];
    reader.read_exact(&mut body)?;

    let stored_checksum = reader.read_u32::<LittleEndian>()?;
    let computed_checksum = crc32c::crc32c(&body);
    if stored_checksum != computed_checksum {
        return Err(Error::Decode(format!(
            "checksum mismatch: stored {stored_checksum:#x}, computed {computed_checksum:#x}"
        )));
    }

    let mut cursor = &body[..];
    let type_tag = cursor.read_u16::<LittleEndian>()?;
    let _reserved = cursor.read_u16::<LittleEndian>()?;
    let relative_offset = cursor.read_u32::<LittleEndian>()?;
    let term = cursor.read_u64::<LittleEndian>()?;
    let time = cursor.read_u64::<LittleEndian>()?;
    let payload_len = cursor.read_u32::<LittleEndian>()? as usize;

    if cursor.len() != payload_len {
        return Err(Error::Decode(format!(
            "payload length {payload_len} does not match remaining frame bytes {}",
            cursor.len()
        )));
    }

    let kind = EntryKind::from_tag(type_tag)
        .ok_or_else(|| Error::Decode(format!("invalid entry type tag {type_tag}")))?;

    Ok(DecodedEntry {
        relative_offset,
        term,
        kind,
        time,
        payload: Arc::from(cursor),
        consumed: 4 + length as u64 + 4,
    })
}
