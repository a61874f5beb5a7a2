// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Fixed-size segment descriptor, stored at offset 0 of every segment file.
//!
//! Mirrors the trailer-with-magic idiom of the teacher's `segment/trailer.rs`, moved to the
//! front of the file so recovery can identify a segment without a tail seek.

use crate::id::SegmentId;
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Read, Write};

/// Pinned by the on-disk format contract.
const MAGIC: u64 = 0x434F_5059_4341_5420;

const FORMAT_VERSION: u16 = 1;

/// Bit 0 of `flags`: segment has been sealed (read-only).
const FLAG_SEALED: u16 = 0b0000_0001;

/// Total on-disk size of the descriptor, including reserved padding.
pub const DESCRIPTOR_LEN: u64 = 64;

const RESERVED_LEN: usize = 12;

/// The fixed header written at the start of every segment file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SegmentDescriptor {
    /// Unique, monotonically increasing segment identifier.
    pub id: SegmentId,
    /// Bumped every time this id's range is rewritten by compaction.
    pub segment_version: u32,
    /// Index of the first entry in this segment.
    pub first_index: u64,
    /// Capacity in entry count before the segment must roll.
    pub max_entries: u32,
    /// Capacity in bytes before the segment must roll.
    pub max_bytes: u32,
    /// Whether the segment is sealed (read-only).
    pub sealed: bool,
    /// Millis since epoch at last write.
    pub updated_millis: u64,
}

impl SegmentDescriptor {
    /// Serializes the descriptor to exactly [`DESCRIPTOR_LEN`] bytes.
    pub fn write<W: Write>(&self, writer: &mut W) -> std::io::Result<()> {
        let mut body = Vec::with_capacity(DESCRIPTOR_LEN as usize - 4);
        body.write_u64::<LittleEndian>(MAGIC)?;
        body.write_u16::<LittleEndian>(FORMAT_VERSION)?;
        body.write_u16::<LittleEndian>(if self.sealed { FLAG_SEALED } else { 0 })?;
        body.write_u64::<LittleEndian>(self.id)?;
        body.write_u32::<LittleEndian>(self.segment_version)?;
        body.write_u64::<LittleEndian>(self.first_index)?;
        body.write_u32::<LittleEndian>(self.max_entries)?;
        body.write_u32::<LittleEndian>(self.max_bytes)?;
        body.write_u64::<LittleEndian>(self.updated_millis)?;
        body.extend(std::iter::repeat(0u8).take(RESERVED_LEN));

        let crc = crc32c::crc32c(&body);

        writer.write_all(&body)?;
        writer.write_u32::<LittleEndian>(crc)?;
        debug_assert_eq!(body.len() as u64 + 4, DESCRIPTOR_LEN);
        Ok(())
    }

    /// Parses a descriptor from exactly [`DESCRIPTOR_LEN`] bytes, validating magic and CRC.
    pub fn read<R: Read>(reader: &mut R) -> std::io::Result<Self> {
        let mut buf = vec![0_u8; DESCRIPTOR_LEN as usize];
        reader.read_exact(&mut buf)?;

        let body = &buf[..buf.len() - 4];
        let stored_crc = (&buf[buf.len() - 4..]).read_u32::<LittleEndian>()?;
        let computed_crc = crc32c::crc32c(body);
        if stored_crc != computed_crc {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("segment descriptor checksum mismatch: stored {stored_crc:#x}, computed {computed_crc:#x}"),
            ));
        }

        let mut cursor = body;
        let magic = cursor.read_u64::<LittleEndian>()?;
        if magic != MAGIC {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("bad segment descriptor magic: {magic:#x}"),
            ));
        }

        let format_version = cursor.read_u16::<LittleEndian>()?;
        if format_version != FORMAT_VERSION {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("unsupported segment descriptor version: {format_version}"),
            ));
        }

        let flags = cursor.read_u16::<LittleEndian>()?;
        let id = cursor.read_u64::<LittleEndian>()?;
        let segment_version = cursor.read_u32::<LittleEndian>()?;
        let first_index = cursor.read_u64::<LittleEndian>()?;
        let max_entries = cursor.read_u32::<LittleEndian>()?;
        let max_bytes = cursor.read_u32::<LittleEndian>()?;
        let updated_millis = cursor.read_u64::<LittleEndian>()?;

        Ok(Self {
            id,
            segment_version,
            first_index,
            max_entries,
            max_bytes,
            sealed: flags & FLAG_SEALED != 0,
            updated_millis,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    fn sample() -> SegmentDescriptor {
        SegmentDescriptor {
            id: 42,
            segment_version: 3,
            first_index: 1001,
            max_entries: 10_000,
            max_bytes: 64 * 1024 * 1024,
            sealed: true,
            updated_millis: 1_700_000_000_000,
        }
    }

    #[test]
    fn round_trip() {
        let desc = sample();
        let mut buf = Vec::new();
        desc.write(&mut buf).expect("write");
        assert_eq!(buf.len() as u64, DESCRIPTOR_LEN);

        let parsed = SegmentDescriptor::read(&mut &buf[..]).expect("read");
        assert_eq!(parsed, desc);
    }

    #[test]
    fn rejects_bad_magic() {
        let desc = sample();
        let mut buf = Vec::new();
        desc.write(&mut buf).expect("write");
        buf[0] ^= 0xFF;

        assert!(SegmentDescriptor::read(&mut &buf[..]).is_err());
    }

    #[test]
    fn rejects_bitflip() {
        let desc = sample();
        let mut buf = Vec::new();
        desc.write(&mut buf).expect("write");
        let last = buf.len() - 20;
        buf[last] ^= 0x01;

        assert!(SegmentDescriptor::read(&mut &buf[..]).is_err());
    }
}
