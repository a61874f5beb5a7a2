// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Small, frequently-rewritten Raft metadata: current term, vote, and snapshot markers.
//!
//! Grounded on the teacher's `src/manifest.rs` `rewrite_atomic`/`write_to_disk` (a fixed,
//! BigEndian-framed record, fully rewritten on every change rather than updated in place,
//! since the record is tiny and changes are infrequent — once per term change or snapshot).

use crate::error::Result;
use crate::segment::manager::rewrite_atomic;
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::path::{Path, PathBuf};
use std::sync::RwLock;

const META_MAGIC: u64 = 0x0052_4146_544D_4554; // tag, no external meaning required

/// A node's durable Raft identity: the term it last saw, who (if anyone) it voted for in
/// that term, and the highest index/term captured by its most recent snapshot.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MetaRecord {
    /// The term this node last saw.
    pub current_term: u64,
    /// Who this node voted for in `current_term`, if anyone.
    pub voted_for: Option<u64>,
    /// The highest index captured by the most recent snapshot.
    pub last_snapshot_index: u64,
    /// The term of `last_snapshot_index` at the time of the most recent snapshot.
    pub last_snapshot_term: u64,
}

impl MetaRecord {
    fn encode(self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(8 + 1 + 8 + 8 + 8);
        buf.write_u64::<BigEndian>(META_MAGIC).expect("vec write");
        buf.write_u8(self.voted_for.is_some() as u8).expect("vec write");
        buf.write_u64::<BigEndian>(self.voted_for.unwrap_or(0)).expect("vec write");
        buf.write_u64::<BigEndian>(self.current_term).expect("vec write");
        buf.write_u64::<BigEndian>(self.last_snapshot_index).expect("vec write");
        buf.write_u64::<BigEndian>(self.last_snapshot_term).expect("vec write");
        buf
    }

    fn decode(mut bytes: &[u8]) -> Option<Self> {
        let magic = bytes.read_u64::<BigEndian>().ok()?;
        if magic != META_MAGIC {
            return None;
        }
        let has_vote = bytes.read_u8().ok()? != 0;
        let vote = bytes.read_u64::<BigEndian>().ok()?;
        let current_term = bytes.read_u64::<BigEndian>().ok()?;
        let last_snapshot_index = bytes.read_u64::<BigEndian>().ok()?;
        let last_snapshot_term = bytes.read_u64::<BigEndian>().ok()?;
        Some(Self {
            current_term,
            voted_for: has_vote.then_some(vote),
            last_snapshot_index,
            last_snapshot_term,
        })
    }
}

/// Persists one [`MetaRecord`] at `<name>.meta`, rewriting the whole file atomically on every
/// change.
pub struct MetaStore {
    path: PathBuf,
    record: RwLock<MetaRecord>,
}

impl MetaStore {
    /// Opens (or initializes) the metadata file for `name` under `dir`.
    ///
    /// A missing or undersized `.meta` file is treated as "never voted, term 0, no
    /// snapshot" rather than an error (see `SPEC_FULL.md` §4.7 / §9): a brand-new replica has
    /// no prior metadata, and refusing to start would make it impossible to ever bootstrap one.
    pub fn open(dir: &Path, name: &str) -> Result<Self> {
        let path = dir.join(format!("{name}.meta"));
        let record = match std::fs::read(&path) {
            Ok(bytes) => MetaRecord::decode(&bytes).unwrap_or_else(|| {
                log::warn!("meta file {} is malformed, starting from defaults", path.display());
                MetaRecord::default()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => MetaRecord::default(),
            Err(e) => return Err(e.into()),
        };

        log::info!(
            "opened meta store '{name}': term={}, voted_for={:?}",
            record.current_term,
            record.voted_for
        );

        Ok(Self {
            path,
            record: RwLock::new(record),
        })
    }

    /// Returns the current term.
    #[must_use]
    pub fn current_term(&self) -> u64 {
        self.record.read().expect("lock poisoned").current_term
    }

    /// Returns who this node voted for in the current term, if anyone.
    #[must_use]
    pub fn voted_for(&self) -> Option<u64> {
        self.record.read().expect("lock poisoned").voted_for
    }

    /// Returns the `(index, term)` of the most recent snapshot.
    #[must_use]
    pub fn snapshot_markers(&self) -> (u64, u64) {
        let record = self.record.read().expect("lock poisoned");
        (record.last_snapshot_index, record.last_snapshot_term)
    }

    /// Persists a new term and vote.
    pub fn set_term_and_vote(&self, term: u64, voted_for: Option<u64>) -> Result<()> {
        let mut record = self.record.write().expect("lock poisoned");
        record.current_term = term;
        record.voted_for = voted_for;
        self.persist(*record)
    }

    /// Persists new snapshot markers.
    pub fn set_snapshot_markers(&self, index: u64, term: u64) -> Result<()> {
        let mut record = self.record.write().expect("lock poisoned");
        record.last_snapshot_index = index;
        record.last_snapshot_term = term;
        self.persist(*record)
    }

    fn persist(&self, record: MetaRecord) -> Result<()> {
        rewrite_atomic(&self.path, |w| w.write_all(&record.encode()))
    }
}
