// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Top-level entry point bundling a [`Log`], its [`MetaStore`], and a background
//! [`CompactionPool`] into one handle.
//!
//! Generalizes the teacher's `ValueLog::open` (creating the base folder, then dispatching to
//! `create_new`/`recover` based on a marker file) into a single constructor over a validated
//! [`Config`] that additionally wires up the compaction pool the teacher's value log does not
//! need a persistent background pass for (its garbage collection is invoked on demand, not on
//! a timer).

use crate::compaction::CompactionPool;
use crate::config::{Config, StorageLevel};
use crate::error::Result;
use crate::log::Log;
use crate::meta_store::MetaStore;
use std::sync::Arc;

const LOG_NAME: &str = "raft";

/// A fully wired log: segmented entry storage, durable metadata, and background compaction.
pub struct Storage {
    log: Log,
    meta: Arc<MetaStore>,
    compaction: Option<CompactionPool>,
}

impl Storage {
    /// Opens (or bootstraps) storage rooted at `config.directory()`.
    ///
    /// [`StorageLevel::Memory`] is honored by the caller choosing an ephemeral `directory`
    /// (e.g. a `tempfile::TempDir` kept alive alongside this handle); the engine itself always
    /// talks to real files; there is no separate in-memory code path to diverge from recovery.
    pub fn open(config: &Config) -> Result<Self> {
        std::fs::create_dir_all(config.directory())?;

        let log = Log::open(
            config.directory(),
            LOG_NAME,
            config.max_entries_per_segment(),
            config.max_segment_bytes(),
        )?;
        let meta = Arc::new(MetaStore::open(config.directory(), LOG_NAME)?);

        let compaction = match config.storage_level() {
            StorageLevel::Memory => None,
            StorageLevel::MappedDisk | StorageLevel::Disk => {
                Some(CompactionPool::start(log.clone(), config))
            }
        };

        Ok(Self {
            log,
            meta,
            compaction,
        })
    }

    /// The replicated entry log.
    #[must_use]
    pub fn log(&self) -> &Log {
        &self.log
    }

    /// Durable term/vote/snapshot-marker metadata.
    #[must_use]
    pub fn meta(&self) -> &MetaStore {
        &self.meta
    }

    /// Total compaction jobs abandoned after exhausting their retries, or `0` if compaction
    /// is not running (see [`StorageLevel::Memory`]).
    #[must_use]
    pub fn compaction_failure_count(&self) -> u64 {
        self.compaction.as_ref().map_or(0, CompactionPool::failure_count)
    }

    /// Stops the background compaction pool, if one is running. Dropping `Storage` without
    /// calling this leaves the pool's threads detached for the remainder of the process, since
    /// `CompactionPool` has no `Drop` impl of its own (mirroring the teacher's `ValueLog`,
    /// which likewise relies on explicit shutdown rather than drop glue for its worker pool).
    pub fn shutdown(self) {
        if let Some(pool) = self.compaction {
            pool.shutdown();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn opens_and_reopens() -> Result<()> {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = Config::builder(dir.path()).build()?;
        {
            let storage = Storage::open(&config)?;
            storage.log().append(crate::entry::Entry::new(
                1,
                1,
                crate::entry::EntryKind::Command,
                1,
                b"x",
            ))?;
            storage.meta().set_term_and_vote(5, Some(2))?;
            storage.shutdown();
        }

        let storage = Storage::open(&config)?;
        assert_eq!(storage.log().last_index(), 1);
        assert_eq!(storage.meta().current_term(), 5);
        storage.shutdown();
        Ok(())
    }

    #[test]
    fn memory_level_skips_compaction_pool() -> Result<()> {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = Config::builder(dir.path())
            .storage_level(StorageLevel::Memory)
            .build()?;
        let storage = Storage::open(&config)?;
        assert_eq!(storage.compaction_failure_count(), 0);
        storage.shutdown();
        Ok(())
    }
}
