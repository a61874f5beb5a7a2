// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Validating configuration builder.
//!
//! Generalizes the teacher's `Config<BC, FDC, C>` (plain chained setters, no validation, a
//! default stamped straight onto the struct) into a builder whose single fallible terminal
//! method, `build()`, rejects out-of-range values instead of accepting anything — the spec's
//! ambient configuration surface (§4.12) requires a validating constructor that the teacher's
//! own `Config` did not need, since a value log had no out-of-range inputs to reject.

use crate::error::{Error, Result};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Where a log's segment files physically live.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum StorageLevel {
    /// Backed by a process-lifetime temporary directory; never survives a restart. Useful
    /// for tests and ephemeral nodes that rely entirely on snapshot transfer to catch up.
    Memory,
    /// Backed by regular files, with the offset index memory-mapped.
    MappedDisk,
    /// Backed by regular files, no memory mapping beyond the offset index internals require.
    Disk,
}

/// Immutable, validated configuration for one [`crate::Storage`] instance.
#[derive(Clone, Debug)]
pub struct Config {
    pub(crate) directory: PathBuf,
    pub(crate) storage_level: StorageLevel,
    pub(crate) max_segment_bytes: u32,
    pub(crate) max_entries_per_segment: u32,
    pub(crate) compaction_threads: usize,
    pub(crate) minor_compaction_interval: Duration,
    pub(crate) major_compaction_interval: Duration,
    pub(crate) compaction_threshold: f32,
}

impl Config {
    /// Minimum `max_segment_bytes`: must exceed the fixed 64-byte segment descriptor.
    pub const MIN_SEGMENT_BYTES: u32 = crate::segment::descriptor::DESCRIPTOR_LEN as u32 + 1;

    /// Implementation cap on `max_entries_per_segment`.
    ///
    /// The spec's source material enforces a cap here without documenting why (see
    /// `SPEC_FULL.md` §9); this implementation's offset index stores one absolute `u64` file
    /// offset per relative entry, so there is no correctness reason to cap below `u32::MAX`,
    /// but a four-million-entry segment is already far larger than any sane roll threshold,
    /// so the cap is kept as a sanity bound rather than removed.
    pub const MAX_ENTRIES_PER_SEGMENT: u32 = 4 * 1024 * 1024;

    pub(crate) const DEFAULT_MAX_SEGMENT_BYTES: u32 = 64 * 1024 * 1024;
    pub(crate) const DEFAULT_MAX_ENTRIES_PER_SEGMENT: u32 = 100_000;
    pub(crate) const DEFAULT_COMPACTION_THREADS: usize = 2;
    pub(crate) const DEFAULT_MINOR_INTERVAL: Duration = Duration::from_secs(30);
    pub(crate) const DEFAULT_MAJOR_INTERVAL: Duration = Duration::from_secs(300);
    pub(crate) const DEFAULT_COMPACTION_THRESHOLD: f32 = 0.5;

    /// Starts a builder rooted at `directory`.
    #[must_use]
    pub fn builder(directory: impl Into<PathBuf>) -> ConfigBuilder {
        ConfigBuilder::new(directory)
    }

    /// Returns the root directory for this log's storage.
    #[must_use]
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Returns the configured storage level.
    #[must_use]
    pub fn storage_level(&self) -> StorageLevel {
        self.storage_level
    }

    /// Returns the configured maximum segment size in bytes.
    #[must_use]
    pub fn max_segment_bytes(&self) -> u32 {
        self.max_segment_bytes
    }

    /// Returns the configured maximum number of entries per segment.
    #[must_use]
    pub fn max_entries_per_segment(&self) -> u32 {
        self.max_entries_per_segment
    }

    /// Returns the configured number of background compaction threads.
    #[must_use]
    pub fn compaction_threads(&self) -> usize {
        self.compaction_threads
    }

    /// Returns the configured interval between minor compactions.
    #[must_use]
    pub fn minor_compaction_interval(&self) -> Duration {
        self.minor_compaction_interval
    }

    /// Returns the configured interval between major compactions.
    #[must_use]
    pub fn major_compaction_interval(&self) -> Duration {
        self.major_compaction_interval
    }

    /// Returns the configured clean-ratio threshold that triggers compaction.
    #[must_use]
    pub fn compaction_threshold(&self) -> f32 {
        self.compaction_threshold
    }
}

/// Chained-setter builder for [`Config`]; mirrors the teacher's `Config::new().foo().bar()`
/// shape but defers validation to [`ConfigBuilder::build`].
pub struct ConfigBuilder {
    directory: PathBuf,
    storage_level: StorageLevel,
    max_segment_bytes: u32,
    max_entries_per_segment: u32,
    compaction_threads: usize,
    minor_compaction_interval: Duration,
    major_compaction_interval: Duration,
    compaction_threshold: f32,
}

impl ConfigBuilder {
    /// Creates a new builder rooted at `directory`, with all other fields defaulted.
    #[must_use]
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            storage_level: StorageLevel::Disk,
            max_segment_bytes: Config::DEFAULT_MAX_SEGMENT_BYTES,
            max_entries_per_segment: Config::DEFAULT_MAX_ENTRIES_PER_SEGMENT,
            compaction_threads: Config::DEFAULT_COMPACTION_THREADS,
            minor_compaction_interval: Config::DEFAULT_MINOR_INTERVAL,
            major_compaction_interval: Config::DEFAULT_MAJOR_INTERVAL,
            compaction_threshold: Config::DEFAULT_COMPACTION_THRESHOLD,
        }
    }

    /// Sets the storage level (disk or in-memory).
    #[must_use]
    pub fn storage_level(mut self, level: StorageLevel) -> Self {
        self.storage_level = level;
        self
    }

    /// Sets the maximum size in bytes of a single segment.
    #[must_use]
    pub fn max_segment_bytes(mut self, bytes: u32) -> Self {
        self.max_segment_bytes = bytes;
        self
    }

    /// Sets the maximum number of entries per segment.
    #[must_use]
    pub fn max_entries_per_segment(mut self, entries: u32) -> Self {
        self.max_entries_per_segment = entries;
        self
    }

    /// Sets the number of background compaction threads.
    #[must_use]
    pub fn compaction_threads(mut self, threads: usize) -> Self {
        self.compaction_threads = threads;
        self
    }

    /// Sets the interval between minor compactions.
    #[must_use]
    pub fn minor_compaction_interval(mut self, interval: Duration) -> Self {
        self.minor_compaction_interval = interval;
        self
    }

    /// Sets the interval between major compactions.
    #[must_use]
    pub fn major_compaction_interval(mut self, interval: Duration) -> Self {
        self.major_compaction_interval = interval;
        self
    }

    /// Sets the clean-ratio threshold that triggers compaction.
    #[must_use]
    pub fn compaction_threshold(mut self, ratio: f32) -> Self {
        self.compaction_threshold = ratio;
        self
    }

    /// Validates every field, returning the first violation found.
    pub fn build(self) -> Result<Config> {
        if self.directory.exists() && !self.directory.is_dir() {
            return Err(Error::Config(format!(
                "directory {} exists and is not a directory",
                self.directory.display()
            )));
        }
        if self.max_segment_bytes < Config::MIN_SEGMENT_BYTES {
            return Err(Error::Config(format!(
                "max_segment_bytes must be at least {}, got {}",
                Config::MIN_SEGMENT_BYTES,
                self.max_segment_bytes
            )));
        }
        if self.max_entries_per_segment == 0 {
            return Err(Error::Config("max_entries_per_segment must be nonzero".into()));
        }
        if self.max_entries_per_segment > Config::MAX_ENTRIES_PER_SEGMENT {
            return Err(Error::Config(format!(
                "max_entries_per_segment must be at most {}, got {}",
                Config::MAX_ENTRIES_PER_SEGMENT,
                self.max_entries_per_segment
            )));
        }
        if self.compaction_threads == 0 {
            return Err(Error::Config("compaction_threads must be nonzero".into()));
        }
        if !(self.compaction_threshold > 0.0 && self.compaction_threshold <= 1.0) {
            return Err(Error::Config(format!(
                "compaction_threshold must be in (0.0, 1.0], got {}",
                self.compaction_threshold
            )));
        }

        Ok(Config {
            directory: self.directory,
            storage_level: self.storage_level,
            max_segment_bytes: self.max_segment_bytes,
            max_entries_per_segment: self.max_entries_per_segment,
            compaction_threads: self.compaction_threads,
            minor_compaction_interval: self.minor_compaction_interval,
            major_compaction_interval: self.major_compaction_interval,
            compaction_threshold: self.compaction_threshold,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn defaults_build_successfully() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = Config::builder(dir.path()).build().expect("valid");
        assert_eq!(config.compaction_threads(), Config::DEFAULT_COMPACTION_THREADS);
    }

    #[test]
    fn rejects_zero_compaction_threads() {
        let dir = tempfile::tempdir().expect("tempdir");
        let result = Config::builder(dir.path()).compaction_threads(0).build();
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn rejects_threshold_out_of_range() {
        let dir = tempfile::tempdir().expect("tempdir");
        let result = Config::builder(dir.path()).compaction_threshold(1.5).build();
        assert!(matches!(result, Err(Error::Config(_))));
        let result = Config::builder(dir.path()).compaction_threshold(0.0).build();
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn rejects_tiny_segment_size() {
        let dir = tempfile::tempdir().expect("tempdir");
        let result = Config::builder(dir.path()).max_segment_bytes(4).build();
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn rejects_oversized_entry_cap() {
        let dir = tempfile::tempdir().expect("tempdir");
        let result = Config::builder(dir.path())
            .max_entries_per_segment(Config::MAX_ENTRIES_PER_SEGMENT + 1)
            .build();
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn rejects_non_directory_path() {
        let dir = tempfile::tempdir().expect("tempdir");
        let file_path = dir.path().join("not-a-dir");
        std::fs::write(&file_path, b"x").expect("write");
        let result = Config::builder(&file_path).build();
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
