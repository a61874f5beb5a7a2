// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Segmented, compacting replicated log storage for a Raft consensus server.
//!
//! Entries are appended to a writable tail segment and sealed into fixed-size, checksummed
//! files as the log grows. A background [`CompactionPool`] reclaims entries the embedding
//! state machine has marked clean: minor passes drop reclaimable entries in place inside an
//! otherwise-live segment, major passes additionally remove tombstone entries once they too
//! have been cleaned.
//!
//! # Example usage
//!
//! ```
//! use raft_log::{Config, Entry, EntryKind, Storage};
//!
//! # fn main() -> raft_log::Result<()> {
//! # let folder = tempfile::tempdir()?;
//! let config = Config::builder(folder.path()).build()?;
//! let storage = Storage::open(&config)?;
//!
//! let index = storage.log().append(Entry::new(1, 1, EntryKind::Command, 1, b"set x=1"))?;
//! let commit = storage.log().commit(index, None)?;
//! assert_eq!(commit.operation()?, b"set x=1");
//! commit.clean()?;
//!
//! storage.shutdown();
//! #
//! # Ok(())
//! # }
//! ```

#![doc(html_logo_url = "https://raw.githubusercontent.com/fjall-rs/value-log/main/logo.png")]
#![doc(html_favicon_url = "https://raw.githubusercontent.com/fjall-rs/value-log/main/logo.png")]
#![deny(unsafe_code)]
#![deny(clippy::all, missing_docs, clippy::cargo)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::indexing_slicing)]
#![warn(clippy::pedantic, clippy::nursery)]
#![warn(clippy::expect_used)]
#![allow(clippy::missing_const_for_fn)]
#![warn(clippy::multiple_crate_versions)]

mod cleaner;
mod codec;
mod commit;

#[doc(hidden)]
pub mod compaction;

mod config;
mod entry;
mod error;
mod id;
mod log;
mod meta_store;
mod segment;
mod storage;

pub use cleaner::Cleaner;
pub use commit::{clamp_monotonic, Commit};
pub use compaction::{CompactionPool, StopSignal};
pub use config::{Config, ConfigBuilder, StorageLevel};
pub use entry::{Entry, EntryKind, Index, Term};
pub use error::{Error, Result};
pub use id::SegmentId;
pub use log::{Log, LogIterator};
pub use meta_store::{MetaRecord, MetaStore};
pub use storage::Storage;

#[doc(hidden)]
pub use segment::Segment;
