// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Background reclamation of cleaned log entries.

pub mod backoff;
pub mod major;
pub mod minor;
pub mod pool;
pub mod strategy;

pub use pool::{CompactionPool, StopSignal};
