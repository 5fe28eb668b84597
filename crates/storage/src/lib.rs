// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Storage for cadence: an in-memory enrollment and interaction store
//! with optimistic versioning, seed loading, and JSON snapshots

mod memory;
mod seed;
mod snapshot;

pub use memory::MemoryStore;
pub use seed::{Seed, SeedError};
pub use snapshot::{SnapshotError, SnapshotStore};
