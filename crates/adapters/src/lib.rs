// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
// Enable coverage(off) attribute for excluding test infrastructure
#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

//! Adapters for external I/O: the messaging platform and persistence

pub mod sender;
pub mod store;
pub mod traced;

pub use sender::{HttpSender, HttpSenderConfig, MessageSender, NoOpSender, SendReceipt};
pub use store::{ActiveEnrollment, EnrollmentStore, InteractionStore};
pub use traced::TracedSender;

// Test support - only compiled for tests or when explicitly requested
#[cfg(any(test, feature = "test-support"))]
pub use sender::{FakeSender, SendCall};
