// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Cadence daemon (cadenced): configuration, adapter wiring and lifecycle

pub mod config;
pub mod lifecycle;
pub mod sender;

pub use config::{Config, ConfigError};
pub use lifecycle::{check, startup, Daemon, DaemonRuntime, LifecycleError};
pub use sender::DaemonSender;
