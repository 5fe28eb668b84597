// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Message delivery adapters

mod http;
mod noop;

pub use http::{HttpSender, HttpSenderConfig};
pub use noop::NoOpSender;

// Test support - only compiled for tests or when explicitly requested
#[cfg(any(test, feature = "test-support"))]
mod fake;
#[cfg(any(test, feature = "test-support"))]
pub use fake::{FakeSender, SendCall};

use async_trait::async_trait;
use cadence_core::{Result, SubjectId};
use serde::{Deserialize, Serialize};

/// What the messaging platform reported for an accepted message
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendReceipt {
    /// Platform id of the message, when the platform assigns one
    pub message_id: Option<String>,
}

/// Adapter for the external messaging platform.
///
/// Errors must carry a status (HTTP-like) or a kind the delivery worker can
/// classify with `Error::is_retryable`.
#[async_trait]
pub trait MessageSender: Clone + Send + Sync + 'static {
    /// Deliver one message to a recipient
    async fn send(
        &self,
        recipient: &SubjectId,
        message_type: &str,
        content: &serde_json::Value,
    ) -> Result<SendReceipt>;

    /// Cheap reachability probe used by health checks
    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}
