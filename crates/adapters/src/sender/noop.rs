// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! No-op sender for deployments without a messaging endpoint.

use super::{MessageSender, SendReceipt};
use async_trait::async_trait;
use cadence_core::{IdGen, Result, SubjectId, UuidIdGen};

/// Sender that accepts every message without sending it.
///
/// Each message gets a fresh `noop-` id so the interaction log still links
/// responses to sends.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoOpSender;

impl NoOpSender {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl MessageSender for NoOpSender {
    async fn send(
        &self,
        recipient: &SubjectId,
        message_type: &str,
        _content: &serde_json::Value,
    ) -> Result<SendReceipt> {
        tracing::debug!(%recipient, message_type, "no-op send");
        Ok(SendReceipt {
            message_id: Some(format!("noop-{}", UuidIdGen.next())),
        })
    }
}
