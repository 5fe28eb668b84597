// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Traced adapter wrappers for consistent observability

use crate::sender::{MessageSender, SendReceipt};
use async_trait::async_trait;
use cadence_core::{Result, SubjectId};
use tracing::Instrument;

/// Wrapper that adds tracing to any MessageSender
#[derive(Clone)]
pub struct TracedSender<S> {
    inner: S,
}

impl<S> TracedSender<S> {
    pub fn new(inner: S) -> Self {
        Self { inner }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }
}

#[async_trait]
impl<S: MessageSender> MessageSender for TracedSender<S> {
    async fn send(
        &self,
        recipient: &SubjectId,
        message_type: &str,
        content: &serde_json::Value,
    ) -> Result<SendReceipt> {
        let span = tracing::info_span!("sender.send", %recipient, message_type);
        async {
            tracing::info!("sending");
            let start = std::time::Instant::now();
            let result = self.inner.send(recipient, message_type, content).await;
            let elapsed = start.elapsed();

            match &result {
                Ok(receipt) => tracing::info!(
                    message_id = receipt.message_id.as_deref().unwrap_or("-"),
                    elapsed_ms = elapsed.as_millis() as u64,
                    "message sent"
                ),
                Err(e) => tracing::error!(
                    elapsed_ms = elapsed.as_millis() as u64,
                    status = e.status,
                    retryable = e.is_retryable(),
                    error = %e,
                    "send failed"
                ),
            }
            result
        }
        .instrument(span)
        .await
    }

    async fn ping(&self) -> Result<()> {
        let span = tracing::info_span!("sender.ping");
        async {
            let result = self.inner.ping().await;
            if let Err(e) = &result {
                tracing::warn!(error = %e, "ping failed");
            }
            result
        }
        .instrument(span)
        .await
    }
}

#[cfg(test)]
#[path = "traced_tests.rs"]
mod tests;
