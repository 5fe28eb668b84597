// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The daemon's message sender, chosen from the `[sender]` section

use crate::config::SenderSection;
use async_trait::async_trait;
use cadence_adapters::{
    HttpSender, HttpSenderConfig, MessageSender, NoOpSender, SendReceipt, TracedSender,
};
use cadence_core::{Result, SubjectId};

/// HTTP gateway when an endpoint is configured, otherwise a no-op sender.
/// Both are wrapped with tracing.
#[derive(Clone)]
pub enum DaemonSender {
    Http(TracedSender<HttpSender>),
    NoOp(TracedSender<NoOpSender>),
}

impl DaemonSender {
    pub fn from_config(section: &SenderSection) -> Result<Self> {
        let Some(endpoint) = &section.endpoint else {
            tracing::warn!("no sender endpoint configured, messages will not leave the process");
            return Ok(Self::NoOp(TracedSender::new(NoOpSender::new())));
        };
        let mut config =
            HttpSenderConfig::new(endpoint.clone()).with_request_timeout(section.request_timeout);
        if let Some(url) = &section.health_url {
            config = config.with_health_url(url.clone());
        }
        Ok(Self::Http(TracedSender::new(HttpSender::new(config)?)))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Http(_) => "http",
            Self::NoOp(_) => "noop",
        }
    }
}

#[async_trait]
impl MessageSender for DaemonSender {
    async fn send(
        &self,
        recipient: &SubjectId,
        message_type: &str,
        content: &serde_json::Value,
    ) -> Result<SendReceipt> {
        match self {
            Self::Http(sender) => sender.send(recipient, message_type, content).await,
            Self::NoOp(sender) => sender.send(recipient, message_type, content).await,
        }
    }

    async fn ping(&self) -> Result<()> {
        match self {
            Self::Http(sender) => sender.ping().await,
            Self::NoOp(sender) => sender.ping().await,
        }
    }
}
