// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP sender for a messaging gateway
//!
//! POSTs `{"recipient", "message_type", "content"}` as JSON and reads the
//! platform message id from a `{"message_id": ...}` response body.

use super::{MessageSender, SendReceipt};
use async_trait::async_trait;
use cadence_core::{Error, ErrorKind, Result, SubjectId};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpSenderConfig {
    pub endpoint: String,
    pub request_timeout: Duration,
    /// Probed with GET by health checks; health checks pass when unset
    pub health_url: Option<String>,
}

impl HttpSenderConfig {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            request_timeout: Duration::from_secs(10),
            health_url: None,
        }
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_health_url(mut self, url: impl Into<String>) -> Self {
        self.health_url = Some(url.into());
        self
    }
}

#[derive(Serialize)]
struct SendRequest<'a> {
    recipient: &'a str,
    message_type: &'a str,
    content: &'a serde_json::Value,
}

#[derive(Deserialize)]
struct SendResponse {
    #[serde(default)]
    message_id: Option<String>,
}

#[derive(Clone, Debug)]
pub struct HttpSender {
    client: reqwest::Client,
    endpoint: Arc<str>,
    health_url: Option<Arc<str>>,
}

impl HttpSender {
    pub fn new(config: HttpSenderConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| Error::new(ErrorKind::Internal, format!("http client: {e}")))?;
        Ok(Self {
            client,
            endpoint: Arc::from(config.endpoint),
            health_url: config.health_url.map(Arc::from),
        })
    }
}

/// Map a transport failure onto an error kind
fn transport_error(e: &reqwest::Error) -> Error {
    let kind = if e.is_timeout() {
        ErrorKind::Timeout
    } else if e.is_connect() {
        ErrorKind::ConnectionReset
    } else if e.is_request() || e.is_body() {
        ErrorKind::TemporarilyUnavailable
    } else {
        ErrorKind::Internal
    };
    Error::new(kind, e.to_string())
}

/// Map a non-success response onto an error with its status
fn status_error(status: u16, body: &str) -> Error {
    let body = body.trim();
    let message = if body.is_empty() {
        format!("gateway answered {status}")
    } else {
        format!("gateway answered {status}: {body}")
    };
    Error::from_status(status, message)
}

#[async_trait]
impl MessageSender for HttpSender {
    async fn send(
        &self,
        recipient: &SubjectId,
        message_type: &str,
        content: &serde_json::Value,
    ) -> Result<SendReceipt> {
        let request = SendRequest {
            recipient: recipient.as_str(),
            message_type,
            content,
        };
        let response = self
            .client
            .post(&*self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| transport_error(&e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(status.as_u16(), &body));
        }

        let bytes = response.bytes().await.map_err(|e| transport_error(&e))?;
        if bytes.is_empty() {
            return Ok(SendReceipt::default());
        }
        // the gateway accepted the message; an unreadable body only costs the id
        match serde_json::from_slice::<SendResponse>(&bytes) {
            Ok(body) => Ok(SendReceipt {
                message_id: body.message_id,
            }),
            Err(e) => {
                tracing::warn!(
                    status = status.as_u16(),
                    error = %e,
                    "accepted response body is not a send receipt"
                );
                Ok(SendReceipt::default())
            }
        }
    }

    async fn ping(&self) -> Result<()> {
        let Some(url) = &self.health_url else {
            return Ok(());
        };
        let response = self
            .client
            .get(&**url)
            .send()
            .await
            .map_err(|e| transport_error(&e))?;
        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(status_error(status.as_u16(), ""))
        }
    }
}

#[cfg(test)]
#[path = "http_tests.rs"]
mod tests;
