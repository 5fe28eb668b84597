// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Tagged error type shared by the delivery pipeline
//!
//! One error type carries a `kind` tag instead of a family of error types;
//! callers match on `kind`, never on the concrete source.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// Classification of a failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Bad input: malformed trigger, missing feedback spec, bad config
    Validation,
    NotFound,
    /// Optimistic update lost a race
    Conflict,
    /// Downstream answered 429
    RateLimited,
    /// Downstream answered 5xx
    Upstream,
    /// Downstream refused the request (4xx other than 429)
    Rejected,
    ConnectionReset,
    Timeout,
    TemporarilyUnavailable,
    /// A circuit breaker refused the call without invoking it
    CircuitOpen,
    /// A dependency is unavailable and no fallback exists
    ServiceUnavailable,
    Storage,
    Internal,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::Validation => "validation",
            ErrorKind::NotFound => "not found",
            ErrorKind::Conflict => "conflict",
            ErrorKind::RateLimited => "rate limited",
            ErrorKind::Upstream => "upstream error",
            ErrorKind::Rejected => "rejected",
            ErrorKind::ConnectionReset => "connection reset",
            ErrorKind::Timeout => "timeout",
            ErrorKind::TemporarilyUnavailable => "temporarily unavailable",
            ErrorKind::CircuitOpen => "circuit open",
            ErrorKind::ServiceUnavailable => "service unavailable",
            ErrorKind::Storage => "storage error",
            ErrorKind::Internal => "internal error",
        };
        f.write_str(s)
    }
}

/// Error carrying a kind tag, a message, an optional HTTP-like status and
/// free-form details
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{kind}: {message}")]
pub struct Error {
    pub kind: ErrorKind,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub details: BTreeMap<String, String>,
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            status: None,
            details: BTreeMap::new(),
        }
    }

    /// Build an error from an HTTP-like status code
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let kind = match status {
            429 => ErrorKind::RateLimited,
            500.. => ErrorKind::Upstream,
            _ => ErrorKind::Rejected,
        };
        Self::new(kind, message).with_status(status)
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message)
    }

    pub fn not_found(what: &str, id: impl fmt::Display) -> Self {
        Self::new(ErrorKind::NotFound, format!("{what} {id}"))
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Conflict, message)
    }

    pub fn storage(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Storage, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Timeout, message)
    }

    pub fn circuit_open(name: &str) -> Self {
        Self::new(ErrorKind::CircuitOpen, format!("circuit '{name}' is open"))
            .with_detail("dependency", name)
    }

    pub fn service_unavailable(name: &str) -> Self {
        Self::new(
            ErrorKind::ServiceUnavailable,
            format!("service '{name}' is unavailable"),
        )
        .with_detail("dependency", name)
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }

    /// Whether a later attempt could succeed.
    ///
    /// True for 429, any status >= 500, connection resets, timeouts, and any
    /// message mentioning "temporarily unavailable". Refusals by our own
    /// resilience layer (open circuit, unavailable dependency) are retryable
    /// at the job level because they clear on their own.
    pub fn is_retryable(&self) -> bool {
        if let Some(status) = self.status {
            if status == 429 || status >= 500 {
                return true;
            }
        }
        match self.kind {
            ErrorKind::RateLimited
            | ErrorKind::Upstream
            | ErrorKind::ConnectionReset
            | ErrorKind::Timeout
            | ErrorKind::TemporarilyUnavailable
            | ErrorKind::CircuitOpen
            | ErrorKind::ServiceUnavailable => true,
            _ => self
                .message
                .to_ascii_lowercase()
                .contains("temporarily unavailable"),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::new(ErrorKind::Internal, e.to_string())
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
