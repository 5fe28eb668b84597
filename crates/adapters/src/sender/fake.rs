// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fake sender for testing
#![cfg_attr(coverage_nightly, coverage(off))]

use super::{MessageSender, SendReceipt};
use async_trait::async_trait;
use cadence_core::{Error, Result, SubjectId};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// Recorded send attempt
#[derive(Debug, Clone, PartialEq)]
pub struct SendCall {
    pub recipient: SubjectId,
    pub message_type: String,
    pub content: serde_json::Value,
}

#[derive(Default)]
struct FakeState {
    calls: Vec<SendCall>,
    scripted: VecDeque<Error>,
    always: Option<Error>,
    ping_error: Option<Error>,
    sent: u64,
}

/// Fake sender for testing.
///
/// Succeeds with ids `msg-1`, `msg-2`, ... unless failures are scripted.
/// Every attempt is recorded, failed ones included.
#[derive(Clone, Default)]
pub struct FakeSender {
    state: Arc<Mutex<FakeState>>,
}

impl FakeSender {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Fail the next send with `error`; queued failures are used in order
    pub fn fail_next(&self, error: Error) {
        self.lock().scripted.push_back(error);
    }

    /// Fail every send with `error` until cleared with `None`
    pub fn fail_always(&self, error: Option<Error>) {
        self.lock().always = error;
    }

    pub fn fail_ping(&self, error: Option<Error>) {
        self.lock().ping_error = error;
    }

    /// Get all recorded send attempts
    pub fn calls(&self) -> Vec<SendCall> {
        self.lock().calls.clone()
    }

    /// Number of sends that succeeded
    pub fn sent(&self) -> u64 {
        self.lock().sent
    }
}

#[async_trait]
impl MessageSender for FakeSender {
    async fn send(
        &self,
        recipient: &SubjectId,
        message_type: &str,
        content: &serde_json::Value,
    ) -> Result<SendReceipt> {
        let mut state = self.lock();
        state.calls.push(SendCall {
            recipient: recipient.clone(),
            message_type: message_type.to_string(),
            content: content.clone(),
        });
        if let Some(error) = state.scripted.pop_front() {
            return Err(error);
        }
        if let Some(error) = &state.always {
            return Err(error.clone());
        }
        state.sent += 1;
        Ok(SendReceipt {
            message_id: Some(format!("msg-{}", state.sent)),
        })
    }

    async fn ping(&self) -> Result<()> {
        match &self.lock().ping_error {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
#[path = "fake_tests.rs"]
mod tests;
