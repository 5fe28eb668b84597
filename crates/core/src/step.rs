// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Program steps and trigger evaluation
//!
//! A step becomes due by one of three triggers:
//! - `immediate`: once, when the enrollment starts
//! - `delay`: a fixed offset (`30m`, `2d`) after the enrollment start
//! - `scheduled`: a daily wall-clock time (`HH:MM`), matched to the minute

use crate::enrollment::Enrollment;
use crate::error::{Error, Result};
use crate::id::{ProgramId, StepId};
use chrono::{DateTime, FixedOffset, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// How a step decides it is due
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerType {
    Immediate,
    Delay,
    Scheduled,
}

impl fmt::Display for TriggerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TriggerType::Immediate => write!(f, "immediate"),
            TriggerType::Delay => write!(f, "delay"),
            TriggerType::Scheduled => write!(f, "scheduled"),
        }
    }
}

/// What the recipient is asked when a step requires feedback
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedbackSpec {
    pub prompt: String,
    #[serde(default)]
    pub choices: Vec<String>,
}

/// One ordered unit of a program
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub id: StepId,
    pub program_id: ProgramId,
    /// Dense, 1-based position within the program
    pub order: u32,
    pub trigger_type: TriggerType,
    #[serde(default)]
    pub trigger_value: String,
    pub message_type: String,
    #[serde(default)]
    pub payload: serde_json::Value,
    #[serde(default)]
    pub requires_feedback: bool,
    #[serde(default)]
    pub feedback: Option<FeedbackSpec>,
}

impl Step {
    /// Decide whether this step is due for `enrollment` at `now`.
    ///
    /// `offset` is the zone whose wall clock `scheduled` triggers refer to.
    /// A malformed `scheduled` value is a validation error; a malformed
    /// `delay` value counts as a zero delay, and one too large to add to
    /// the enrollment's start is never due.
    pub fn is_due(
        &self,
        enrollment: &Enrollment,
        now: DateTime<Utc>,
        offset: FixedOffset,
    ) -> Result<bool> {
        match self.trigger_type {
            TriggerType::Immediate => Ok(enrollment.started_at.is_none()
                && enrollment.current_step == self.order),
            TriggerType::Delay => {
                let delay_ms = parse_delay_ms(&self.trigger_value);
                // a delay past the representable calendar never comes due
                let due_at = i64::try_from(delay_ms)
                    .ok()
                    .and_then(chrono::Duration::try_milliseconds)
                    .and_then(|delay| enrollment.delay_base().checked_add_signed(delay));
                Ok(due_at.is_some_and(|due_at| now >= due_at)
                    && enrollment.current_step <= self.order)
            }
            TriggerType::Scheduled => {
                let (hour, minute) = parse_clock_time(&self.trigger_value)?;
                let local = now.with_timezone(&offset);
                Ok(local.hour() == hour
                    && local.minute() == minute
                    && enrollment.current_step <= self.order)
            }
        }
    }

    /// Check the step carries what its delivery needs
    pub fn validate(&self) -> Result<()> {
        if self.order == 0 {
            return Err(Error::validation(format!(
                "step {} has order 0; orders are 1-based",
                self.id
            )));
        }
        if self.requires_feedback && self.feedback.is_none() {
            return Err(Error::validation(format!(
                "step {} requires feedback but has no feedback spec",
                self.id
            ))
            .with_detail("step_id", self.id.as_str()));
        }
        if self.trigger_type == TriggerType::Scheduled {
            parse_clock_time(&self.trigger_value)?;
        }
        Ok(())
    }
}

/// Parse a delay of the form `<int>[smhd]` into milliseconds.
///
/// Anything else parses as 0, so a malformed delay fires as soon as the
/// enrollment starts.
pub fn parse_delay_ms(value: &str) -> u64 {
    let value = value.trim();
    let Some(unit) = value.chars().last() else {
        return 0;
    };
    let factor: u64 = match unit {
        's' => 1_000,
        'm' => 60_000,
        'h' => 3_600_000,
        'd' => 86_400_000,
        _ => return 0,
    };
    let digits = &value[..value.len() - unit.len_utf8()];
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return 0;
    }
    digits
        .parse::<u64>()
        .map(|n| n.saturating_mul(factor))
        .unwrap_or(0)
}

/// Parse `HH:MM` (24-hour) into an hour and minute
pub fn parse_clock_time(value: &str) -> Result<(u32, u32)> {
    let invalid = || Error::validation(format!("invalid scheduled time '{value}', expected HH:MM"));
    let (h, m) = value.trim().split_once(':').ok_or_else(invalid)?;
    let hour: u32 = h.parse().map_err(|_| invalid())?;
    let minute: u32 = m.parse().map_err(|_| invalid())?;
    if hour > 23 || minute > 59 || m.len() != 2 {
        return Err(invalid());
    }
    Ok((hour, minute))
}

/// Parse a UTC offset such as `+09:00`, `-05:30` or `Z`
pub fn parse_utc_offset(value: &str) -> Result<FixedOffset> {
    let value = value.trim();
    if value.eq_ignore_ascii_case("z") || value.eq_ignore_ascii_case("utc") {
        return FixedOffset::east_opt(0).ok_or_else(|| Error::validation("bad offset"));
    }
    let invalid = || Error::validation(format!("invalid utc offset '{value}', expected ±HH:MM"));
    let (sign, rest) = match value.as_bytes().first() {
        Some(b'+') => (1, &value[1..]),
        Some(b'-') => (-1, &value[1..]),
        _ => return Err(invalid()),
    };
    let (hour, minute) = parse_clock_time(rest).map_err(|_| invalid())?;
    let secs = sign * i32::try_from(hour * 3600 + minute * 60).map_err(|_| invalid())?;
    FixedOffset::east_opt(secs).ok_or_else(invalid)
}

#[cfg(test)]
#[path = "step_tests.rs"]
mod tests;
