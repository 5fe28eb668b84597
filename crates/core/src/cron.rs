// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Five-field cron expressions for recurring queue schedules
//!
//! Format: `MIN HOUR DOM MON DOW`, evaluated against UTC. Each field accepts
//! `*`, `*/N`, `N`, `a-b`, `a-b/N` and comma lists of those. Day of week runs
//! 0-6 from Sunday; 7 is also Sunday. When both day fields are restricted a
//! day matches if either does.

use crate::error::{Error, Result};
use chrono::{DateTime, Datelike, Duration, DurationRound, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Search horizon for the next fire; covers leap-day schedules
const MAX_LOOKAHEAD_DAYS: i64 = 366 * 5;

#[derive(Debug, Clone, PartialEq, Eq)]
struct Field {
    /// Bit `n` set when value `n` matches
    bits: u64,
    restricted: bool,
}

impl Field {
    fn parse(spec: &str, min: u32, max: u32, name: &str) -> Result<Self> {
        let invalid = || Error::validation(format!("invalid cron {name} field '{spec}'"));
        let mut bits = 0u64;
        for part in spec.split(',') {
            let (range, step) = match part.split_once('/') {
                Some((range, step)) => {
                    let step: u32 = step.parse().map_err(|_| invalid())?;
                    if step == 0 {
                        return Err(invalid());
                    }
                    (range, step)
                }
                None => (part, 1),
            };
            let (lo, hi) = if range == "*" {
                (min, max)
            } else if let Some((a, b)) = range.split_once('-') {
                let a: u32 = a.parse().map_err(|_| invalid())?;
                let b: u32 = b.parse().map_err(|_| invalid())?;
                (a, b)
            } else {
                let n: u32 = range.parse().map_err(|_| invalid())?;
                // `5/15` means from 5 to the end in steps of 15
                if step > 1 {
                    (n, max)
                } else {
                    (n, n)
                }
            };
            if lo < min || hi > max || lo > hi {
                return Err(invalid());
            }
            let mut v = lo;
            while v <= hi {
                bits |= 1 << v;
                v += step;
            }
        }
        Ok(Self {
            bits,
            restricted: spec != "*",
        })
    }

    fn matches(&self, value: u32) -> bool {
        self.bits & (1 << value) != 0
    }
}

/// A parsed cron expression
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CronExpr {
    source: String,
    minute: Field,
    hour: Field,
    day_of_month: Field,
    month: Field,
    day_of_week: Field,
}

impl CronExpr {
    pub fn parse(expression: &str) -> Result<Self> {
        let parts: Vec<&str> = expression.split_whitespace().collect();
        let [minute, hour, dom, month, dow] = parts.as_slice() else {
            return Err(Error::validation(format!(
                "invalid cron expression '{expression}': need 5 fields (MIN HOUR DOM MON DOW)"
            )));
        };
        let mut day_of_week = Field::parse(dow, 0, 7, "day-of-week")?;
        if day_of_week.matches(7) {
            day_of_week.bits |= 1;
        }
        Ok(Self {
            source: parts.join(" "),
            minute: Field::parse(minute, 0, 59, "minute")?,
            hour: Field::parse(hour, 0, 23, "hour")?,
            day_of_month: Field::parse(dom, 1, 31, "day-of-month")?,
            month: Field::parse(month, 1, 12, "month")?,
            day_of_week,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    fn day_matches(&self, at: &DateTime<Utc>) -> bool {
        let dom = self.day_of_month.matches(at.day());
        let dow = self.day_of_week.matches(at.weekday().num_days_from_sunday());
        match (self.day_of_month.restricted, self.day_of_week.restricted) {
            (true, true) => dom || dow,
            (true, false) => dom,
            (false, true) => dow,
            (false, false) => true,
        }
    }

    /// Whether `at` (truncated to the minute) is a fire time
    pub fn matches(&self, at: DateTime<Utc>) -> bool {
        self.month.matches(at.month())
            && self.day_matches(&at)
            && self.hour.matches(at.hour())
            && self.minute.matches(at.minute())
    }

    /// First fire time strictly after `after`
    pub fn next_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let start = after.duration_trunc(Duration::minutes(1)).ok()? + Duration::minutes(1);
        let horizon = start + Duration::days(MAX_LOOKAHEAD_DAYS);
        let mut candidate = start;
        while candidate < horizon {
            if !self.month.matches(candidate.month()) || !self.day_matches(&candidate) {
                candidate = start_of_next_day(candidate)?;
                continue;
            }
            if !self.hour.matches(candidate.hour()) {
                candidate = candidate.duration_trunc(Duration::hours(1)).ok()? + Duration::hours(1);
                continue;
            }
            if self.minute.matches(candidate.minute()) {
                return Some(candidate);
            }
            candidate += Duration::minutes(1);
        }
        None
    }
}

fn start_of_next_day(at: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let next = at.date_naive().succ_opt()?;
    Some(next.and_hms_opt(0, 0, 0)?.and_utc())
}

impl FromStr for CronExpr {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for CronExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

impl Serialize for CronExpr {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.source)
    }
}

impl<'de> Deserialize<'de> for CronExpr {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
#[path = "cron_tests.rs"]
mod tests;
