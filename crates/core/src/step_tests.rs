// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::enrollment::Enrollment;
use chrono::TimeZone;
use yare::parameterized;

fn utc() -> FixedOffset {
    FixedOffset::east_opt(0).unwrap()
}

fn assigned_at() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 1, 5, 9, 0, 0).unwrap()
}

fn make_step(order: u32, trigger_type: TriggerType, value: &str) -> Step {
    Step {
        id: StepId::new(format!("step-{order}")),
        program_id: ProgramId::new("prog-1"),
        order,
        trigger_type,
        trigger_value: value.to_string(),
        message_type: "text".to_string(),
        payload: serde_json::json!({"text": "hello"}),
        requires_feedback: false,
        feedback: None,
    }
}

fn make_enrollment() -> Enrollment {
    Enrollment::new("enr-1", "sub-1", "prog-1", 3, assigned_at()).activate()
}

#[parameterized(
    one_hour = { "1h", 3_600_000 },
    thirty_minutes = { "30m", 1_800_000 },
    two_days = { "2d", 172_800_000 },
    ten_seconds = { "10s", 10_000 },
    invalid = { "invalid", 0 },
    empty = { "", 0 },
    missing_number = { "h", 0 },
    unknown_unit = { "5w", 0 },
    negative = { "-5m", 0 },
    fractional = { "1.5h", 0 },
)]
fn delay_parsing(value: &str, expected_ms: u64) {
    assert_eq!(parse_delay_ms(value), expected_ms);
}

#[parameterized(
    morning = { "08:30", (8, 30) },
    midnight = { "00:00", (0, 0) },
    single_digit_hour = { "7:05", (7, 5) },
    last_minute = { "23:59", (23, 59) },
)]
fn clock_time_parsing(value: &str, expected: (u32, u32)) {
    assert_eq!(parse_clock_time(value).unwrap(), expected);
}

#[parameterized(
    hour_out_of_range = { "24:00" },
    minute_out_of_range = { "12:60" },
    no_colon = { "1200" },
    short_minute = { "12:5" },
    words = { "noon" },
)]
fn clock_time_rejects(value: &str) {
    let err = parse_clock_time(value).unwrap_err();
    assert_eq!(err.kind, crate::error::ErrorKind::Validation);
}

#[test]
fn immediate_is_due_only_before_start_at_its_position() {
    let step = make_step(1, TriggerType::Immediate, "");
    let mut enrollment = make_enrollment();
    assert!(step.is_due(&enrollment, assigned_at(), utc()).unwrap());

    enrollment.mark_started(assigned_at());
    assert!(!step.is_due(&enrollment, assigned_at(), utc()).unwrap());
}

#[test]
fn immediate_is_not_due_at_other_positions() {
    let step = make_step(2, TriggerType::Immediate, "");
    let enrollment = make_enrollment();
    assert!(!step.is_due(&enrollment, assigned_at(), utc()).unwrap());
}

#[test]
fn delay_counts_from_assignment_until_started() {
    let step = make_step(2, TriggerType::Delay, "1h");
    let enrollment = make_enrollment();

    let early = assigned_at() + chrono::Duration::minutes(59);
    let on_time = assigned_at() + chrono::Duration::hours(1);
    assert!(!step.is_due(&enrollment, early, utc()).unwrap());
    assert!(step.is_due(&enrollment, on_time, utc()).unwrap());
}

#[test]
fn delay_counts_from_start_when_started() {
    let step = make_step(2, TriggerType::Delay, "1h");
    let mut enrollment = make_enrollment();
    enrollment.mark_started(assigned_at() + chrono::Duration::hours(3));

    let an_hour_after_assignment = assigned_at() + chrono::Duration::hours(1);
    assert!(!step.is_due(&enrollment, an_hour_after_assignment, utc()).unwrap());
    let an_hour_after_start = assigned_at() + chrono::Duration::hours(4);
    assert!(step.is_due(&enrollment, an_hour_after_start, utc()).unwrap());
}

#[test]
fn delay_is_not_due_once_enrollment_passed_the_step() {
    let step = make_step(2, TriggerType::Delay, "1h");
    let mut enrollment = make_enrollment();
    enrollment.advance_to(3);
    let later = assigned_at() + chrono::Duration::hours(5);
    assert!(!step.is_due(&enrollment, later, utc()).unwrap());
}

#[test]
fn unparseable_delay_is_due_immediately() {
    let step = make_step(2, TriggerType::Delay, "soon");
    let enrollment = make_enrollment();
    assert!(step.is_due(&enrollment, assigned_at(), utc()).unwrap());
}

#[parameterized(
    past_calendar_range = { "1000000000d" },
    saturated_millis = { "18446744073709551615s" },
)]
fn delay_beyond_calendar_is_never_due(value: &str) {
    let step = make_step(2, TriggerType::Delay, value);
    let enrollment = make_enrollment();
    let far_future = Utc.with_ymd_and_hms(9999, 12, 31, 23, 59, 0).unwrap();

    assert!(!step.is_due(&enrollment, assigned_at(), utc()).unwrap());
    assert!(!step.is_due(&enrollment, far_future, utc()).unwrap());
}

#[parameterized(
    exact_minute = { 8, 30, 0, true },
    exact_minute_late_second = { 8, 30, 59, true },
    one_minute_late = { 8, 31, 0, false },
    one_minute_early = { 8, 29, 59, false },
    wrong_hour = { 9, 30, 0, false },
)]
fn scheduled_matches_exact_hour_and_minute(hour: u32, minute: u32, second: u32, due: bool) {
    let step = make_step(2, TriggerType::Scheduled, "08:30");
    let enrollment = make_enrollment();
    let now = Utc.with_ymd_and_hms(2026, 1, 6, hour, minute, second).unwrap();
    assert_eq!(step.is_due(&enrollment, now, utc()).unwrap(), due);
}

#[test]
fn scheduled_uses_local_offset() {
    let step = make_step(2, TriggerType::Scheduled, "09:00");
    let enrollment = make_enrollment();
    let tokyo = parse_utc_offset("+09:00").unwrap();
    let midnight_utc = Utc.with_ymd_and_hms(2026, 1, 6, 0, 0, 0).unwrap();
    assert!(step.is_due(&enrollment, midnight_utc, tokyo).unwrap());
    assert!(!step.is_due(&enrollment, midnight_utc, utc()).unwrap());
}

#[test]
fn malformed_scheduled_value_is_validation_error() {
    let step = make_step(2, TriggerType::Scheduled, "25:00");
    let enrollment = make_enrollment();
    assert!(step.is_due(&enrollment, assigned_at(), utc()).is_err());
    assert!(step.validate().is_err());
}

#[test]
fn feedback_step_without_spec_fails_validation() {
    let mut step = make_step(1, TriggerType::Immediate, "");
    step.requires_feedback = true;
    assert!(step.validate().is_err());

    step.feedback = Some(FeedbackSpec {
        prompt: "Did you take it?".to_string(),
        choices: vec!["yes".to_string(), "no".to_string()],
    });
    assert!(step.validate().is_ok());
}

#[parameterized(
    plus_nine = { "+09:00", 9 * 3600 },
    minus_five_thirty = { "-05:30", -(5 * 3600 + 30 * 60) },
    zulu = { "Z", 0 },
)]
fn utc_offset_parsing(value: &str, secs: i32) {
    assert_eq!(parse_utc_offset(value).unwrap().local_minus_utc(), secs);
}
