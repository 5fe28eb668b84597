// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::id::{ProgramId, StepId, SubjectId};
use chrono::TimeZone;
use proptest::prelude::*;
use yare::parameterized;

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 5, 4, 9, 0, 0).unwrap()
}

fn secs(n: u64) -> Duration {
    Duration::from_secs(n)
}

fn make_job(enrollment: &str, step: &str) -> DeliveryJob {
    DeliveryJob {
        subject_id: SubjectId::new("sub-1"),
        program_id: ProgramId::new("prog-1"),
        step_id: StepId::new(step),
        enrollment_id: EnrollmentId::new(enrollment),
        message_type: "text".to_string(),
        content: serde_json::json!({"text": step}),
        requires_feedback: false,
        feedback: None,
        dedup_key: None,
    }
}

fn queue() -> JobQueueState {
    JobQueueState::new(QueueConfig::default())
}

#[parameterized(
    first = { 1, 2 },
    second = { 2, 4 },
    third = { 3, 8 },
    capped = { 10, 300 },
    huge = { 64, 300 },
)]
fn backoff_doubles_up_to_cap(attempt: u32, expected_secs: u64) {
    assert_eq!(QueueConfig::default().backoff(attempt), secs(expected_secs));
}

#[test]
fn enqueue_now_is_waiting_at_top_priority() {
    let mut q = queue();
    let e = q.enqueue_now(make_job("enr-1", "s1"), t0());
    assert!(!e.duplicate);
    let job = q.get(&e.id).unwrap();
    assert_eq!(job.state, JobState::Waiting);
    assert_eq!(job.priority.rank(), 1);
    assert_eq!(q.stats().waiting, 1);
}

#[test]
fn enqueue_after_is_delayed_until_due() {
    let mut q = queue();
    let e = q.enqueue_after(make_job("enr-1", "s1"), secs(60), t0());
    assert_eq!(q.get(&e.id).unwrap().priority, JobPriority::Delayed);
    assert_eq!(q.stats().delayed, 1);

    assert!(q.dequeue(t0() + chrono::Duration::seconds(59)).is_none());
    let job = q.dequeue(t0() + chrono::Duration::seconds(60)).unwrap();
    assert_eq!(job.id, e.id);
    assert_eq!(job.state, JobState::Active);
}

#[test]
fn enqueue_at_in_past_behaves_as_now() {
    let mut q = queue();
    let e = q.enqueue_at(make_job("enr-1", "s1"), t0() - chrono::Duration::seconds(1), t0());
    let job = q.get(&e.id).unwrap();
    assert_eq!(job.priority, JobPriority::Immediate);
    assert_eq!(job.state, JobState::Waiting);
}

#[test]
fn enqueue_at_in_future_is_timed() {
    let mut q = queue();
    let e = q.enqueue_at(make_job("enr-1", "s1"), t0() + chrono::Duration::hours(1), t0());
    let job = q.get(&e.id).unwrap();
    assert_eq!(job.priority, JobPriority::Timed);
    assert_eq!(job.state, JobState::Delayed);
}

#[test]
fn dequeue_prefers_priority_then_age() {
    let mut q = queue();
    let timed = q.enqueue_at(make_job("enr-1", "timed"), t0() + chrono::Duration::seconds(1), t0());
    let later = t0() + chrono::Duration::seconds(5);
    let now_a = q.enqueue_now(make_job("enr-2", "a"), later);
    let now_b = q.enqueue_now(make_job("enr-3", "b"), later);

    assert_eq!(q.dequeue(later).unwrap().id, now_a.id);
    assert_eq!(q.dequeue(later).unwrap().id, now_b.id);
    assert_eq!(q.dequeue(later).unwrap().id, timed.id);
    assert!(q.dequeue(later).is_none());
}

#[test]
fn duplicate_dedup_key_returns_existing_job() {
    let mut q = queue();
    let first = q.enqueue_now(make_job("enr-1", "s1").with_dedup_key("enr-1:s1"), t0());
    let second = q.enqueue_now(make_job("enr-1", "s1").with_dedup_key("enr-1:s1"), t0());
    assert!(second.duplicate);
    assert_eq!(first.id, second.id);
    assert_eq!(q.stats().waiting, 1);
}

#[test]
fn dedup_key_survives_completion() {
    let mut q = queue();
    q.enqueue_now(make_job("enr-1", "s1").with_dedup_key("enr-1:s1"), t0());
    let job = q.dequeue(t0()).unwrap();
    q.ack_success(&job.id, t0()).unwrap();

    let again = q.enqueue_now(make_job("enr-1", "s1").with_dedup_key("enr-1:s1"), t0());
    assert!(again.duplicate);
    assert_eq!(q.stats().waiting, 0);
    assert_eq!(q.stats().completed, 1);
}

#[test]
fn ack_success_records_completion() {
    let mut q = queue();
    q.enqueue_now(make_job("enr-1", "s1"), t0());
    let job = q.dequeue(t0()).unwrap();
    assert_eq!(job.attempts_made, 1);
    q.ack_success(&job.id, t0()).unwrap();

    let stats = q.stats();
    assert_eq!(stats.active, 0);
    assert_eq!(stats.completed, 1);
    assert_eq!(q.get(&job.id).unwrap().state, JobState::Completed);
}

#[test]
fn ack_unknown_job_is_not_found() {
    let mut q = queue();
    let err = q.ack_success(&JobId::new("job-99"), t0()).unwrap_err();
    assert_eq!(err.kind, crate::error::ErrorKind::NotFound);
}

#[test]
fn ack_of_waiting_job_is_conflict() {
    let mut q = queue();
    let e = q.enqueue_now(make_job("enr-1", "s1"), t0());
    let err = q.ack_success(&e.id, t0()).unwrap_err();
    assert_eq!(err.kind, crate::error::ErrorKind::Conflict);
}

#[test]
fn retryable_failure_backs_off_then_fails_after_max_attempts() {
    let mut q = queue();
    q.enqueue_now(make_job("enr-1", "s1"), t0());
    let mut now = t0();

    let job = q.dequeue(now).unwrap();
    let outcome = q.ack_failure(&job.id, "503", true, now).unwrap();
    assert_eq!(
        outcome,
        FailureOutcome::Retrying {
            attempt: 1,
            retry_at: now + chrono::Duration::seconds(2)
        }
    );
    assert!(q.dequeue(now + chrono::Duration::seconds(1)).is_none());

    now += chrono::Duration::seconds(2);
    let job = q.dequeue(now).unwrap();
    let outcome = q.ack_failure(&job.id, "503", true, now).unwrap();
    assert_eq!(
        outcome,
        FailureOutcome::Retrying {
            attempt: 2,
            retry_at: now + chrono::Duration::seconds(4)
        }
    );

    now += chrono::Duration::seconds(4);
    let job = q.dequeue(now).unwrap();
    assert_eq!(job.attempts_made, 3);
    let outcome = q.ack_failure(&job.id, "503", true, now).unwrap();
    assert_eq!(outcome, FailureOutcome::Failed { attempts: 3 });

    let failed = q.list_failed();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].last_error.as_deref(), Some("503"));
    assert!(q.dequeue(now + chrono::Duration::hours(1)).is_none());
}

#[test]
fn non_retryable_failure_fails_immediately() {
    let mut q = queue();
    q.enqueue_now(make_job("enr-1", "s1"), t0());
    let job = q.dequeue(t0()).unwrap();
    let outcome = q.ack_failure(&job.id, "400", false, t0()).unwrap();
    assert_eq!(outcome, FailureOutcome::Failed { attempts: 1 });
    assert_eq!(q.stats().failed, 1);
}

#[test]
fn retry_failed_requeues_with_fresh_budget() {
    let mut q = queue();
    q.enqueue_now(make_job("enr-1", "s1"), t0());
    let job = q.dequeue(t0()).unwrap();
    q.ack_failure(&job.id, "400", false, t0()).unwrap();

    let retried = q.retry_failed(t0());
    assert_eq!(retried, vec![job.id.clone()]);
    let again = q.dequeue(t0()).unwrap();
    assert_eq!(again.id, job.id);
    assert_eq!(again.attempts_made, 1);
}

#[test]
fn cancel_by_enrollment_removes_only_pending_jobs_of_that_enrollment() {
    let mut q = queue();
    let active = q.enqueue_now(make_job("enr-1", "s0"), t0());
    let claimed = q.dequeue(t0()).unwrap();
    assert_eq!(claimed.id, active.id);

    let waiting = q.enqueue_now(make_job("enr-1", "s1"), t0());
    let delayed = q.enqueue_after(make_job("enr-1", "s2"), secs(600), t0());
    let other = q.enqueue_now(make_job("enr-2", "s1"), t0());

    let mut cancelled = q.cancel_by_enrollment(&EnrollmentId::new("enr-1"));
    cancelled.sort();
    let mut expected = vec![waiting.id, delayed.id];
    expected.sort();
    assert_eq!(cancelled, expected);

    assert!(q.get(&other.id).is_some());
    assert_eq!(q.get(&active.id).unwrap().state, JobState::Active);
    let stats = q.stats();
    assert_eq!((stats.waiting, stats.delayed, stats.active), (1, 0, 1));
}

#[test]
fn cancel_forgets_dedup_keys() {
    let mut q = queue();
    q.enqueue_now(make_job("enr-1", "s1").with_dedup_key("enr-1:s1"), t0());
    q.cancel_by_enrollment(&EnrollmentId::new("enr-1"));
    assert!(!q.has_dedup_key("enr-1:s1"));
    let again = q.enqueue_now(make_job("enr-1", "s1").with_dedup_key("enr-1:s1"), t0());
    assert!(!again.duplicate);
}

#[test]
fn forget_dedup_keys_is_scoped_to_enrollment() {
    let mut q = queue();
    q.enqueue_now(make_job("enr-1", "s1").with_dedup_key("enr-1:s1"), t0());
    q.enqueue_now(make_job("enr-2", "s1").with_dedup_key("enr-2:s1"), t0());
    assert_eq!(q.forget_dedup_keys(&EnrollmentId::new("enr-1")), 1);
    assert!(!q.has_dedup_key("enr-1:s1"));
    assert!(q.has_dedup_key("enr-2:s1"));
    assert_eq!(q.dedup_enrollments(), vec![EnrollmentId::new("enr-2")]);
}

#[test]
fn stalled_job_is_reclaimed() {
    let mut q = JobQueueState::new(QueueConfig::default().with_stall_timeout(secs(60)));
    q.enqueue_now(make_job("enr-1", "s1"), t0());
    let job = q.dequeue(t0()).unwrap();

    assert!(q.reclaim_stalled(t0() + chrono::Duration::seconds(59)).is_empty());
    let reclaimed = q.reclaim_stalled(t0() + chrono::Duration::seconds(60));
    assert_eq!(reclaimed.len(), 1);
    assert_eq!(reclaimed[0].0, job.id);
    assert_eq!(q.get(&job.id).unwrap().state, JobState::Waiting);
}

#[test]
fn stalled_job_out_of_attempts_fails() {
    let mut q = JobQueueState::new(
        QueueConfig::default()
            .with_max_attempts(1)
            .with_stall_timeout(secs(60)),
    );
    q.enqueue_now(make_job("enr-1", "s1"), t0());
    let job = q.dequeue(t0()).unwrap();
    let reclaimed = q.reclaim_stalled(t0() + chrono::Duration::minutes(5));
    assert_eq!(reclaimed, vec![(job.id, FailureOutcome::Failed { attempts: 1 })]);
    assert_eq!(q.stats().failed, 1);
}

#[test]
fn recurring_schedule_materialises_jobs_until_cancelled() {
    let mut q = queue();
    let template = make_job("enr-1", "daily").with_dedup_key("enr-1:daily");
    let schedule = q.enqueue_recurring(template.clone(), "0 10 * * *", t0()).unwrap();
    assert_eq!(q.enqueue_recurring(template, "0 10 * * *", t0()).unwrap(), schedule);

    assert!(q.dequeue(t0()).is_none());
    let ten = Utc.with_ymd_and_hms(2026, 5, 4, 10, 0, 0).unwrap();
    let job = q.dequeue(ten).unwrap();
    assert_eq!(job.priority, JobPriority::Recurring);
    assert_eq!(job.schedule_id.as_ref(), Some(&schedule));
    q.ack_success(&job.id, ten).unwrap();

    let next_day = ten + chrono::Duration::days(1);
    assert!(q.dequeue(next_day).is_some());

    q.cancel_by_enrollment(&EnrollmentId::new("enr-1"));
    assert_eq!(q.schedules().count(), 0);
    assert!(q.dequeue(next_day + chrono::Duration::days(1)).is_none());
}

#[test]
fn recurring_rejects_bad_cron() {
    let mut q = queue();
    assert!(q.enqueue_recurring(make_job("enr-1", "s"), "every day", t0()).is_err());
}

#[test]
fn completed_ring_is_pruned_to_retention() {
    let mut q = JobQueueState::new(QueueConfig::default().with_completed_retention(2));
    for i in 0..4 {
        q.enqueue_now(make_job("enr-1", &format!("s{i}")), t0());
        let job = q.dequeue(t0()).unwrap();
        q.ack_success(&job.id, t0()).unwrap();
    }
    assert_eq!(q.list_completed().len(), 2);
    assert_eq!(q.stats().completed, 4);
}

#[test]
fn snapshot_round_trip_requeues_active_jobs() {
    let mut q = queue();
    q.enqueue_now(make_job("enr-1", "s1").with_dedup_key("enr-1:s1"), t0());
    q.enqueue_after(make_job("enr-1", "s2"), secs(30), t0());
    q.dequeue(t0()).unwrap();

    let json = serde_json::to_string(&q).unwrap();
    let mut restored: JobQueueState = serde_json::from_str(&json).unwrap();
    restored = restored.with_config(QueueConfig::default());
    assert_eq!(restored.requeue_active(), 1);

    let stats = restored.stats();
    assert_eq!((stats.waiting, stats.delayed, stats.active), (1, 1, 0));
    assert!(restored.has_dedup_key("enr-1:s1"));
    let job = restored.dequeue(t0()).unwrap();
    assert_eq!(job.attempts_made, 1);
}

#[test]
fn next_wake_reports_earliest_delayed_job() {
    let mut q = queue();
    assert!(q.next_wake().is_none());
    q.enqueue_after(make_job("enr-1", "s1"), secs(90), t0());
    q.enqueue_after(make_job("enr-1", "s2"), secs(30), t0());
    assert_eq!(q.next_wake(), Some(t0() + chrono::Duration::seconds(30)));
}

#[test]
fn has_open_job_tracks_live_jobs_only() {
    let mut q = queue().with_config(QueueConfig::default().with_max_attempts(1));
    let enr = EnrollmentId::new("enr-1");
    let step = StepId::new("s1");
    assert!(!q.has_open_job(&enr, &step));

    q.enqueue_now(make_job("enr-1", "s1"), t0());
    assert!(q.has_open_job(&enr, &step));
    assert!(!q.has_open_job(&enr, &StepId::new("s2")));

    let job = q.dequeue(t0()).unwrap();
    assert!(q.has_open_job(&enr, &step));

    q.ack_failure(&job.id, "boom", true, t0()).unwrap();
    assert!(!q.has_open_job(&enr, &step));
}

proptest! {
    #[test]
    fn stats_account_for_every_enqueued_job(ops in proptest::collection::vec(0u8..4, 1..40)) {
        let mut q = queue();
        let mut now = t0();
        let mut enqueued = 0usize;
        for (i, op) in ops.iter().enumerate() {
            now += chrono::Duration::seconds(1);
            match op {
                0 => { q.enqueue_now(make_job("enr-1", &format!("s{i}")), now); enqueued += 1; }
                1 => { q.enqueue_after(make_job("enr-2", &format!("s{i}")), secs(5), now); enqueued += 1; }
                2 => {
                    if let Some(job) = q.dequeue(now) {
                        q.ack_success(&job.id, now).unwrap();
                    }
                }
                _ => {
                    if let Some(job) = q.dequeue(now) {
                        q.ack_failure(&job.id, "boom", true, now).unwrap();
                    }
                }
            }
        }
        let s = q.stats();
        prop_assert_eq!(s.waiting + s.delayed + s.active + s.failed + s.completed as usize, enqueued);
        prop_assert_eq!(s.active, 0);
    }
}
