// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use cadence_core::{
    DeliveryJob, EnrollmentId, JobQueueState, ProgramId, QueueConfig, StepId, SubjectId,
};
use chrono::{TimeZone, Utc};

fn job(step: &str) -> DeliveryJob {
    DeliveryJob {
        subject_id: SubjectId::new("sub-1"),
        program_id: ProgramId::new("prog-1"),
        step_id: StepId::new(step),
        enrollment_id: EnrollmentId::new("enr-1"),
        message_type: "text".to_string(),
        content: serde_json::json!({"text": step}),
        requires_feedback: false,
        feedback: None,
        dedup_key: Some(format!("enr-1:{step}")),
    }
}

#[test]
fn load_of_missing_snapshot_is_none() {
    let dir = tempfile::tempdir().unwrap();
    let store = SnapshotStore::open(dir.path()).unwrap();

    let loaded: Option<JobQueueState> = store.load("queue").unwrap();
    assert!(loaded.is_none());
    assert!(!store.exists("queue"));
}

#[test]
fn queue_state_survives_save_and_load() {
    let dir = tempfile::tempdir().unwrap();
    let store = SnapshotStore::open(dir.path().join("nested")).unwrap();
    let now = Utc.with_ymd_and_hms(2026, 5, 4, 9, 0, 0).unwrap();
    let mut queue = JobQueueState::new(QueueConfig::default());
    queue.enqueue_now(job("s1"), now);
    queue.enqueue_after(job("s2"), std::time::Duration::from_secs(60), now);

    store.save("queue", &queue).unwrap();
    let loaded: JobQueueState = store.load("queue").unwrap().unwrap();

    assert_eq!(loaded, queue);
    assert!(loaded.has_dedup_key("enr-1:s1"));
    assert!(!dir.path().join("nested/queue.json.tmp").exists());
}

#[test]
fn save_replaces_previous_snapshot() {
    let dir = tempfile::tempdir().unwrap();
    let store = SnapshotStore::open(dir.path()).unwrap();

    store.save("counter", &1u32).unwrap();
    store.save("counter", &2u32).unwrap();

    assert_eq!(store.load::<u32>("counter").unwrap(), Some(2));
}

#[test]
fn corrupt_snapshot_is_a_json_error() {
    let dir = tempfile::tempdir().unwrap();
    let store = SnapshotStore::open(dir.path()).unwrap();
    std::fs::write(dir.path().join("queue.json"), "{ truncated").unwrap();

    let err = store.load::<JobQueueState>("queue").unwrap_err();
    assert!(matches!(err, SnapshotError::Json { ref name, .. } if name == "queue"));
}

#[test]
fn delete_removes_snapshot() {
    let dir = tempfile::tempdir().unwrap();
    let store = SnapshotStore::open(dir.path()).unwrap();
    store.save("queue", &0u8).unwrap();

    store.delete("queue").unwrap();
    store.delete("queue").unwrap();

    assert!(!store.exists("queue"));
}
