// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use std::sync::atomic::AtomicUsize;

fn counting_task(counter: Arc<AtomicUsize>) -> PeriodicTask {
    periodic(move || {
        let counter = counter.clone();
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
        }
    })
}

#[tokio::test(start_paused = true)]
async fn tokio_scheduler_runs_every_interval() {
    let counter = Arc::new(AtomicUsize::new(0));
    let handle = TokioScheduler.schedule("tick", Duration::from_secs(60), counting_task(counter.clone()));

    tokio::time::sleep(Duration::from_secs(59)).await;
    assert_eq!(counter.load(Ordering::SeqCst), 0);

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(counter.load(Ordering::SeqCst), 1);

    tokio::time::sleep(Duration::from_secs(120)).await;
    assert_eq!(counter.load(Ordering::SeqCst), 3);

    handle.cancel();
    tokio::time::sleep(Duration::from_secs(600)).await;
    assert_eq!(counter.load(Ordering::SeqCst), 3);
    assert!(handle.is_cancelled());
}

#[tokio::test(start_paused = true)]
async fn tokio_scheduler_survives_a_panicking_run() {
    let counter = Arc::new(AtomicUsize::new(0));
    let runs = counter.clone();
    let task = periodic(move || {
        let runs = runs.clone();
        async move {
            if runs.fetch_add(1, Ordering::SeqCst) == 0 {
                panic!("first run fails");
            }
        }
    });
    let handle = TokioScheduler.schedule("flaky", Duration::from_secs(60), task);

    tokio::time::sleep(Duration::from_secs(61)).await;
    assert_eq!(counter.load(Ordering::SeqCst), 1);

    tokio::time::sleep(Duration::from_secs(120)).await;
    assert_eq!(counter.load(Ordering::SeqCst), 3);
    handle.cancel();
}

#[tokio::test]
async fn fake_scheduler_fires_by_name() {
    let scheduler = FakeScheduler::new();
    let ticks = Arc::new(AtomicUsize::new(0));
    let sweeps = Arc::new(AtomicUsize::new(0));
    scheduler.schedule("tick", Duration::from_secs(60), counting_task(ticks.clone()));
    scheduler.schedule("sweep", Duration::from_secs(900), counting_task(sweeps.clone()));

    assert_eq!(scheduler.fire("tick").await, 1);
    assert_eq!(scheduler.fire("tick").await, 1);
    assert_eq!(ticks.load(Ordering::SeqCst), 2);
    assert_eq!(sweeps.load(Ordering::SeqCst), 0);
    assert_eq!(scheduler.fire("missing").await, 0);
}

#[tokio::test]
async fn fake_scheduler_skips_cancelled_tasks() {
    let scheduler = FakeScheduler::new();
    let counter = Arc::new(AtomicUsize::new(0));
    let handle = scheduler.schedule("tick", Duration::from_secs(60), counting_task(counter.clone()));
    assert_eq!(scheduler.scheduled(), vec![("tick".to_string(), Duration::from_secs(60))]);

    handle.cancel();
    assert_eq!(scheduler.fire("tick").await, 0);
    assert!(scheduler.scheduled().is_empty());
    assert_eq!(counter.load(Ordering::SeqCst), 0);
}
