use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use lazypool::{Counter, Pool, Submission, Task};

#[test]
fn saturation_churn_completes_every_task() {
    let pool = Pool::new(4);
    let executed = Arc::new(AtomicUsize::new(0));

    const TASKS: usize = 100_000;
    let counter = Counter::new(TASKS);
    for _ in 0..TASKS {
        let executed = Arc::clone(&executed);
        pool.schedule(Submission::from(Task::with_counter(
            move || {
                executed.fetch_add(1, Ordering::Relaxed);
            },
            counter.clone(),
        )));
    }

    pool.wait_for_counter(&counter);
    assert_eq!(executed.load(Ordering::Relaxed), TASKS);

    // The pool settles back to all-asleep after the storm.
    let deadline = Instant::now() + Duration::from_secs(10);
    while pool.counts() != (0, 0) {
        assert!(Instant::now() < deadline, "pool never quiesced");
        std::thread::sleep(Duration::from_millis(1));
    }

    pool.shutdown().expect("shutdown should succeed");
}

#[test]
fn sleep_wake_oscillation_runs_each_task_once() {
    let pool = Pool::new(8);
    let executed = Arc::new(AtomicUsize::new(0));

    const ROUNDS: usize = 40;
    for round in 0..ROUNDS {
        let executed = Arc::clone(&executed);
        let counter = pool.run(move || {
            executed.fetch_add(1, Ordering::SeqCst);
        });

        // Bounded wake latency: the task must run long before the deadline.
        let deadline = Instant::now() + Duration::from_secs(5);
        while !counter.is_complete() {
            assert!(
                Instant::now() < deadline,
                "task of round {round} was never picked up"
            );
            std::thread::yield_now();
        }

        // Let the pool drift back to sleep between submissions.
        std::thread::sleep(Duration::from_millis(5));
    }

    assert_eq!(executed.load(Ordering::SeqCst), ROUNDS);

    let snapshot = pool.metrics();
    assert!(
        snapshot.sleeps > 0,
        "workers should actually sleep between rounds"
    );
    assert!(
        snapshot.wakes > 0,
        "sleeping workers should be woken by submissions"
    );
    pool.shutdown().expect("shutdown should succeed");
}

#[test]
fn batch_churn_exercises_stealing() {
    let pool = Pool::new(4);
    let executed = Arc::new(AtomicUsize::new(0));

    // A single submission fanning out through one worker's inbox forces the
    // other workers to steal their share.
    const TASKS: usize = 10_000;
    let executed_clone = Arc::clone(&executed);
    let root = pool.run_with_context(move |cx| {
        let children: Vec<Counter> = (0..TASKS)
            .map(|_| {
                let executed = Arc::clone(&executed_clone);
                cx.spawn(move || {
                    executed.fetch_add(1, Ordering::Relaxed);
                    // Enough work per task that the batch outlives the
                    // initial wakeup broadcast.
                    std::hint::black_box((0..64).sum::<u64>());
                })
            })
            .collect();
        for child in &children {
            cx.wait_for(child);
        }
    });

    pool.wait_for_counter(&root);
    assert_eq!(executed.load(Ordering::Relaxed), TASKS);

    let snapshot = pool.metrics();
    assert!(snapshot.handoffs > 0, "the last thief should hand off");
    pool.shutdown().expect("shutdown should succeed");
}
