use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use lazypool::Pool;

fn main() {
    println!("lazypool - work-stealing pool with sleeping workers\n");

    let workers = 4;
    let pool = Pool::new(workers);
    println!("started {} worker threads\n", workers);

    // Example 1: a single task
    println!("Example 1: single task");
    let counter = pool.run(|| {
        println!("  hello from a worker");
    });
    pool.wait_for_counter(&counter);
    println!("  done\n");

    // Example 2: a batch of parallel tasks
    println!("Example 2: parallel batch");
    let sum = Arc::new(AtomicUsize::new(0));
    let jobs: Vec<Box<dyn FnOnce() + Send>> = (1..=100)
        .map(|i| {
            let sum = Arc::clone(&sum);
            Box::new(move || {
                sum.fetch_add(i, Ordering::Relaxed);
            }) as Box<dyn FnOnce() + Send>
        })
        .collect();

    let start = Instant::now();
    let counter = pool.run_batch(jobs);
    pool.wait_for_counter(&counter);
    println!(
        "  sum of 1..=100 = {} in {:?}\n",
        sum.load(Ordering::Relaxed),
        start.elapsed()
    );

    // Example 3: fork/join from inside a task
    println!("Example 3: fork/join");
    let total = Arc::new(AtomicUsize::new(0));
    let total_clone = Arc::clone(&total);
    let counter = pool.run_with_context(move |cx| {
        let children: Vec<_> = (1..=1000)
            .map(|i| {
                let total = Arc::clone(&total_clone);
                cx.spawn(move || {
                    total.fetch_add(i, Ordering::Relaxed);
                })
            })
            .collect();
        for child in &children {
            cx.wait_for(child);
        }
    });
    pool.wait_for_counter(&counter);
    println!("  sum of 1..=1000 = {}\n", total.load(Ordering::Relaxed));

    let snapshot = pool.metrics();
    println!(
        "metrics: {} tasks, {} submissions, {} steals ({:.0}% hit), {} sleeps, {} wakes, {} handoffs",
        snapshot.tasks_executed,
        snapshot.submissions,
        snapshot.steals_success + snapshot.steals_missed,
        snapshot.steal_hit_rate() * 100.0,
        snapshot.sleeps,
        snapshot.wakes,
        snapshot.handoffs,
    );

    pool.shutdown().expect("workers exited cleanly");
    println!("pool shut down");
}
