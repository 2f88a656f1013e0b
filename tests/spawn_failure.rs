use lazypool::{Pool, PoolError};

#[test]
fn impossible_stack_size_fails_construction() {
    // A stack size no allocator can satisfy makes the worker spawn fail
    // deterministically; the builder must report it instead of panicking.
    let result = Pool::builder()
        .workers(8)
        .worker_stack_size(usize::MAX)
        .build();

    match result {
        Err(PoolError::WorkerSpawn { worker, source }) => {
            assert_eq!(worker, 0);
            // The underlying cause is surfaced, not swallowed.
            let _ = source.kind();
        }
        Ok(_) => panic!("building with an impossible stack size should fail"),
    }
}

#[test]
fn failed_construction_leaves_no_residue() {
    // A failed build must not leak threads or poison process-wide state;
    // building a normal pool right after works.
    let failed = Pool::builder()
        .workers(4)
        .worker_stack_size(usize::MAX)
        .build();
    assert!(failed.is_err());

    let pool = Pool::new(2);
    let counter = pool.run(|| {});
    pool.wait_for_counter(&counter);
    pool.shutdown().expect("shutdown should succeed");
}
