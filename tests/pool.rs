use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use turnloom::runtime::RunPool;

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn concurrency_never_exceeds_the_configured_maximum() {
    let pool = RunPool::new(3);
    let active = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));

    let mut handles = Vec::new();
    for _ in 0..12 {
        let active = Arc::clone(&active);
        let peak = Arc::clone(&peak);
        handles.push(pool.spawn(async move {
            let now = active.fetch_add(1, Ordering::SeqCst) + 1;
            peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            active.fetch_sub(1, Ordering::SeqCst);
        }));
    }
    for handle in handles {
        handle.await.expect("pooled task");
    }

    assert!(
        peak.load(Ordering::SeqCst) <= 3,
        "peak concurrency {} exceeded the pool limit",
        peak.load(Ordering::SeqCst)
    );
}

#[tokio::test]
async fn execute_holds_a_slot_for_the_whole_future() {
    let pool = RunPool::new(1);
    assert_eq!(pool.available(), 1);

    let result = pool
        .execute(async {
            assert_eq!(pool.available(), 0);
            21 * 2
        })
        .await;
    assert_eq!(result, 42);
    assert_eq!(pool.available(), 1);
}

#[tokio::test]
async fn zero_parallelism_is_clamped_to_one() {
    let pool = RunPool::new(0);
    assert_eq!(pool.max_parallel(), 1);
    let value = pool.execute(async { "ran" }).await;
    assert_eq!(value, "ran");
}
