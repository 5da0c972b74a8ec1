//! Bounded worker pool for concurrent scenario runs.
//!
//! Independent runs (e.g. batch variations of one scenario) execute
//! concurrently up to a configured maximum; queued runs are admitted FIFO
//! as slots free. Backed by `tokio::sync::Semaphore`, whose acquire queue
//! is fair.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

/// FIFO admission control for concurrent runs.
///
/// # Examples
///
/// ```rust,no_run
/// # async fn example() {
/// use turnloom::runtime::pool::RunPool;
///
/// let pool = RunPool::new(2);
/// let mut handles = Vec::new();
/// for i in 0..5 {
///     handles.push(pool.spawn(async move { i * 2 }));
/// }
/// for handle in handles {
///     let _ = handle.await;
/// }
/// # }
/// ```
#[derive(Clone)]
pub struct RunPool {
    permits: Arc<Semaphore>,
    max_parallel: usize,
}

impl RunPool {
    /// Creates a pool admitting up to `max_parallel` concurrent runs
    /// (minimum 1).
    #[must_use]
    pub fn new(max_parallel: usize) -> Self {
        let max_parallel = max_parallel.max(1);
        Self {
            permits: Arc::new(Semaphore::new(max_parallel)),
            max_parallel,
        }
    }

    /// Configured parallelism ceiling.
    #[must_use]
    pub fn max_parallel(&self) -> usize {
        self.max_parallel
    }

    /// Currently free slots.
    #[must_use]
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    /// Run `fut` once a slot frees, holding the slot for its whole
    /// duration.
    pub async fn execute<T>(&self, fut: impl Future<Output = T>) -> T {
        // The semaphore is never closed, so acquisition only fails if the
        // pool itself was dropped mid-acquire, which clones prevent.
        let _permit = self
            .permits
            .acquire()
            .await
            .expect("run pool semaphore closed");
        fut.await
    }

    /// Spawn `fut` onto the runtime; it waits for a slot inside the task so
    /// the caller never blocks on admission.
    pub fn spawn<T>(&self, fut: impl Future<Output = T> + Send + 'static) -> JoinHandle<T>
    where
        T: Send + 'static,
    {
        let permits = Arc::clone(&self.permits);
        tokio::spawn(async move {
            let _permit = permits
                .acquire_owned()
                .await
                .expect("run pool semaphore closed");
            fut.await
        })
    }
}
