//! Bounded worker pool: a fixed number of concurrent task slots with FIFO
//! enqueue and unordered completion, per spec.md §4.3.
//!
//! Grounded in the teacher's `src/bin/ingestion_worker.rs`, which caps
//! concurrency with `while set.len() < max_concurrency` over a
//! `tokio::task::JoinSet`. That pattern requires every task to be spawned
//! from the same call site as the bound check, which doesn't fit a pool
//! object handed out to callers over time. Here the bound is enforced with
//! a `tokio::sync::Semaphore` instead: `add_task` spawns immediately
//! (preserving FIFO submission order) but the spawned task's body waits on
//! a permit before running, so at most `size` task bodies execute at once.

use std::future::Future;
use std::mem;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::error;

pub struct WorkerPool {
    semaphore: Arc<Semaphore>,
    handles: std::sync::Mutex<Vec<JoinHandle<()>>>,
}

impl WorkerPool {
    pub fn new(size: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(size)),
            handles: std::sync::Mutex::new(Vec::new()),
        }
    }

    /// Enqueues a task. Returns immediately; the task body itself doesn't
    /// start running until a slot is free, per spec.md §4.3's "bounded FIFO
    /// queue" semantics — enqueue order is preserved even though completion
    /// order is not.
    pub fn add_task<F>(&self, fut: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let semaphore = self.semaphore.clone();
        let handle = tokio::spawn(async move {
            let _permit = match semaphore.acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => {
                    error!("worker pool semaphore closed before task could run");
                    return;
                }
            };
            fut.await;
        });

        let mut handles = self.handles.lock().expect("worker pool handle lock poisoned");
        handles.push(handle);
    }

    /// Waits for every task submitted so far to complete, per spec.md
    /// §4.3's `await()` barrier semantics. A panicking task is logged and
    /// does not stop the others from being awaited.
    pub async fn await_all(&self) {
        let handles = {
            let mut guard = self.handles.lock().expect("worker pool handle lock poisoned");
            mem::take(&mut *guard)
        };

        for handle in handles {
            if let Err(e) = handle.await {
                error!(error = %e, "worker task panicked");
            }
        }
    }

    /// Awaits every outstanding task and consumes the pool, matching the
    /// process driver's per-phase barrier: a phase's worker pool is fully
    /// drained before the next phase begins.
    pub async fn shutdown(self) {
        self.await_all().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn all_submitted_tasks_run_to_completion() {
        let pool = WorkerPool::new(2);
        let counter = Arc::new(AtomicUsize::new(0));

        for _ in 0..10 {
            let counter = counter.clone();
            pool.add_task(async move {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }

        pool.await_all().await;
        assert_eq!(counter.load(Ordering::SeqCst), 10);
    }

    #[tokio::test]
    async fn concurrency_never_exceeds_pool_size() {
        let pool = WorkerPool::new(3);
        let in_flight = Arc::new(AtomicUsize::new(0));
        let max_observed = Arc::new(AtomicUsize::new(0));

        for _ in 0..20 {
            let in_flight = in_flight.clone();
            let max_observed = max_observed.clone();
            pool.add_task(async move {
                let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                max_observed.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(std::time::Duration::from_millis(5)).await;
                in_flight.fetch_sub(1, Ordering::SeqCst);
            });
        }

        pool.await_all().await;
        assert!(max_observed.load(Ordering::SeqCst) <= 3);
    }
}
