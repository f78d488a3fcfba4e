//! Bounded worker pool for dataset construction.

use std::future::Future;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PoolError {
    #[error("publish queue is full ({in_flight} tasks in flight, capacity {capacity})")]
    Saturated { in_flight: usize, capacity: usize },
}

/// Releases a reserved slot when the task finishes, fails or is cancelled.
struct SlotGuard(Arc<AtomicUsize>);

impl Drop for SlotGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Runs at most `workers` tasks at once with up to `queue_capacity` waiting.
#[derive(Debug)]
pub struct WorkerPool {
    permits: Arc<Semaphore>,
    in_flight: Arc<AtomicUsize>,
    capacity: usize,
    submitted: AtomicU64,
}

impl WorkerPool {
    pub fn new(workers: usize, queue_capacity: usize) -> Self {
        let workers = workers.max(1);
        Self {
            permits: Arc::new(Semaphore::new(workers)),
            in_flight: Arc::new(AtomicUsize::new(0)),
            capacity: workers + queue_capacity,
            submitted: AtomicU64::new(0),
        }
    }

    /// Schedule `task`, or refuse when every worker and queue slot is taken.
    pub fn submit<F>(&self, task: F) -> Result<JoinHandle<F::Output>, PoolError>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        let capacity = self.capacity;
        self.in_flight
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                (n < capacity).then_some(n + 1)
            })
            .map_err(|in_flight| PoolError::Saturated {
                in_flight,
                capacity,
            })?;
        self.submitted.fetch_add(1, Ordering::SeqCst);

        let guard = SlotGuard(Arc::clone(&self.in_flight));
        let permits = Arc::clone(&self.permits);
        Ok(tokio::spawn(async move {
            let _guard = guard;
            // The semaphore is never closed
            let _permit = permits.acquire_owned().await.ok();
            task.await
        }))
    }

    /// Tasks accepted since start.
    pub fn submitted(&self) -> u64 {
        self.submitted.load(Ordering::SeqCst)
    }

    /// Tasks running or waiting for a worker.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
