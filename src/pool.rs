//! Bounded fan-out of async work across tokio tasks.

use std::future::Future;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::warn;

/// At most `limit` spawned futures run at a time; the rest wait for a permit.
///
/// Dropping the pool aborts every task still queued or running, so a
/// cancelled caller does not leave fetches behind.
pub struct WorkerPool<T> {
    tasks: JoinSet<T>,
    permits: Arc<Semaphore>,
}

impl<T: Send + 'static> WorkerPool<T> {
    pub fn new(limit: usize) -> Self {
        Self {
            tasks: JoinSet::new(),
            permits: Arc::new(Semaphore::new(limit.max(1))),
        }
    }

    pub fn spawn<F>(&mut self, work: F)
    where
        F: Future<Output = T> + Send + 'static,
    {
        let permits = Arc::clone(&self.permits);
        self.tasks.spawn(async move {
            let _permit = permits.acquire_owned().await;
            work.await
        });
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Next finished result in completion order. Panicked tasks are logged
    /// and skipped.
    pub async fn join_next(&mut self) -> Option<T> {
        while let Some(joined) = self.tasks.join_next().await {
            match joined {
                Ok(value) => return Some(value),
                Err(e) => warn!("worker task failed: {}", e),
            }
        }
        None
    }

    /// Wait for every task, results in completion order.
    pub async fn collect(mut self) -> Vec<T> {
        let mut out = Vec::with_capacity(self.tasks.len());
        while let Some(value) = self.join_next().await {
            out.push(value);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut pool = WorkerPool::new(3);
        for i in 0..20 {
            let running = Arc::clone(&running);
            let peak = Arc::clone(&peak);
            pool.spawn(async move {
                let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                running.fetch_sub(1, Ordering::SeqCst);
                i
            });
        }

        let mut results = pool.collect().await;
        results.sort();
        assert_eq!(results, (0..20).collect::<Vec<_>>());
        assert!(peak.load(Ordering::SeqCst) <= 3);
    }

    #[tokio::test]
    async fn test_drop_aborts_in_flight_work() {
        let finished = Arc::new(AtomicUsize::new(0));
        {
            let mut pool = WorkerPool::new(2);
            for _ in 0..4 {
                let finished = Arc::clone(&finished);
                pool.spawn(async move {
                    tokio::time::sleep(Duration::from_secs(60)).await;
                    finished.fetch_add(1, Ordering::SeqCst);
                });
            }
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(finished.load(Ordering::SeqCst), 0);
    }
}
