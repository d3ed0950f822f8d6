//! Bounded worker pool
//!
//! Each submission waits for a free slot before its work is spawned, so the
//! producer is throttled to the pool's capacity and never queues more than
//! `capacity` jobs. A slot is released when the job's future completes, fails
//! or is cancelled.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::{oneshot, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::errors::{PoolError, PoolResult};

/// Handle to the result of a submitted job
#[derive(Debug)]
pub struct TaskHandle<T> {
    result: oneshot::Receiver<T>,
}

impl<T> TaskHandle<T> {
    /// Waits for the job to finish
    ///
    /// # Errors
    ///
    /// Returns `PoolError::Abandoned` if the job was cancelled or panicked
    pub async fn join(self) -> PoolResult<T> {
        self.result.await.map_err(|_| PoolError::Abandoned)
    }
}

/// Summary of how the pool's jobs ended
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolReport {
    pub completed: usize,
    pub cancelled: usize,
    pub panicked: usize,
}

/// Runs at most `capacity` jobs at once
#[derive(Debug)]
pub struct BoundedWorkerPool {
    gate: Arc<Semaphore>,
    capacity: usize,
    tasks: JoinSet<()>,
    report: PoolReport,
}

impl BoundedWorkerPool {
    /// Creates a pool with `capacity` slots
    ///
    /// # Errors
    ///
    /// Returns `PoolError::InvalidCapacity` for a capacity of zero
    pub fn new(capacity: usize) -> PoolResult<Self> {
        if capacity == 0 {
            return Err(PoolError::InvalidCapacity);
        }
        Ok(Self {
            gate: Arc::new(Semaphore::new(capacity)),
            capacity,
            tasks: JoinSet::new(),
            report: PoolReport::default(),
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of jobs currently holding a slot
    pub fn in_flight(&self) -> usize {
        self.capacity - self.gate.available_permits()
    }

    /// Submits a job, waiting until a slot is free
    ///
    /// # Errors
    ///
    /// Returns `PoolError::Closed` if the pool was shut down while waiting
    pub async fn submit<F, T>(&mut self, job: F) -> PoolResult<TaskHandle<T>>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        self.reap();

        let permit = self
            .gate
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| PoolError::Closed)?;

        let (tx, rx) = oneshot::channel();
        self.tasks.spawn(async move {
            let _permit = permit;
            let _ = tx.send(job.await);
        });

        Ok(TaskHandle { result: rx })
    }

    /// Waits until no submitted job is left running
    ///
    /// Cancel safe: dropping the future loses no bookkeeping, so it can race a
    /// shutdown signal and be followed by [`Self::abandon`].
    pub async fn drain(&mut self) {
        while let Some(joined) = self.tasks.join_next().await {
            self.record(joined);
        }
    }

    /// Waits for every submitted job to finish
    pub async fn finish(mut self) -> PoolReport {
        self.drain().await;
        self.gate.close();
        debug!("Worker pool finished: {:?}", self.report);
        self.report
    }

    /// Cancels every job that has not finished yet
    ///
    /// Cancelled jobs are dropped at their next suspension point, which runs
    /// their destructors.
    pub async fn abandon(mut self) -> PoolReport {
        self.gate.close();
        self.tasks.abort_all();
        while let Some(joined) = self.tasks.join_next().await {
            self.record(joined);
        }
        debug!("Worker pool abandoned: {:?}", self.report);
        self.report
    }

    fn reap(&mut self) {
        while let Some(joined) = self.tasks.try_join_next() {
            self.record(joined);
        }
    }

    fn record(&mut self, joined: Result<(), tokio::task::JoinError>) {
        match joined {
            Ok(()) => self.report.completed += 1,
            Err(e) if e.is_cancelled() => self.report.cancelled += 1,
            Err(e) => {
                warn!("Worker job panicked: {}", e);
                self.report.panicked += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;

    use tokio::time::timeout;

    use super::*;

    /// Test concurrency bound
    ///
    /// Verifies that a pool of capacity 2 running 5 jobs never has more than
    /// 2 of them executing at once, and that all 5 complete.
    #[tokio::test]
    async fn test_never_exceeds_capacity() {
        let mut pool = BoundedWorkerPool::new(2).unwrap();
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for i in 0..5 {
            let running = running.clone();
            let peak = peak.clone();
            let handle = pool
                .submit(async move {
                    let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    running.fetch_sub(1, Ordering::SeqCst);
                    i
                })
                .await
                .unwrap();
            assert!(pool.in_flight() <= 2);
            handles.push(handle);
        }

        let mut results = Vec::new();
        for handle in handles {
            results.push(handle.join().await.unwrap());
        }
        assert_eq!(results, vec![0, 1, 2, 3, 4]);
        assert_eq!(peak.load(Ordering::SeqCst), 2);

        let report = pool.finish().await;
        assert_eq!(report.completed, 5);
    }

    /// Test submission backpressure
    ///
    /// Ensures that submitting to a full pool waits until a slot frees up.
    #[tokio::test]
    async fn test_submit_blocks_when_full() {
        let mut pool = BoundedWorkerPool::new(1).unwrap();
        let (release_tx, release_rx) = oneshot::channel::<()>();
        pool.submit(async move {
            let _ = release_rx.await;
        })
        .await
        .unwrap();

        let blocked = timeout(Duration::from_millis(50), pool.submit(async {})).await;
        assert!(blocked.is_err());

        release_tx.send(()).unwrap();
        let admitted = timeout(Duration::from_secs(1), pool.submit(async {})).await;
        assert!(admitted.is_ok());
        pool.finish().await;
    }

    #[tokio::test]
    async fn test_failed_job_does_not_stop_pool() {
        let mut pool = BoundedWorkerPool::new(2).unwrap();
        let failing = pool
            .submit(async { Err::<u32, String>("boom".to_string()) })
            .await
            .unwrap();
        let panicking = pool
            .submit(async {
                panic!("job panicked");
            })
            .await
            .unwrap();
        let fine = pool.submit(async { Ok::<u32, String>(7) }).await.unwrap();

        assert!(failing.join().await.unwrap().is_err());
        assert!(matches!(panicking.join().await, Err(PoolError::Abandoned)));
        assert_eq!(fine.join().await.unwrap(), Ok(7));

        let report = pool.finish().await;
        assert_eq!(report.completed, 2);
        assert_eq!(report.panicked, 1);
    }

    /// Test cancellation
    ///
    /// Verifies that abandoning the pool cancels in-flight jobs and runs
    /// their drop guards.
    #[tokio::test]
    async fn test_abandon_cancels_in_flight_jobs() {
        struct Guard(Arc<AtomicBool>);
        impl Drop for Guard {
            fn drop(&mut self) {
                self.0.store(true, Ordering::SeqCst);
            }
        }

        let mut pool = BoundedWorkerPool::new(2).unwrap();
        let dropped = Arc::new(AtomicBool::new(false));
        let flag = dropped.clone();
        let handle = pool
            .submit(async move {
                let _guard = Guard(flag);
                tokio::time::sleep(Duration::from_secs(60)).await;
            })
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(10)).await;
        let report = pool.abandon().await;

        assert_eq!(report.cancelled, 1);
        assert!(dropped.load(Ordering::SeqCst));
        assert!(matches!(handle.join().await, Err(PoolError::Abandoned)));
    }

    #[tokio::test]
    async fn test_interrupted_drain_can_be_abandoned() {
        let mut pool = BoundedWorkerPool::new(2).unwrap();
        pool.submit(async {}).await.unwrap();
        pool.submit(tokio::time::sleep(Duration::from_secs(60)))
            .await
            .unwrap();

        assert!(timeout(Duration::from_millis(50), pool.drain()).await.is_err());

        let report = pool.abandon().await;
        assert_eq!(report.completed, 1);
        assert_eq!(report.cancelled, 1);
    }

    #[test]
    fn test_zero_capacity_is_rejected() {
        assert!(matches!(
            BoundedWorkerPool::new(0),
            Err(PoolError::InvalidCapacity)
        ));
    }
}
