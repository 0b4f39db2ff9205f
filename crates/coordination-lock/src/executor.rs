//! Single-flight executor for one lock instance.

use std::future::Future;
use std::pin::Pin;

use coordination_lock_core::error::{LockError, LockResult};
use tokio::sync::{mpsc, oneshot};
use tracing::{Instrument, trace, trace_span};

type Job = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Runs submitted jobs one at a time, in submission order.
///
/// Every store-mutating step of a lock instance goes through its executor,
/// so a watch-triggered kill can never interleave with an in-progress
/// acquire step of the same instance. Each instance owns its own executor,
/// so different instances run fully concurrently.
///
/// The draining task ends once every handle to the executor is dropped and
/// the queue is empty.
#[derive(Debug, Clone)]
pub(crate) struct SerialExecutor {
    jobs: mpsc::UnboundedSender<Job>,
}

impl SerialExecutor {
    /// Spawns the draining task on the current tokio runtime.
    pub(crate) fn spawn(name: &str) -> Self {
        let (jobs, mut queue) = mpsc::unbounded_channel::<Job>();
        let span = trace_span!("lock_executor", lock.id = %name);
        tokio::spawn(
            async move {
                while let Some(job) = queue.recv().await {
                    job.await;
                }
                trace!("lock executor drained");
            }
            .instrument(span),
        );
        Self { jobs }
    }

    /// Runs `job` after every previously submitted job and waits for its
    /// result.
    pub(crate) async fn run<T, F>(&self, job: F) -> LockResult<T>
    where
        T: Send + 'static,
        F: Future<Output = LockResult<T>> + Send + 'static,
    {
        let (sender, receiver) = oneshot::channel();
        self.jobs
            .send(Box::pin(async move {
                let _ = sender.send(job.await);
            }))
            .map_err(|_| LockError::Cancelled)?;
        receiver.await.map_err(|_| LockError::Cancelled)?
    }

    /// Queues `job` without waiting for it. Safe to call from `Drop` and
    /// from notification callbacks.
    pub(crate) fn dispatch<F>(&self, job: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if self.jobs.send(Box::pin(job)).is_err() {
            trace!("lock executor already shut down, dropping job");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_jobs_never_overlap() {
        let executor = SerialExecutor::spawn("test");
        let running = Arc::new(AtomicUsize::new(0));
        let max_running = Arc::new(AtomicUsize::new(0));

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let executor = executor.clone();
            let running = running.clone();
            let max_running = max_running.clone();
            tasks.push(tokio::spawn(async move {
                executor
                    .run(async move {
                        let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                        max_running.fetch_max(now, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(5)).await;
                        running.fetch_sub(1, Ordering::SeqCst);
                        Ok(())
                    })
                    .await
            }));
        }
        for task in tasks {
            task.await.unwrap().unwrap();
        }
        assert_eq!(max_running.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_dispatch_runs_in_order() {
        let executor = SerialExecutor::spawn("test");
        let order = Arc::new(parking_lot::Mutex::new(Vec::new()));

        for i in 0..3 {
            let order = order.clone();
            executor.dispatch(async move {
                order.lock().push(i);
            });
        }
        let value = executor.run(async { Ok(42) }).await.unwrap();
        assert_eq!(value, 42);
        assert_eq!(*order.lock(), vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn test_errors_are_returned_to_caller() {
        let executor = SerialExecutor::spawn("test");
        let result: LockResult<()> = executor
            .run(async { Err(LockError::AcquisitionFailed("boom".to_string())) })
            .await;
        assert!(matches!(result, Err(LockError::AcquisitionFailed(_))));
    }
}
