//! Completion barrier for every task spawned during a run.
//!
//! Download tasks and the persistence writer are spawned through the barrier,
//! which registers them before they start and deregisters them when they end,
//! whether they return normally or panic. [`CompletionBarrier::wait`] returns
//! only when all of them are gone.

use std::future::Future;

use tokio::task::JoinHandle;
use tokio_util::task::TaskTracker;

/// Tracks spawned work so shutdown can wait for it
#[derive(Clone, Debug, Default)]
pub struct CompletionBarrier {
    tracker: TaskTracker,
}

impl CompletionBarrier {
    /// Create an empty barrier
    pub fn new() -> Self {
        Self {
            tracker: TaskTracker::new(),
        }
    }

    /// Spawn `task` on the runtime, registered with this barrier.
    pub fn spawn<F>(&self, task: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        self.tracker.spawn(task)
    }

    /// Tasks registered and not yet finished
    pub fn in_flight(&self) -> usize {
        self.tracker.len()
    }

    /// Block until every registered task has finished.
    ///
    /// Call after the last `spawn`; tasks spawned concurrently with the wait are
    /// still waited for, but nothing may be spawned once it has returned.
    pub async fn wait(&self) {
        self.tracker.close();
        tracing::debug!(in_flight = self.tracker.len(), "Waiting for dispatched tasks");
        self.tracker.wait().await;
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn wait_returns_after_all_tasks_finish() {
        let barrier = CompletionBarrier::new();
        let done = Arc::new(AtomicUsize::new(0));

        for i in 0..10u64 {
            let done = Arc::clone(&done);
            barrier.spawn(async move {
                tokio::time::sleep(Duration::from_millis(5 * (i % 3))).await;
                done.fetch_add(1, Ordering::SeqCst);
            });
        }

        barrier.wait().await;
        assert_eq!(done.load(Ordering::SeqCst), 10);
        assert_eq!(barrier.in_flight(), 0);
    }

    #[tokio::test]
    async fn wait_with_nothing_spawned_returns_immediately() {
        let barrier = CompletionBarrier::new();
        tokio::time::timeout(Duration::from_millis(100), barrier.wait())
            .await
            .expect("empty barrier should not block");
    }

    #[tokio::test]
    async fn panicking_task_still_deregisters() {
        let barrier = CompletionBarrier::new();
        let handle = barrier.spawn(async {
            panic!("task blew up");
        });
        barrier.spawn(async {});

        tokio::time::timeout(Duration::from_secs(1), barrier.wait())
            .await
            .expect("a panicking task must not hold the barrier");
        assert!(handle.await.unwrap_err().is_panic());
    }

    #[tokio::test]
    async fn in_flight_counts_pending_tasks() {
        let barrier = CompletionBarrier::new();
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        barrier.spawn(async move {
            rx.await.ok();
        });
        assert_eq!(barrier.in_flight(), 1);

        tx.send(()).unwrap();
        barrier.wait().await;
        assert_eq!(barrier.in_flight(), 0);
    }
}
