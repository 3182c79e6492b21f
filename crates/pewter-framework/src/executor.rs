//! Bounded worker pool and the shared error-isolation boundary.
//!
//! Command handlers and scheduled callbacks both run through [`isolate`], so a
//! failing or panicking plugin surfaces as a [`HandlerError`] instead of
//! tearing down the router or the scheduler loop.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio_util::task::TaskTracker;
use tower::BoxError;

use crate::error::HandlerError;

/// Runs `fut`, turning both `Err` and panics into a [`HandlerError`].
pub async fn isolate<F, T>(fut: F) -> Result<T, HandlerError>
where
    F: Future<Output = Result<T, BoxError>>,
{
    match AssertUnwindSafe(fut).catch_unwind().await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(HandlerError::Failed(e)),
        Err(payload) => Err(HandlerError::Panicked(panic_message(payload.as_ref()))),
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// A pool of tokio tasks limited to `max_concurrent` running at once.
///
/// Spawning never blocks the caller; tasks queue on the semaphore inside the
/// pool. [`shutdown`](Self::shutdown) waits for everything spawned so far.
#[derive(Debug, Clone)]
pub struct Executor {
    permits: Arc<Semaphore>,
    tracker: TaskTracker,
    limit: usize,
}

impl Executor {
    pub fn new(max_concurrent: usize) -> Self {
        let limit = max_concurrent.max(1);
        Self {
            permits: Arc::new(Semaphore::new(limit)),
            tracker: TaskTracker::new(),
            limit,
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Number of spawned tasks that have not finished yet.
    pub fn in_flight(&self) -> usize {
        self.tracker.len()
    }

    pub fn spawn<F>(&self, fut: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        let permits = Arc::clone(&self.permits);
        self.tracker.spawn(async move {
            let _permit = permits.acquire_owned().await.ok();
            fut.await
        })
    }

    /// Waits for every task spawned so far to finish.
    pub async fn shutdown(&self) {
        self.tracker.close();
        self.tracker.wait().await;
    }
}

impl Default for Executor {
    fn default() -> Self {
        Self::new(16)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_isolate_passes_value() {
        let out = isolate(async { Ok::<_, BoxError>(7) }).await.unwrap();
        assert_eq!(out, 7);
    }

    #[tokio::test]
    async fn test_isolate_catches_error() {
        let err = isolate(async { Err::<(), BoxError>("nope".into()) })
            .await
            .unwrap_err();
        assert!(matches!(err, HandlerError::Failed(e) if e.to_string() == "nope"));
    }

    #[tokio::test]
    async fn test_isolate_catches_panic() {
        let err = isolate(async {
            if true {
                panic!("kaboom");
            }
            Ok::<(), BoxError>(())
        })
        .await
        .unwrap_err();
        assert!(matches!(err, HandlerError::Panicked(msg) if msg == "kaboom"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_executor_bounds_concurrency() {
        let pool = Executor::new(2);
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        for _ in 0..8 {
            let running = Arc::clone(&running);
            let peak = Arc::clone(&peak);
            pool.spawn(async move {
                let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(10)).await;
                running.fetch_sub(1, Ordering::SeqCst);
            });
        }

        pool.shutdown().await;
        assert_eq!(pool.in_flight(), 0);
        assert!(peak.load(Ordering::SeqCst) <= 2);
    }
}
