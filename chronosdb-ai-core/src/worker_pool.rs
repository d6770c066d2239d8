//! Shared worker pool backing both the AI Scheduler's periodic-task
//! dispatch and the Observer Registry's `notify_after` fan-out.
//!
//! Bounds concurrent background work to `AI_THREAD_POOL_SIZE` dispatched
//! invocations at a time, using `tokio::spawn` tasks gated by a counting
//! semaphore rather than a literal OS thread pool — the bound is enforced
//! across both call sites instead of being implicit in how many
//! `tokio::spawn` calls happen to be in flight.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tracing::warn;

/// Dispatches fire-and-forget futures onto the tokio runtime, bounding the
/// number of concurrently *running* futures to `capacity`. Futures queued
/// beyond capacity wait for a permit rather than spawning unbounded tasks.
#[derive(Clone)]
pub struct WorkerPool {
    semaphore: Arc<Semaphore>,
}

impl WorkerPool {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(capacity.max(1))),
        }
    }

    /// Dispatch `fut` to run on the pool. Returns immediately; never blocks
    /// the calling thread. If a task panics, the panic is caught and
    /// logged rather than propagated (a single bad task must not bring
    /// down the pool).
    pub fn dispatch<F>(&self, fut: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let semaphore = Arc::clone(&self.semaphore);
        tokio::spawn(async move {
            let _permit = match semaphore.acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => return,
            };
            // AssertUnwindSafe: the futures we dispatch only touch
            // Arc<Mutex<_>>/Arc<RwLock<_>> state, which remains
            // consistent even if a poll panics mid-await.
            let result = std::panic::AssertUnwindSafe(fut).catch_unwind().await;
            if let Err(panic) = result {
                let message = panic_message(&panic);
                warn!(error = %message, "worker pool task panicked");
            }
        });
    }
}

fn panic_message(panic: &Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

use futures::FutureExt;
