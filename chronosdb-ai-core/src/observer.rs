//! Observer Registry: the only coupling point between the execution engine
//! and the AI layer.
//!
//! `notify_before` is synchronous and veto-capable, called on the query
//! thread. `notify_after` snapshots the observer list under a shared lock
//! and then dispatches the fan-out to the worker pool so query latency
//! never depends on AI processing.

use std::sync::Arc;

use parking_lot::RwLock;

use crate::engine_hooks::DmlEvent;
use crate::worker_pool::WorkerPool;

/// Implemented by both the Learning Engine and the Immune System.
///
/// Default methods allow and no-op, so an observer that only cares about one
/// hook doesn't have to implement both.
#[async_trait::async_trait]
pub trait Observer: Send + Sync {
    /// Called synchronously before the operation commits. Returning `false`
    /// vetoes the DML.
    async fn on_before_dml(&self, _event: &DmlEvent) -> bool {
        true
    }

    /// Called after the operation completes, on a worker-pool task.
    async fn on_after_dml(&self, _event: &DmlEvent) {}
}

/// Central registry the engine calls into around every DML operation.
///
/// Holds non-owning `Arc` references: observers live as long as the
/// subsystem that registered them, and a registration is identified by
/// pointer equality so a duplicate `register` call is a no-op.
pub struct ObserverRegistry {
    observers: RwLock<Vec<Arc<dyn Observer>>>,
    worker_pool: WorkerPool,
}

impl ObserverRegistry {
    #[must_use]
    pub fn new(worker_pool: WorkerPool) -> Self {
        Self {
            observers: RwLock::new(Vec::new()),
            worker_pool,
        }
    }

    /// Idempotent: a duplicate registration (by pointer identity) is
    /// ignored.
    pub fn register(&self, observer: Arc<dyn Observer>) {
        let mut observers = self.observers.write();
        let ptr = Arc::as_ptr(&observer).cast::<()>();
        if observers
            .iter()
            .any(|o| Arc::as_ptr(o).cast::<()>() == ptr)
        {
            return;
        }
        observers.push(observer);
    }

    pub fn unregister(&self, observer: &Arc<dyn Observer>) {
        let mut observers = self.observers.write();
        let ptr = Arc::as_ptr(observer).cast::<()>();
        observers.retain(|o| Arc::as_ptr(o).cast::<()>() != ptr);
    }

    /// Fan out to every observer in registration order, holding the shared
    /// lock for the full call. Short-circuits on the first veto.
    pub async fn notify_before(&self, event: &DmlEvent) -> bool {
        let snapshot = self.observers.read().clone();
        for observer in &snapshot {
            if !observer.on_before_dml(event).await {
                return false;
            }
        }
        true
    }

    /// Snapshots the observer list, then dispatches the fan-out to the
    /// worker pool. Never blocks the calling (query) thread beyond the
    /// snapshot.
    pub fn notify_after(&self, event: DmlEvent) {
        let snapshot = self.observers.read().clone();
        let event = Arc::new(event);
        self.worker_pool.dispatch(async move {
            for observer in snapshot {
                observer.on_after_dml(&event).await;
            }
        });
    }

    #[must_use]
    pub fn observer_count(&self) -> usize {
        self.observers.read().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingObserver {
        before_calls: AtomicUsize,
        after_calls: AtomicUsize,
        veto: bool,
    }

    impl CountingObserver {
        fn new(veto: bool) -> Self {
            Self {
                before_calls: AtomicUsize::new(0),
                after_calls: AtomicUsize::new(0),
                veto,
            }
        }
    }

    #[async_trait::async_trait]
    impl Observer for CountingObserver {
        async fn on_before_dml(&self, _event: &DmlEvent) -> bool {
            self.before_calls.fetch_add(1, Ordering::SeqCst);
            !self.veto
        }

        async fn on_after_dml(&self, _event: &DmlEvent) {
            self.after_calls.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn event() -> DmlEvent {
        DmlEvent::new(crate::engine_hooks::DmlOperation::Insert, "t", 0)
    }

    #[tokio::test]
    async fn duplicate_registration_is_ignored() {
        let registry = ObserverRegistry::new(WorkerPool::new(2));
        let observer: Arc<dyn Observer> = Arc::new(CountingObserver::new(false));
        registry.register(observer.clone());
        registry.register(observer.clone());
        assert_eq!(registry.observer_count(), 1);
    }

    #[tokio::test]
    async fn veto_short_circuits_notify_before() {
        let registry = ObserverRegistry::new(WorkerPool::new(2));
        let vetoing: Arc<dyn Observer> = Arc::new(CountingObserver::new(true));
        registry.register(vetoing);
        assert!(!registry.notify_before(&event()).await);
    }

    #[tokio::test]
    async fn notify_after_dispatches_to_every_observer() {
        let registry = ObserverRegistry::new(WorkerPool::new(4));
        let observer = Arc::new(CountingObserver::new(false));
        registry.register(observer.clone() as Arc<dyn Observer>);

        for _ in 0..5 {
            registry.notify_after(event());
        }
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert_eq!(observer.after_calls.load(Ordering::SeqCst), 5);
    }
}
