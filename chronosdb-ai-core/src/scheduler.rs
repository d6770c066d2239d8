//! AI Scheduler: a cooperative periodic/one-shot task runner.
//!
//! One dedicated scheduler task wakes on a fine tick and sweeps the task
//! list; due tasks are dispatched onto the shared [`WorkerPool`], which
//! bounds concurrency to `AI_THREAD_POOL_SIZE` rather than running on a
//! literal OS thread pool.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::clock::Clock;
use crate::worker_pool::WorkerPool;

pub type TaskId = u32;

type TaskFn = Arc<dyn Fn() -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

struct ScheduledTask {
    id: TaskId,
    name: String,
    interval_ms: u64,
    task: TaskFn,
    next_run_us: u64,
    last_run_us: u64,
    run_count: u64,
    periodic: bool,
    cancelled: bool,
}

/// Snapshot of a live task, returned by [`AiScheduler::get_scheduled_tasks`].
#[derive(Debug, Clone)]
pub struct TaskInfo {
    pub id: TaskId,
    pub name: String,
    pub interval_ms: u64,
    pub last_run_us: u64,
    pub run_count: u64,
    pub periodic: bool,
}

/// Periodic/one-shot task runner backed by a worker pool.
///
/// `start`/`stop` are idempotent. Cancellation is cooperative: an in-flight
/// invocation runs to completion, but no further invocations are
/// dispatched once cancelled.
pub struct AiScheduler {
    clock: Arc<dyn Clock>,
    worker_pool: WorkerPool,
    tasks: Mutex<Vec<ScheduledTask>>,
    next_task_id: AtomicU32,
    running: Arc<AtomicBool>,
    tick_ms: u64,
    loop_handle: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl AiScheduler {
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>, worker_pool: WorkerPool, tick_ms: u64) -> Arc<Self> {
        Arc::new(Self {
            clock,
            worker_pool,
            tasks: Mutex::new(Vec::new()),
            next_task_id: AtomicU32::new(1),
            running: Arc::new(AtomicBool::new(false)),
            tick_ms: tick_ms.max(1),
            loop_handle: Mutex::new(None),
        })
    }

    /// Register a periodic task; returns its id for later cancellation.
    pub fn schedule_periodic<F, Fut>(&self, name: impl Into<String>, interval_ms: u64, task: F) -> TaskId
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.push_task(name.into(), interval_ms, true, task)
    }

    /// Register a one-shot delayed task.
    pub fn schedule_once<F, Fut>(&self, name: impl Into<String>, delay_ms: u64, task: F) -> TaskId
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.push_task(name.into(), delay_ms, false, task)
    }

    fn push_task<F, Fut>(&self, name: String, delay_ms: u64, periodic: bool, task: F) -> TaskId
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let id = self.next_task_id.fetch_add(1, Ordering::SeqCst);
        let now = self.clock.now_us();
        let wrapped: TaskFn = Arc::new(move || Box::pin(task()));
        let mut tasks = self.tasks.lock();
        tasks.push(ScheduledTask {
            id,
            name: name.clone(),
            interval_ms: delay_ms,
            task: wrapped,
            next_run_us: now + delay_ms * 1_000,
            last_run_us: 0,
            run_count: 0,
            periodic,
            cancelled: false,
        });
        debug!(task = %name, interval_ms, periodic, "scheduled AI task");
        id
    }

    /// Mark a task cancelled. A currently-dispatched invocation still runs
    /// to completion.
    pub fn cancel(&self, id: TaskId) {
        let mut tasks = self.tasks.lock();
        if let Some(t) = tasks.iter_mut().find(|t| t.id == id) {
            t.cancelled = true;
        }
    }

    #[must_use]
    pub fn get_scheduled_tasks(&self) -> Vec<TaskInfo> {
        self.tasks
            .lock()
            .iter()
            .filter(|t| !t.cancelled)
            .map(|t| TaskInfo {
                id: t.id,
                name: t.name.clone(),
                interval_ms: t.interval_ms,
                last_run_us: t.last_run_us,
                run_count: t.run_count,
                periodic: t.periodic,
            })
            .collect()
    }

    /// Idempotent: a second `start()` while already running is a no-op.
    pub fn start(self: &Arc<Self>) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }
        let scheduler = Arc::clone(self);
        let running = Arc::clone(&self.running);
        let handle = tokio::spawn(async move {
            while running.load(Ordering::SeqCst) {
                tokio::time::sleep(std::time::Duration::from_millis(scheduler.tick_ms)).await;
                if !running.load(Ordering::SeqCst) {
                    break;
                }
                scheduler.sweep();
            }
        });
        *self.loop_handle.lock() = Some(handle);
    }

    /// Idempotent: clears the running flag so the scheduler task exits
    /// within one tick; the worker pool itself is shared and outlives
    /// `stop()`.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn sweep(&self) {
        let now = self.clock.now_us();
        let mut due: Vec<TaskFn> = Vec::new();
        {
            let mut tasks = self.tasks.lock();
            for t in tasks.iter_mut() {
                if t.cancelled || now < t.next_run_us {
                    continue;
                }
                due.push(Arc::clone(&t.task));
                t.last_run_us = now;
                t.run_count += 1;
                if t.periodic {
                    t.next_run_us = now + t.interval_ms * 1_000;
                } else {
                    t.cancelled = true;
                }
            }
            tasks.retain(|t| !(t.cancelled && !t.periodic));
        }
        for task in due {
            self.worker_pool.dispatch(async move {
                task().await;
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use std::sync::atomic::AtomicUsize;

    #[tokio::test]
    async fn periodic_task_runs_and_advances_next_run() {
        let clock = Arc::new(ManualClock::new(0));
        let scheduler = AiScheduler::new(clock.clone(), WorkerPool::new(2), 5);
        let counter = Arc::new(AtomicUsize::new(0));
        let c2 = Arc::clone(&counter);
        scheduler.schedule_periodic("test", 10, move || {
            let c = Arc::clone(&c2);
            async move {
                c.fetch_add(1, Ordering::SeqCst);
            }
        });

        scheduler.start();
        clock.advance_us(20_000);
        tokio::time::sleep(std::time::Duration::from_millis(60)).await;
        scheduler.stop();
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        assert!(counter.load(Ordering::SeqCst) >= 1);
    }

    #[tokio::test]
    async fn cancel_prevents_further_dispatch() {
        let clock = Arc::new(ManualClock::new(0));
        let scheduler = AiScheduler::new(clock.clone(), WorkerPool::new(2), 5);
        let counter = Arc::new(AtomicUsize::new(0));
        let c2 = Arc::clone(&counter);
        let id = scheduler.schedule_once("once", 0, move || {
            let c = Arc::clone(&c2);
            async move {
                c.fetch_add(1, Ordering::SeqCst);
            }
        });
        scheduler.cancel(id);
        scheduler.start();
        clock.advance_us(5_000);
        tokio::time::sleep(std::time::Duration::from_millis(30)).await;
        scheduler.stop();
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }
}
