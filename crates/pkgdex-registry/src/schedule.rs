//! Deferred-task scheduling collaborator.
//!
//! Deferred work is described by a [`DeferredTask`] value and executed by a
//! [`TaskRunner`]. Tasks must be idempotent: schedulers run them at least
//! once, may retry them after a failure, and give no ordering guarantee
//! relative to other tasks.

use std::collections::{HashSet, VecDeque};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};
use serde::{Deserialize, Serialize};

use crate::error::{ScheduleError, StoreError};

/// A unit of deferred work.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeferredTask {
    /// Recompute `sort_order` for every version of a package.
    ReconcileVersionOrder { package: String },
}

/// Executes deferred tasks.
pub trait TaskRunner: Send + Sync {
    fn run(&self, task: &DeferredTask) -> Result<(), StoreError>;
}

/// Accepts deferred tasks for later execution.
pub trait TaskScheduler: Send + Sync {
    /// Enqueue `task`. Returning `Ok` means it will run at least once.
    fn schedule(&self, task: DeferredTask) -> Result<(), ScheduleError>;
}

/// A scheduler whose queue is run explicitly by the owner.
///
/// Useful where execution must be deterministic, such as tests and one-shot
/// tools.
#[derive(Debug, Default)]
pub struct ManualScheduler {
    state: Mutex<ManualState>,
}

#[derive(Debug, Default)]
struct ManualState {
    queue: VecDeque<DeferredTask>,
    closed: bool,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tasks waiting to run, oldest first.
    pub fn pending(&self) -> Vec<DeferredTask> {
        self.state.lock().queue.iter().cloned().collect()
    }

    /// Refuse all further tasks.
    pub fn close(&self) {
        self.state.lock().closed = true;
    }

    /// Run every queued task once. Failed tasks go back on the queue.
    ///
    /// Returns the number of tasks that completed.
    pub fn run_pending(&self, runner: &dyn TaskRunner) -> usize {
        let batch: Vec<DeferredTask> = self.state.lock().queue.drain(..).collect();
        let mut completed = 0;
        for task in batch {
            match runner.run(&task) {
                Ok(()) => completed += 1,
                Err(e) => {
                    tracing::warn!(?task, error = %e, "deferred task failed; requeued");
                    self.state.lock().queue.push_back(task);
                }
            }
        }
        completed
    }
}

impl TaskScheduler for ManualScheduler {
    fn schedule(&self, task: DeferredTask) -> Result<(), ScheduleError> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(ScheduleError::ShutDown);
        }
        state.queue.push_back(task);
        Ok(())
    }
}

/// Worker threads running deferred tasks in the background.
///
/// A failed task is retried after a fixed backoff until it has been
/// attempted `max_attempts` times. Scheduling a task identical to one still
/// waiting in the queue is a no-op; a task that is already running is queued
/// again so that it observes any state written after it started.
pub struct WorkerPool {
    shared: Arc<Shared>,
    workers: Vec<JoinHandle<()>>,
}

struct Shared {
    state: Mutex<PoolState>,
    work_ready: Condvar,
    idle: Condvar,
    runner: Arc<dyn TaskRunner>,
    max_attempts: u32,
    backoff: Duration,
}

#[derive(Default)]
struct PoolState {
    queue: VecDeque<Job>,
    queued: HashSet<DeferredTask>,
    running: usize,
    shutdown: bool,
}

struct Job {
    task: DeferredTask,
    attempt: u32,
}

impl PoolState {
    fn enqueue(&mut self, job: Job) -> bool {
        if !self.queued.insert(job.task.clone()) {
            return false;
        }
        self.queue.push_back(job);
        true
    }

    fn is_idle(&self) -> bool {
        self.queue.is_empty() && self.running == 0
    }
}

impl WorkerPool {
    /// Start `workers` threads (at least one) executing tasks with `runner`.
    pub fn new(
        runner: Arc<dyn TaskRunner>,
        workers: usize,
        max_attempts: u32,
        backoff: Duration,
    ) -> Result<Self, ScheduleError> {
        let shared = Arc::new(Shared {
            state: Mutex::new(PoolState::default()),
            work_ready: Condvar::new(),
            idle: Condvar::new(),
            runner,
            max_attempts: max_attempts.max(1),
            backoff,
        });

        let mut pool = WorkerPool {
            shared,
            workers: Vec::new(),
        };
        for i in 0..workers.max(1) {
            let shared = Arc::clone(&pool.shared);
            let handle = std::thread::Builder::new()
                .name(format!("pkgdex-worker-{i}"))
                .spawn(move || worker_loop(&shared))?;
            pool.workers.push(handle);
        }
        Ok(pool)
    }

    /// Block until the queue is empty and no task is running.
    pub fn wait_idle(&self) {
        let mut state = self.shared.state.lock();
        while !state.is_idle() {
            self.shared.idle.wait(&mut state);
        }
    }

    /// Stop accepting tasks, finish everything queued, and join the workers.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        {
            let mut state = self.shared.state.lock();
            state.shutdown = true;
        }
        self.shared.work_ready.notify_all();
        for handle in self.workers.drain(..) {
            if handle.join().is_err() {
                tracing::error!("worker thread panicked");
            }
        }
    }
}

impl TaskScheduler for WorkerPool {
    fn schedule(&self, task: DeferredTask) -> Result<(), ScheduleError> {
        let mut state = self.shared.state.lock();
        if state.shutdown {
            return Err(ScheduleError::ShutDown);
        }
        if state.enqueue(Job { task, attempt: 1 }) {
            self.shared.work_ready.notify_one();
        } else {
            tracing::debug!("identical task already queued; coalesced");
        }
        Ok(())
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        if !self.workers.is_empty() {
            self.stop();
        }
    }
}

fn worker_loop(shared: &Shared) {
    loop {
        let job = {
            let mut state = shared.state.lock();
            loop {
                if let Some(job) = state.queue.pop_front() {
                    state.queued.remove(&job.task);
                    state.running += 1;
                    break job;
                }
                if state.shutdown {
                    return;
                }
                shared.work_ready.wait(&mut state);
            }
        };

        // A panic counts as a failed attempt.
        let result = match panic::catch_unwind(AssertUnwindSafe(|| shared.runner.run(&job.task))) {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(e.to_string()),
            Err(_) => Err("task panicked".to_string()),
        };
        let retry = match result {
            Ok(()) => {
                tracing::debug!(task = ?job.task, attempt = job.attempt, "deferred task completed");
                None
            }
            Err(e) if job.attempt < shared.max_attempts => {
                tracing::warn!(
                    task = ?job.task,
                    attempt = job.attempt,
                    error = %e,
                    "deferred task failed; retrying"
                );
                std::thread::sleep(shared.backoff);
                Some(Job {
                    task: job.task,
                    attempt: job.attempt + 1,
                })
            }
            Err(e) => {
                tracing::error!(
                    task = ?job.task,
                    attempts = job.attempt,
                    error = %e,
                    "deferred task abandoned"
                );
                None
            }
        };

        let mut state = shared.state.lock();
        state.running -= 1;
        if let Some(job) = retry {
            if state.enqueue(job) {
                shared.work_ready.notify_one();
            }
        }
        if state.is_idle() {
            shared.idle.notify_all();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn reconcile(package: &str) -> DeferredTask {
        DeferredTask::ReconcileVersionOrder {
            package: package.to_string(),
        }
    }

    /// Counts runs and fails the first `failures` of them.
    #[derive(Default)]
    struct Flaky {
        runs: AtomicUsize,
        failures: usize,
    }

    impl TaskRunner for Flaky {
        fn run(&self, task: &DeferredTask) -> Result<(), StoreError> {
            let n = self.runs.fetch_add(1, Ordering::SeqCst);
            if n < self.failures {
                let DeferredTask::ReconcileVersionOrder { package } = task;
                return Err(StoreError::Conflict {
                    package: package.clone(),
                });
            }
            Ok(())
        }
    }

    #[test]
    fn manual_scheduler_runs_queue() {
        let scheduler = ManualScheduler::new();
        scheduler.schedule(reconcile("a")).unwrap();
        scheduler.schedule(reconcile("b")).unwrap();
        assert_eq!(scheduler.pending().len(), 2);

        let runner = Flaky::default();
        assert_eq!(scheduler.run_pending(&runner), 2);
        assert!(scheduler.pending().is_empty());
    }

    #[test]
    fn manual_scheduler_requeues_failures() {
        let scheduler = ManualScheduler::new();
        scheduler.schedule(reconcile("a")).unwrap();
        let runner = Flaky {
            failures: 1,
            ..Default::default()
        };

        assert_eq!(scheduler.run_pending(&runner), 0);
        assert_eq!(scheduler.pending(), vec![reconcile("a")]);
        assert_eq!(scheduler.run_pending(&runner), 1);
    }

    #[test]
    fn closed_manual_scheduler_refuses_work() {
        let scheduler = ManualScheduler::new();
        scheduler.close();
        assert!(matches!(
            scheduler.schedule(reconcile("a")),
            Err(ScheduleError::ShutDown)
        ));
    }

    #[test]
    fn pool_runs_tasks() {
        let runner = Arc::new(Flaky::default());
        let pool = WorkerPool::new(runner.clone(), 2, 3, Duration::ZERO).unwrap();
        pool.schedule(reconcile("a")).unwrap();
        pool.schedule(reconcile("b")).unwrap();
        pool.wait_idle();
        assert_eq!(runner.runs.load(Ordering::SeqCst), 2);
        pool.shutdown();
    }

    #[test]
    fn pool_retries_until_success() {
        let runner = Arc::new(Flaky {
            failures: 2,
            ..Default::default()
        });
        let pool = WorkerPool::new(runner.clone(), 1, 5, Duration::from_millis(1)).unwrap();
        pool.schedule(reconcile("a")).unwrap();
        pool.wait_idle();
        assert_eq!(runner.runs.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn pool_gives_up_after_max_attempts() {
        let runner = Arc::new(Flaky {
            failures: usize::MAX,
            ..Default::default()
        });
        let pool = WorkerPool::new(runner.clone(), 1, 3, Duration::ZERO).unwrap();
        pool.schedule(reconcile("a")).unwrap();
        pool.wait_idle();
        assert_eq!(runner.runs.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn pool_shutdown_drains_queue() {
        let runner = Arc::new(Flaky::default());
        let pool = WorkerPool::new(runner.clone(), 1, 1, Duration::ZERO).unwrap();
        for name in ["a", "b", "c", "d"] {
            pool.schedule(reconcile(name)).unwrap();
        }
        pool.shutdown();
        assert_eq!(runner.runs.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn pool_refuses_work_after_shutdown() {
        let runner = Arc::new(Flaky::default());
        let mut pool = WorkerPool::new(runner, 1, 1, Duration::ZERO).unwrap();
        pool.stop();
        assert!(matches!(
            pool.schedule(reconcile("a")),
            Err(ScheduleError::ShutDown)
        ));
    }

    /// Panics on the first `panics` runs, then succeeds.
    #[derive(Default)]
    struct Panicky {
        runs: AtomicUsize,
        panics: usize,
    }

    impl TaskRunner for Panicky {
        fn run(&self, _task: &DeferredTask) -> Result<(), StoreError> {
            if self.runs.fetch_add(1, Ordering::SeqCst) < self.panics {
                panic!("runner blew up");
            }
            Ok(())
        }
    }

    #[test]
    fn pool_survives_panicking_task() {
        let runner = Arc::new(Panicky {
            panics: 1,
            ..Default::default()
        });
        let pool = WorkerPool::new(runner.clone(), 1, 3, Duration::ZERO).unwrap();
        pool.schedule(reconcile("a")).unwrap();
        pool.wait_idle();
        assert_eq!(runner.runs.load(Ordering::SeqCst), 2);

        pool.schedule(reconcile("b")).unwrap();
        pool.wait_idle();
        assert_eq!(runner.runs.load(Ordering::SeqCst), 3);
        pool.shutdown();
    }

    #[test]
    fn pool_abandons_task_that_always_panics() {
        let runner = Arc::new(Panicky {
            panics: usize::MAX,
            ..Default::default()
        });
        let pool = WorkerPool::new(runner.clone(), 1, 2, Duration::ZERO).unwrap();
        pool.schedule(reconcile("a")).unwrap();
        pool.wait_idle();
        assert_eq!(runner.runs.load(Ordering::SeqCst), 2);
        pool.shutdown();
    }
}

