//! Bounded worker pool with a blocking-submit saturation policy.
//!
//! Sizing follows the classic core/maximum executor model:
//!
//! 1. Fewer than `core` workers: spawn a worker for the task.
//! 2. Otherwise, room in the queue: enqueue the task.
//! 3. Otherwise, fewer than `maximum` workers: spawn a worker for the task.
//! 4. Otherwise the pool is saturated and the submitter **blocks** until a
//!    worker frees a queue slot. Tasks are never rejected or dropped while the
//!    pool is running; there is no timeout on this wait.
//!
//! Idle workers above `core` (or any idle worker when core timeout is allowed)
//! exit after `keep_alive`. A pool runs until [`WorkerPool::shutdown`] is called.

use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use quarantine_core::PoolSpec;
use tracing::{debug, error, warn};

use crate::error::EngineError;

/// Unit of work executed by a pool worker.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Point-in-time counters of a [`WorkerPool`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    /// Live worker threads.
    pub workers: usize,
    /// Highest number of live workers ever observed.
    pub largest_workers: usize,
    /// Tasks waiting in the queue.
    pub queued: usize,
    /// Tasks that finished running (successfully or by panicking).
    pub completed: u64,
    pub shut_down: bool,
}

struct State {
    queue: VecDeque<Job>,
    workers: usize,
    largest_workers: usize,
    shutdown: bool,
}

struct Shared {
    name: String,
    core: usize,
    maximum: usize,
    capacity: usize,
    keep_alive: Duration,
    allow_core_timeout: bool,
    state: Mutex<State>,
    work_available: Condvar,
    space_available: Condvar,
    terminated: Condvar,
    thread_seq: AtomicUsize,
    completed: AtomicU64,
}

/// A long-lived group of worker threads fed from one bounded queue.
pub struct WorkerPool {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("name", &self.shared.name)
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

impl WorkerPool {
    /// Creates a pool named `name` sized by `spec`. No threads are started
    /// until the first submission.
    ///
    /// The caller is responsible for validating `spec`; a zero queue capacity
    /// is treated as one slot.
    #[must_use]
    pub fn new(name: impl Into<String>, spec: &PoolSpec) -> Self {
        Self {
            shared: Arc::new(Shared {
                name: name.into(),
                core: spec.core_pool_size,
                maximum: spec.maximum_pool_size.max(1),
                capacity: spec.work_queue_size.max(1),
                keep_alive: spec.keep_alive(),
                allow_core_timeout: spec.allow_core_thread_timeout,
                state: Mutex::new(State {
                    queue: VecDeque::with_capacity(spec.work_queue_size),
                    workers: 0,
                    largest_workers: 0,
                    shutdown: false,
                }),
                work_available: Condvar::new(),
                space_available: Condvar::new(),
                terminated: Condvar::new(),
                thread_seq: AtomicUsize::new(0),
                completed: AtomicU64::new(0),
            }),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// Submits `job`, blocking while the pool is saturated.
    ///
    /// If submission fails the job is dropped without running.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::PoolShutDown`] once the pool has been shut down
    /// (including while this call was blocked), or [`EngineError::PoolSpawn`]
    /// if a worker thread could not be started.
    pub fn execute(&self, job: Job) -> Result<(), EngineError> {
        let shared = &self.shared;
        let mut state = shared.state.lock();
        let mut waited_since: Option<Instant> = None;
        loop {
            if state.shutdown {
                return Err(EngineError::PoolShutDown {
                    operation: shared.name.clone(),
                });
            }
            if state.workers < shared.core {
                return spawn_worker(shared, &mut state, Some(job));
            }
            if state.queue.len() < shared.capacity {
                state.queue.push_back(job);
                if state.workers == 0 {
                    // core == 0: someone has to drain the queue.
                    if let Err(err) = spawn_worker(shared, &mut state, None) {
                        let orphan = state.queue.pop_back();
                        drop(state);
                        drop(orphan);
                        return Err(err);
                    }
                } else {
                    shared.work_available.notify_one();
                }
                if let Some(since) = waited_since {
                    debug!(
                        pool = %shared.name,
                        waited_ms = u64::try_from(since.elapsed().as_millis()).unwrap_or(u64::MAX),
                        "submitter resumed after saturation"
                    );
                }
                return Ok(());
            }
            if state.workers < shared.maximum {
                return spawn_worker(shared, &mut state, Some(job));
            }

            if waited_since.is_none() {
                debug!(
                    pool = %shared.name,
                    workers = state.workers,
                    queued = state.queue.len(),
                    "pool saturated, blocking submitter"
                );
                waited_since = Some(Instant::now());
            }
            shared.space_available.wait(&mut state);
        }
    }

    /// Stops accepting tasks. Queued tasks still run; blocked submitters fail
    /// with [`EngineError::PoolShutDown`]; idle workers exit.
    pub fn shutdown(&self) {
        let mut state = self.shared.state.lock();
        if state.shutdown {
            return;
        }
        state.shutdown = true;
        debug!(pool = %self.shared.name, queued = state.queue.len(), "pool shutting down");
        self.shared.work_available.notify_all();
        self.shared.space_available.notify_all();
        if state.workers == 0 {
            self.shared.terminated.notify_all();
        }
    }

    /// Waits until every worker has exited after [`shutdown`](Self::shutdown).
    /// Returns `true` if the pool terminated within `timeout`.
    pub fn await_termination(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.shared.state.lock();
        while !(state.shutdown && state.workers == 0) {
            if self
                .shared
                .terminated
                .wait_until(&mut state, deadline)
                .timed_out()
            {
                return state.shutdown && state.workers == 0;
            }
        }
        true
    }

    #[must_use]
    pub fn is_shutdown(&self) -> bool {
        self.shared.state.lock().shutdown
    }

    #[must_use]
    pub fn stats(&self) -> PoolStats {
        let state = self.shared.state.lock();
        PoolStats {
            workers: state.workers,
            largest_workers: state.largest_workers,
            queued: state.queue.len(),
            completed: self.shared.completed.load(Ordering::Relaxed),
            shut_down: state.shutdown,
        }
    }
}

/// Starts a worker thread; the caller holds the state lock.
fn spawn_worker(
    shared: &Arc<Shared>,
    state: &mut State,
    first: Option<Job>,
) -> Result<(), EngineError> {
    let seq = shared.thread_seq.fetch_add(1, Ordering::Relaxed) + 1;
    let thread_name = format!("{}-worker-{seq}", shared.name);
    let worker_shared = Arc::clone(shared);

    state.workers += 1;
    state.largest_workers = state.largest_workers.max(state.workers);

    match thread::Builder::new()
        .name(thread_name.clone())
        .spawn(move || run_worker(&worker_shared, first))
    {
        Ok(_) => {
            debug!(pool = %shared.name, worker = %thread_name, workers = state.workers, "worker started");
            Ok(())
        }
        Err(source) => {
            state.workers -= 1;
            error!(pool = %shared.name, worker = %thread_name, error = %source, "failed to spawn worker");
            Err(EngineError::PoolSpawn {
                operation: shared.name.clone(),
                source,
            })
        }
    }
}

fn run_worker(shared: &Shared, first: Option<Job>) {
    let mut next = first;
    while let Some(job) = next.take().or_else(|| next_job(shared)) {
        if panic::catch_unwind(AssertUnwindSafe(job)).is_err() {
            warn!(pool = %shared.name, "job panicked; worker continues");
        }
        shared.completed.fetch_add(1, Ordering::Relaxed);
    }
    debug!(
        pool = %shared.name,
        worker = thread::current().name().unwrap_or("unnamed"),
        "worker exiting"
    );
}

/// Blocks for the next queued job. `None` means this worker must exit; the
/// worker count has already been decremented.
fn next_job(shared: &Shared) -> Option<Job> {
    let mut state = shared.state.lock();
    loop {
        if let Some(job) = state.queue.pop_front() {
            shared.space_available.notify_one();
            return Some(job);
        }
        if state.shutdown {
            return retire(shared, &mut state);
        }

        let may_time_out = shared.allow_core_timeout || state.workers > shared.core;
        if !may_time_out {
            shared.work_available.wait(&mut state);
            continue;
        }

        let timed_out = shared
            .work_available
            .wait_for(&mut state, shared.keep_alive)
            .timed_out();
        let still_eligible = shared.allow_core_timeout || state.workers > shared.core;
        if timed_out && state.queue.is_empty() && !state.shutdown && still_eligible {
            return retire(shared, &mut state);
        }
    }
}

fn retire(shared: &Shared, state: &mut State) -> Option<Job> {
    state.workers -= 1;
    if state.workers == 0 && state.shutdown {
        shared.terminated.notify_all();
    }
    None
}

#[cfg(test)]
mod tests {
    use std::sync::Barrier;

    use super::*;
    use crate::join::CountDownLatch;

    fn spec(core: usize, maximum: usize, queue: usize) -> PoolSpec {
        PoolSpec::new(core, maximum, queue)
    }

    #[test]
    fn starts_no_threads_until_first_submission() {
        let pool = WorkerPool::new("idle", &spec(2, 4, 4));
        let stats = pool.stats();
        assert_eq!(stats.workers, 0);
        assert_eq!(stats.queued, 0);
    }

    #[test]
    fn runs_submitted_jobs() {
        let pool = WorkerPool::new("runs", &spec(2, 2, 8));
        let latch = Arc::new(CountDownLatch::new(5));
        for _ in 0..5 {
            let latch = Arc::clone(&latch);
            pool.execute(Box::new(move || latch.count_down())).unwrap();
        }
        assert!(latch.wait_timeout(Duration::from_secs(5)));
    }

    #[test]
    fn saturated_pool_blocks_instead_of_rejecting() {
        let pool = Arc::new(WorkerPool::new("saturated", &spec(1, 2, 2)));
        let gate = Arc::new(Barrier::new(3));
        let done = Arc::new(CountDownLatch::new(10));

        // Both gated jobs end up running, one per worker.
        for _ in 0..2 {
            let gate = Arc::clone(&gate);
            let done = Arc::clone(&done);
            pool.execute(Box::new(move || {
                gate.wait();
                done.count_down();
            }))
            .unwrap();
        }

        // Fill the queue; the submitter must block once both workers are busy.
        let submitter = {
            let pool = Arc::clone(&pool);
            let done = Arc::clone(&done);
            thread::spawn(move || {
                for _ in 0..8 {
                    let done = Arc::clone(&done);
                    pool.execute(Box::new(move || done.count_down())).unwrap();
                }
            })
        };

        thread::sleep(Duration::from_millis(100));
        let stats = pool.stats();
        assert_eq!(stats.workers, 2);
        assert_eq!(stats.queued, 2);
        assert!(!submitter.is_finished());

        gate.wait();
        submitter.join().unwrap();
        assert!(done.wait_timeout(Duration::from_secs(5)));
        assert!(pool.stats().largest_workers <= 2);
    }

    #[test]
    fn zero_core_pool_still_drains_queue() {
        let pool = WorkerPool::new("zero-core", &spec(0, 1, 4));
        let latch = Arc::new(CountDownLatch::new(3));
        for _ in 0..3 {
            let latch = Arc::clone(&latch);
            pool.execute(Box::new(move || latch.count_down())).unwrap();
        }
        assert!(latch.wait_timeout(Duration::from_secs(5)));
    }

    #[test]
    fn idle_workers_above_core_time_out() {
        let pool = WorkerPool::new("keep-alive", &spec(1, 3, 1).with_keep_alive(Duration::ZERO));
        let latch = Arc::new(CountDownLatch::new(4));
        // 1 core worker, 1 queued job, then 2 extra workers.
        for _ in 0..4 {
            let latch = Arc::clone(&latch);
            pool.execute(Box::new(move || {
                thread::sleep(Duration::from_millis(50));
                latch.count_down();
            }))
            .unwrap();
        }
        assert!(latch.wait_timeout(Duration::from_secs(5)));
        assert_eq!(pool.stats().largest_workers, 3);

        let deadline = Instant::now() + Duration::from_secs(5);
        while pool.stats().workers > 1 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(pool.stats().workers, 1);
    }

    #[test]
    fn core_workers_time_out_when_allowed() {
        let spec = spec(2, 2, 4)
            .with_keep_alive(Duration::ZERO)
            .with_core_thread_timeout(true);
        let pool = WorkerPool::new("core-timeout", &spec);
        let latch = Arc::new(CountDownLatch::new(2));
        for _ in 0..2 {
            let latch = Arc::clone(&latch);
            pool.execute(Box::new(move || latch.count_down())).unwrap();
        }
        assert!(latch.wait_timeout(Duration::from_secs(5)));

        let deadline = Instant::now() + Duration::from_secs(5);
        while pool.stats().workers > 0 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(pool.stats().workers, 0);

        // The pool restarts workers on demand.
        let again = Arc::new(CountDownLatch::new(1));
        {
            let again = Arc::clone(&again);
            pool.execute(Box::new(move || again.count_down())).unwrap();
        }
        assert!(again.wait_timeout(Duration::from_secs(5)));
    }

    #[test]
    fn panicking_job_does_not_kill_accounting() {
        let pool = WorkerPool::new("panics", &spec(1, 1, 4));
        pool.execute(Box::new(|| panic!("job failure"))).unwrap();
        let latch = Arc::new(CountDownLatch::new(1));
        {
            let latch = Arc::clone(&latch);
            pool.execute(Box::new(move || latch.count_down())).unwrap();
        }
        assert!(latch.wait_timeout(Duration::from_secs(5)));
        assert_eq!(pool.stats().workers, 1);
    }

    #[test]
    fn shutdown_drains_queue_then_rejects() {
        let pool = WorkerPool::new("shutdown", &spec(1, 1, 8));
        let latch = Arc::new(CountDownLatch::new(4));
        for _ in 0..4 {
            let latch = Arc::clone(&latch);
            pool.execute(Box::new(move || {
                thread::sleep(Duration::from_millis(5));
                latch.count_down();
            }))
            .unwrap();
        }
        pool.shutdown();
        assert!(latch.wait_timeout(Duration::from_secs(5)));
        assert!(pool.await_termination(Duration::from_secs(5)));

        let err = pool.execute(Box::new(|| {})).unwrap_err();
        assert!(matches!(err, EngineError::PoolShutDown { .. }));
        assert!(pool.stats().shut_down);
    }

    #[test]
    fn shutdown_wakes_blocked_submitter() {
        let pool = Arc::new(WorkerPool::new("wake", &spec(1, 1, 1)));
        let gate = Arc::new(Barrier::new(2));
        {
            let gate = Arc::clone(&gate);
            pool.execute(Box::new(move || {
                gate.wait();
            }))
            .unwrap();
        }
        pool.execute(Box::new(|| {})).unwrap();

        let blocked = {
            let pool = Arc::clone(&pool);
            thread::spawn(move || pool.execute(Box::new(|| {})))
        };
        thread::sleep(Duration::from_millis(50));
        pool.shutdown();
        let outcome = blocked.join().unwrap();
        assert!(matches!(outcome, Err(EngineError::PoolShutDown { .. })));

        gate.wait();
        assert!(pool.await_termination(Duration::from_secs(5)));
    }

    #[test]
    fn worker_threads_are_named_after_pool() {
        let pool = WorkerPool::new("operation2", &spec(1, 1, 1));
        let name = Arc::new(Mutex::new(None));
        let latch = Arc::new(CountDownLatch::new(1));
        {
            let name = Arc::clone(&name);
            let latch = Arc::clone(&latch);
            pool.execute(Box::new(move || {
                *name.lock() = thread::current().name().map(str::to_string);
                latch.count_down();
            }))
            .unwrap();
        }
        assert!(latch.wait_timeout(Duration::from_secs(5)));
        assert_eq!(name.lock().as_deref(), Some("operation2-worker-1"));
    }
}
