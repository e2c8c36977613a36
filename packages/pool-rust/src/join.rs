//! Fan-in primitives: a countdown latch, a shared results collection, and the
//! per-task [`Completion`] that ties them together.
//!
//! A `Completion` signals its latch exactly once: either explicitly through
//! [`Completion::complete`], or from `Drop` if the task never ran (rejected on
//! submission, dropped during unwinding). In the drop case an error result is
//! recorded so the batch still yields one result per task.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use quarantine_core::TaskResult;
use tracing::warn;

use crate::error::TaskFailure;

// ---------------------------------------------------------------------------
// CountDownLatch
// ---------------------------------------------------------------------------

/// Blocking countdown latch. The count is fixed at construction.
#[derive(Debug)]
pub struct CountDownLatch {
    count: Mutex<usize>,
    zero: Condvar,
}

impl CountDownLatch {
    #[must_use]
    pub fn new(count: usize) -> Self {
        Self {
            count: Mutex::new(count),
            zero: Condvar::new(),
        }
    }

    /// Decrements the count, waking all waiters when it reaches zero.
    /// Counting down a latch that is already at zero has no effect.
    pub fn count_down(&self) {
        let mut count = self.count.lock();
        if *count == 0 {
            return;
        }
        *count -= 1;
        if *count == 0 {
            self.zero.notify_all();
        }
    }

    #[must_use]
    pub fn count(&self) -> usize {
        *self.count.lock()
    }

    /// Blocks until the count reaches zero. No timeout.
    pub fn wait(&self) {
        let mut count = self.count.lock();
        while *count > 0 {
            self.zero.wait(&mut count);
        }
    }

    /// Blocks until the count reaches zero or `timeout` elapses.
    /// Returns `true` if the count reached zero.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut count = self.count.lock();
        while *count > 0 {
            if self.zero.wait_until(&mut count, deadline).timed_out() {
                return *count == 0;
            }
        }
        true
    }
}

// ---------------------------------------------------------------------------
// ResultSink
// ---------------------------------------------------------------------------

/// Append-on-completion results collection shared by the tasks of one batch.
#[derive(Debug, Clone, Default)]
pub struct ResultSink {
    results: Arc<Mutex<Vec<TaskResult>>>,
}

impl ResultSink {
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            results: Arc::new(Mutex::new(Vec::with_capacity(capacity))),
        }
    }

    pub fn push(&self, result: TaskResult) {
        self.results.lock().push(result);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.results.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.results.lock().is_empty()
    }

    /// Takes all collected results, in completion order.
    #[must_use]
    pub fn take(&self) -> Vec<TaskResult> {
        std::mem::take(&mut *self.results.lock())
    }
}

// ---------------------------------------------------------------------------
// Completion
// ---------------------------------------------------------------------------

/// One task's slot in a batch: stamps, stores, and signals exactly once.
#[derive(Debug)]
pub struct Completion {
    operation: String,
    sink: ResultSink,
    latch: Arc<CountDownLatch>,
    done: bool,
}

impl Completion {
    #[must_use]
    pub fn new(operation: impl Into<String>, sink: ResultSink, latch: Arc<CountDownLatch>) -> Self {
        Self {
            operation: operation.into(),
            sink,
            latch,
            done: false,
        }
    }

    #[must_use]
    pub fn operation(&self) -> &str {
        &self.operation
    }

    /// Stamps `result` with the operation id, appends it, then signals the latch.
    pub fn complete(mut self, result: TaskResult) {
        self.finish(result);
    }

    fn finish(&mut self, mut result: TaskResult) {
        result.stamp(self.operation.as_str());
        // Append before signalling: the waiter reads the sink once the latch opens.
        self.sink.push(result);
        self.done = true;
        self.latch.count_down();
    }
}

impl Drop for Completion {
    fn drop(&mut self) {
        if self.done {
            return;
        }
        warn!(operation = %self.operation, "task dropped before completing");
        let failure = TaskFailure::Abandoned {
            reason: "the pool dropped the task before it ran".to_string(),
        };
        self.finish(TaskResult::failed(failure.to_string()));
    }
}
