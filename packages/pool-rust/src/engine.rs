//! Fan-out/fan-in execution over operation pools.
//!
//! Every run submits N worker tasks to the parent operation's pool, blocks
//! the caller until all N have signalled their completion, and returns the N
//! results in completion order. Failures inside a task become error results;
//! only configuration and input-count problems abort a run, and they do so
//! before anything is submitted.

use std::sync::Arc;

use quarantine_core::{TaskInput, TaskResult};
use tracing::{debug, info, warn};

use crate::error::{EngineError, TaskFailure};
use crate::handler::HandlerRegistry;
use crate::join::{Completion, CountDownLatch, ResultSink};
use crate::registry::{PoolHandle, PoolRegistry};
use crate::task::{HandlerRef, WorkerTask};

/// One task of a batch, before it is bound to the batch's latch.
struct Planned {
    operation: String,
    handler: HandlerRef,
    input: TaskInput,
}

/// Runs sub-operations on their parent operation's pool and joins the results.
#[derive(Debug, Clone)]
pub struct FanOutEngine {
    pools: Arc<PoolRegistry>,
    handlers: Arc<HandlerRegistry>,
}

impl FanOutEngine {
    #[must_use]
    pub fn new(pools: Arc<PoolRegistry>, handlers: Arc<HandlerRegistry>) -> Self {
        Self { pools, handlers }
    }

    #[must_use]
    pub fn pools(&self) -> &PoolRegistry {
        &self.pools
    }

    #[must_use]
    pub fn handlers(&self) -> &HandlerRegistry {
        &self.handlers
    }

    /// Runs the listed sub-operations of `parent`, pairing the `i`-th
    /// sub-operation with `inputs[i]`. Extra inputs are ignored.
    ///
    /// A sub-operation missing from the parent's routing table yields an
    /// error result for that slot.
    ///
    /// # Errors
    ///
    /// [`EngineError::UnknownOperation`] or [`EngineError::Configuration`] if
    /// the parent's pool cannot be resolved, and
    /// [`EngineError::InsufficientInputs`] if there are fewer inputs than
    /// sub-operations.
    pub fn run_selected_sub_operations<S: AsRef<str>>(
        &self,
        sub_operations: &[S],
        parent: &str,
        inputs: Vec<TaskInput>,
    ) -> Result<Vec<TaskResult>, EngineError> {
        let handle = self.pools.resolve(parent)?;
        check_inputs(parent, sub_operations.len(), inputs.len())?;

        let routes = handle.routes();
        let planned = sub_operations
            .iter()
            .zip(inputs)
            .map(|(sub, input)| {
                let sub = sub.as_ref();
                Planned {
                    operation: sub.to_string(),
                    handler: route(routes.handler_for(sub), parent),
                    input,
                }
            })
            .collect();
        Ok(self.fan_out(&handle, planned))
    }

    /// Runs every sub-operation in `operation`'s routing table, pairing the
    /// `i`-th route (in table order) with `inputs[i]`.
    ///
    /// # Errors
    ///
    /// Same as [`run_selected_sub_operations`](Self::run_selected_sub_operations).
    pub fn run_all_sub_operations(
        &self,
        operation: &str,
        inputs: Vec<TaskInput>,
    ) -> Result<Vec<TaskResult>, EngineError> {
        let handle = self.pools.resolve(operation)?;
        check_inputs(operation, handle.routes().len(), inputs.len())?;

        let planned = handle
            .routes()
            .iter()
            .zip(inputs)
            .map(|(r, input)| Planned {
                operation: r.sub_operation.clone(),
                handler: HandlerRef::Routed(r.handler.clone()),
                input,
            })
            .collect();
        Ok(self.fan_out(&handle, planned))
    }

    /// Runs `handler` once on `parent`'s pool, bypassing the routing table.
    /// The result is stamped with `operation`.
    ///
    /// # Errors
    ///
    /// [`EngineError::UnknownOperation`] or [`EngineError::Configuration`] if
    /// the parent's pool cannot be resolved.
    pub fn run_single_operation(
        &self,
        operation: &str,
        handler: &str,
        parent: &str,
        input: TaskInput,
    ) -> Result<TaskResult, EngineError> {
        let handle = self.pools.resolve(parent)?;
        debug!(operation, handler, parent, "running ad-hoc operation on parent pool");

        let planned = vec![Planned {
            operation: operation.to_string(),
            handler: HandlerRef::Routed(handler.to_string()),
            input,
        }];
        let mut results = self.fan_out(&handle, planned);
        Ok(results.pop().unwrap_or_else(|| {
            let failure = TaskFailure::Abandoned {
                reason: "no result was recorded".to_string(),
            };
            let mut result = TaskResult::failed(failure.to_string());
            result.stamp(operation);
            result
        }))
    }

    /// Runs sub-operations of `parent` paired with their inputs by id rather
    /// than by position.
    ///
    /// # Errors
    ///
    /// [`EngineError::UnknownOperation`] or [`EngineError::Configuration`] if
    /// the parent's pool cannot be resolved.
    pub fn run_keyed_sub_operations(
        &self,
        parent: &str,
        inputs: Vec<(String, TaskInput)>,
    ) -> Result<Vec<TaskResult>, EngineError> {
        let handle = self.pools.resolve(parent)?;

        let routes = handle.routes();
        let planned = inputs
            .into_iter()
            .map(|(sub, input)| Planned {
                handler: route(routes.handler_for(&sub), parent),
                operation: sub,
                input,
            })
            .collect();
        Ok(self.fan_out(&handle, planned))
    }

    fn fan_out(&self, handle: &PoolHandle, planned: Vec<Planned>) -> Vec<TaskResult> {
        let tasks = planned.len();
        let latch = Arc::new(CountDownLatch::new(tasks));
        let sink = ResultSink::with_capacity(tasks);

        for Planned {
            operation,
            handler,
            input,
        } in planned
        {
            let completion = Completion::new(operation, sink.clone(), Arc::clone(&latch));
            let task = WorkerTask::new(handler, input, Arc::clone(&self.handlers), completion);
            // On failure the job is dropped and its completion records an error result.
            if let Err(err) = handle.pool().execute(task.into_job()) {
                warn!(operation = handle.operation(), error = %err, "task submission failed");
            }
        }

        latch.wait();
        let results = sink.take();
        let succeeded = results.iter().filter(|r| r.is_success()).count();
        info!(
            operation = handle.operation(),
            tasks,
            succeeded,
            failed = results.len() - succeeded,
            "fan-in complete"
        );
        results
    }
}

fn check_inputs(operation: &str, required: usize, supplied: usize) -> Result<(), EngineError> {
    if supplied < required {
        return Err(EngineError::InsufficientInputs {
            operation: operation.to_string(),
            required,
            supplied,
        });
    }
    Ok(())
}

fn route(handler: Option<&str>, parent: &str) -> HandlerRef {
    match handler {
        Some(id) => HandlerRef::Routed(id.to_string()),
        None => HandlerRef::Unrouted {
            parent: parent.to_string(),
        },
    }
}
