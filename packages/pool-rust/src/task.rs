//! The unit executed by a pool worker.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use quarantine_core::{TaskInput, TaskResult};
use tracing::{debug, info_span, warn};

use crate::error::TaskFailure;
use crate::handler::HandlerRegistry;
use crate::join::Completion;
use crate::pool::Job;

/// Where a worker task finds its handler.
#[derive(Debug, Clone)]
pub enum HandlerRef {
    /// Resolved from the parent's routing table.
    Routed(String),
    /// The sub-operation had no route in the parent's routing table.
    Unrouted { parent: String },
}

/// Runs one handler invocation and records exactly one [`TaskResult`].
///
/// Failures never escape `run`: handler errors, panics, empty results and
/// results without a status all become error results in the batch.
pub struct WorkerTask {
    handler: HandlerRef,
    input: TaskInput,
    handlers: Arc<HandlerRegistry>,
    completion: Completion,
}

impl WorkerTask {
    #[must_use]
    pub fn new(
        handler: HandlerRef,
        input: TaskInput,
        handlers: Arc<HandlerRegistry>,
        completion: Completion,
    ) -> Self {
        Self {
            handler,
            input,
            handlers,
            completion,
        }
    }

    pub fn run(self) {
        let Self {
            handler,
            input,
            handlers,
            completion,
        } = self;

        let operation = completion.operation().to_string();
        let handler_label = match &handler {
            HandlerRef::Routed(id) => id.as_str(),
            HandlerRef::Unrouted { .. } => "-",
        };
        let span = info_span!("worker_task", operation = %operation, handler = handler_label);
        let _entered = span.enter();

        debug!(input = %input, "task started");
        let result = match invoke(&operation, &handler, &input, &handlers) {
            Ok(result) => {
                debug!(status = ?result.status(), "task finished");
                result
            }
            Err(failure) => {
                warn!(error = %failure, "task failed");
                TaskResult::failed(failure.to_string())
            }
        };
        completion.complete(result);
    }

    /// Boxes the task for submission to a [`WorkerPool`](crate::pool::WorkerPool).
    #[must_use]
    pub fn into_job(self) -> Job {
        Box::new(move || self.run())
    }
}

fn invoke(
    operation: &str,
    handler: &HandlerRef,
    input: &TaskInput,
    handlers: &HandlerRegistry,
) -> Result<TaskResult, TaskFailure> {
    let id = match handler {
        HandlerRef::Routed(id) => id,
        HandlerRef::Unrouted { parent } => {
            return Err(TaskFailure::UnroutedSubOperation {
                sub_operation: operation.to_string(),
                parent: parent.clone(),
            })
        }
    };
    let resolved = handlers
        .resolve(id)
        .ok_or_else(|| TaskFailure::UnknownHandler { handler: id.clone() })?;

    let output = panic::catch_unwind(AssertUnwindSafe(|| resolved.call(input))).map_err(|payload| {
        TaskFailure::HandlerPanicked {
            handler: id.clone(),
            message: panic_message(payload.as_ref()),
        }
    })?;

    match output {
        Err(err) => Err(TaskFailure::HandlerFailed {
            handler: id.clone(),
            message: format!("{err:#}"),
        }),
        Ok(None) => Err(TaskFailure::EmptyResult { handler: id.clone() }),
        Ok(Some(result)) if result.status().is_none() => {
            Err(TaskFailure::MissingStatus { handler: id.clone() })
        }
        Ok(Some(result)) => Ok(result),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use quarantine_core::Value;

    use super::*;
    use crate::handler::HandlerOutput;
    use crate::join::{CountDownLatch, ResultSink};

    fn run_one(handlers: HandlerRegistry, handler: HandlerRef) -> TaskResult {
        let sink = ResultSink::default();
        let latch = Arc::new(CountDownLatch::new(1));
        let completion = Completion::new("op_sub", sink.clone(), Arc::clone(&latch));
        WorkerTask::new(handler, TaskInput::single(1), Arc::new(handlers), completion).run();
        assert_eq!(latch.count(), 0);
        let mut results = sink.take();
        assert_eq!(results.len(), 1);
        results.remove(0)
    }

    fn routed(id: &str) -> HandlerRef {
        HandlerRef::Routed(id.to_string())
    }

    #[test]
    fn success_is_stamped() {
        let handlers = HandlerRegistry::new();
        handlers.register_fn("H.ok", |_: &TaskInput| TaskResult::succeeded("done"));
        let result = run_one(handlers, routed("H.ok"));
        assert!(result.is_success());
        assert_eq!(result.operation(), Some("op_sub"));
        assert_eq!(result.result(), Some(&Value::from("done")));
    }

    #[test]
    fn handler_error_result_passes_through() {
        let handlers = HandlerRegistry::new();
        handlers.register_fn("H.err", |_: &TaskInput| TaskResult::failed("timeout"));
        let result = run_one(handlers, routed("H.err"));
        assert!(result.is_error());
        assert_eq!(result.error_reason(), Some("timeout"));
    }

    #[test]
    fn empty_result_becomes_error() {
        let handlers = HandlerRegistry::new();
        handlers.register("H.none", |_: &TaskInput| -> HandlerOutput { Ok(None) });
        let result = run_one(handlers, routed("H.none"));
        assert!(result.is_error());
        assert!(result.error_reason().unwrap().contains("empty result"));
        assert_eq!(result.operation(), Some("op_sub"));
    }

    #[test]
    fn missing_status_becomes_error() {
        let handlers = HandlerRegistry::new();
        handlers.register_fn("H.unset", |_: &TaskInput| TaskResult::new().with_result(1));
        let result = run_one(handlers, routed("H.unset"));
        assert!(result.is_error());
        assert!(result.error_reason().unwrap().contains("missing result code"));
    }

    #[test]
    fn raised_error_becomes_error_result() {
        let handlers = HandlerRegistry::new();
        handlers.register("H.raise", |_: &TaskInput| -> HandlerOutput {
            Err(anyhow::anyhow!("connection refused").context("calling backend"))
        });
        let result = run_one(handlers, routed("H.raise"));
        assert!(result.is_error());
        let reason = result.error_reason().unwrap();
        assert!(reason.contains("calling backend"));
        assert!(reason.contains("connection refused"));
    }

    #[test]
    fn panic_becomes_error_result() {
        let handlers = HandlerRegistry::new();
        handlers.register_fn("H.panic", |input: &TaskInput| {
            let list = input.as_list().expect("list input");
            TaskResult::succeeded(list.len() as i64)
        });
        let result = run_one(handlers, routed("H.panic"));
        assert!(result.is_error());
        assert!(result.error_reason().unwrap().contains("list input"));
    }

    #[test]
    fn unknown_handler_becomes_error_result() {
        let result = run_one(HandlerRegistry::new(), routed("Missing.handler"));
        assert!(result.is_error());
        assert!(result.error_reason().unwrap().contains("Missing.handler"));
    }

    #[test]
    fn unrouted_sub_operation_becomes_error_result() {
        let result = run_one(
            HandlerRegistry::new(),
            HandlerRef::Unrouted {
                parent: "operation2".to_string(),
            },
        );
        assert!(result.is_error());
        assert!(result.error_reason().unwrap().contains("no route"));
    }
}
