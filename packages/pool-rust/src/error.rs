//! Engine error taxonomy.
//!
//! [`EngineError`] aborts a whole batch before any task is submitted.
//! [`TaskFailure`] never leaves the engine: it is rendered into the
//! `error_reason` of an error [`TaskResult`](quarantine_core::TaskResult).

use quarantine_core::ConfigError;

/// Errors returned to callers of the fan-out/fan-in operations.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("unknown operation: {operation}")]
    UnknownOperation { operation: String },
    #[error(transparent)]
    Configuration(#[from] ConfigError),
    #[error("operation {operation}: {required} inputs required, {supplied} supplied")]
    InsufficientInputs {
        operation: String,
        required: usize,
        supplied: usize,
    },
    #[error("operation {operation}: failed to spawn worker thread: {source}")]
    PoolSpawn {
        operation: String,
        #[source]
        source: std::io::Error,
    },
    #[error("operation {operation}: pool has been shut down")]
    PoolShutDown { operation: String },
}

/// Why a single task produced an error result.
#[derive(Debug, thiserror::Error)]
pub enum TaskFailure {
    #[error("sub-operation `{sub_operation}` has no route in operation `{parent}`")]
    UnroutedSubOperation {
        sub_operation: String,
        parent: String,
    },
    #[error("handler `{handler}` is not registered")]
    UnknownHandler { handler: String },
    #[error("handler `{handler}` failed: {message}")]
    HandlerFailed { handler: String, message: String },
    #[error("handler `{handler}` panicked: {message}")]
    HandlerPanicked { handler: String, message: String },
    #[error("handler `{handler}` returned an empty result")]
    EmptyResult { handler: String },
    #[error("handler `{handler}` returned a result with a missing result code")]
    MissingStatus { handler: String },
    #[error("task abandoned before execution: {reason}")]
    Abandoned { reason: String },
}
