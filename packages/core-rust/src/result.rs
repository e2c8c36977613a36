//! Outcome of a single sub-operation.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::Value;

/// Reason stored when a caller marks a result as failed with an empty reason.
pub const UNSPECIFIED_ERROR: &str = "unspecified error";

/// Status code of a [`TaskResult`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TaskStatus {
    Success,
    Error,
}

impl TaskStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Success => "success",
            TaskStatus::Error => "error",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result produced by a handler for one sub-operation.
///
/// A handler builds the result; the worker task that ran it stamps the
/// operation id afterwards. Once a result leaves the worker task:
/// - `status` is set,
/// - `Error` carries a non-empty `error_reason`,
/// - `Success` carries no `error_reason`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskResult {
    operation: Option<String>,
    status: Option<TaskStatus>,
    error_reason: Option<String>,
    result: Option<Value>,
}

impl TaskResult {
    /// Creates a result with no status. Handlers must call [`success`](Self::success)
    /// or [`error`](Self::error) before returning it.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Shorthand for `TaskResult::new().success().with_result(value)`.
    #[must_use]
    pub fn succeeded(value: impl Into<Value>) -> Self {
        Self::new().success().with_result(value)
    }

    /// Shorthand for `TaskResult::new().error(reason)`.
    #[must_use]
    pub fn failed(reason: impl Into<String>) -> Self {
        Self::new().error(reason)
    }

    /// Marks the result successful and clears any failure reason.
    #[must_use]
    pub fn success(mut self) -> Self {
        self.status = Some(TaskStatus::Success);
        self.error_reason = None;
        self
    }

    /// Marks the result failed with `reason`.
    #[must_use]
    pub fn error(mut self, reason: impl Into<String>) -> Self {
        let reason = reason.into();
        self.status = Some(TaskStatus::Error);
        self.error_reason = Some(if reason.trim().is_empty() {
            UNSPECIFIED_ERROR.to_string()
        } else {
            reason
        });
        self
    }

    /// Attaches the opaque result value.
    #[must_use]
    pub fn with_result(mut self, value: impl Into<Value>) -> Self {
        self.result = Some(value.into());
        self
    }

    /// Records the operation this result belongs to. Called by the worker task
    /// after the handler returns; any value set by a handler is overwritten.
    pub fn stamp(&mut self, operation: impl Into<String>) {
        self.operation = Some(operation.into());
    }

    #[must_use]
    pub fn operation(&self) -> Option<&str> {
        self.operation.as_deref()
    }

    #[must_use]
    pub fn status(&self) -> Option<TaskStatus> {
        self.status
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status == Some(TaskStatus::Success)
    }

    #[must_use]
    pub fn is_error(&self) -> bool {
        self.status == Some(TaskStatus::Error)
    }

    #[must_use]
    pub fn error_reason(&self) -> Option<&str> {
        self.error_reason.as_deref()
    }

    #[must_use]
    pub fn result(&self) -> Option<&Value> {
        self.result.as_ref()
    }

    #[must_use]
    pub fn into_result(self) -> Option<Value> {
        self.result
    }
}

impl fmt::Display for TaskResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "TaskResult[operation={}, status={}, errorReason={}, result={}]",
            self.operation.as_deref().unwrap_or("-"),
            self.status.map_or("unset", TaskStatus::as_str),
            self.error_reason.as_deref().unwrap_or("-"),
            self.result
                .as_ref()
                .map_or_else(|| "-".to_string(), ToString::to_string),
        )
    }
}
