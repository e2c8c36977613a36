use std::path::PathBuf;

/// Malformed or incomplete pool/routing configuration.
///
/// Fatal to the affected operation's setup and never retried.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("operation {operation}: missing configuration key `{key}`")]
    Missing { operation: String, key: &'static str },
    #[error("operation {operation}: `{key}` is not a valid integer: {value:?}")]
    InvalidNumber {
        operation: String,
        key: &'static str,
        value: String,
    },
    #[error("operation {operation}: maximumPoolSize must be greater than 0")]
    ZeroMaximum { operation: String },
    #[error("operation {operation}: corePoolSize {core} exceeds maximumPoolSize {maximum}")]
    CoreExceedsMaximum {
        operation: String,
        core: usize,
        maximum: usize,
    },
    #[error("operation {operation}: workQueueSize must be greater than 0")]
    ZeroQueue { operation: String },
    #[error(
        "operation {operation}: {handlers} handler ids but {sub_operations} sub-operation ids"
    )]
    RouteLengthMismatch {
        operation: String,
        handlers: usize,
        sub_operations: usize,
    },
    #[error("operation {operation}: sub-operation `{sub_operation}` is routed more than once")]
    DuplicateSubOperation {
        operation: String,
        sub_operation: String,
    },
    #[error("operation {operation}: empty sub-operation or handler id")]
    EmptyRouteId { operation: String },
    #[error("failed to read configuration file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid JSON operation catalog: {0}")]
    Json(#[from] serde_json::Error),
}

impl ConfigError {
    /// The operation the error refers to, if any.
    #[must_use]
    pub fn operation(&self) -> Option<&str> {
        match self {
            ConfigError::Missing { operation, .. }
            | ConfigError::InvalidNumber { operation, .. }
            | ConfigError::ZeroMaximum { operation }
            | ConfigError::CoreExceedsMaximum { operation, .. }
            | ConfigError::ZeroQueue { operation }
            | ConfigError::RouteLengthMismatch { operation, .. }
            | ConfigError::DuplicateSubOperation { operation, .. }
            | ConfigError::EmptyRouteId { operation } => Some(operation),
            ConfigError::Io { .. } | ConfigError::Json(_) => None,
        }
    }
}
