//! `QuickQuarantine` Core: task inputs and results, pool specs, and operation catalog loading.

pub mod config;
pub mod error;
pub mod input;
pub mod result;
pub mod spec;
pub mod types;

pub use config::{OperationCatalog, Properties, DEFAULT_MANIFEST};
pub use error::ConfigError;
pub use input::{InputKind, InputPayload, TaskInput};
pub use result::{TaskResult, TaskStatus};
pub use spec::{PoolSpec, Route, RoutingTable};
pub use types::Value;
