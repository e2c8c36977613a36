//! Per-operation pool configuration and the sub-operation routing table.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Default idle-worker timeout when a spec is built in code.
pub const DEFAULT_KEEP_ALIVE_SECS: u64 = 60;

/// Sizing and routing configuration for one operation's worker pool.
///
/// Immutable once a pool has been built from it: the registry keeps its own
/// copy and never hands out a mutable reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolSpec {
    /// Upper bound on live worker threads. Must be greater than 0.
    pub maximum_pool_size: usize,
    /// Workers kept alive while idle (unless `allow_core_thread_timeout`).
    pub core_pool_size: usize,
    /// Capacity of the bounded task queue. Must be greater than 0.
    pub work_queue_size: usize,
    /// Idle time after which a worker above the core count exits, in whole seconds.
    #[serde(rename = "keepAliveTimeSeconds")]
    pub keep_alive_secs: u64,
    /// Whether core workers may also exit after `keep_alive_secs` idle.
    pub allow_core_thread_timeout: bool,
    /// Handler ids, index-aligned with `sub_operation_ids`.
    pub sub_operation_handler_ids: Vec<String>,
    /// Sub-operation ids, index-aligned with `sub_operation_handler_ids`.
    pub sub_operation_ids: Vec<String>,
}

impl PoolSpec {
    /// Creates a spec with the given bounds, the default keep-alive and no routes.
    #[must_use]
    pub fn new(core_pool_size: usize, maximum_pool_size: usize, work_queue_size: usize) -> Self {
        Self {
            maximum_pool_size,
            core_pool_size,
            work_queue_size,
            keep_alive_secs: DEFAULT_KEEP_ALIVE_SECS,
            allow_core_thread_timeout: false,
            sub_operation_handler_ids: Vec::new(),
            sub_operation_ids: Vec::new(),
        }
    }

    /// Sets the idle timeout. The configuration unit is whole seconds, so a
    /// fractional duration is rounded up: a non-zero timeout never becomes zero.
    #[must_use]
    pub fn with_keep_alive(mut self, keep_alive: Duration) -> Self {
        self.keep_alive_secs = keep_alive.as_secs() + u64::from(keep_alive.subsec_nanos() > 0);
        self
    }

    #[must_use]
    pub fn with_core_thread_timeout(mut self, allow: bool) -> Self {
        self.allow_core_thread_timeout = allow;
        self
    }

    /// Appends a `sub_operation -> handler` route.
    #[must_use]
    pub fn with_route(mut self, sub_operation: impl Into<String>, handler: impl Into<String>) -> Self {
        self.sub_operation_ids.push(sub_operation.into());
        self.sub_operation_handler_ids.push(handler.into());
        self
    }

    #[must_use]
    pub fn keep_alive(&self) -> Duration {
        Duration::from_secs(self.keep_alive_secs)
    }

    /// Checks the worker bounds and the routing lists.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError`] found: a zero maximum, a core count
    /// above the maximum, a zero queue, or an invalid routing table.
    pub fn validate(&self, operation: &str) -> Result<(), ConfigError> {
        if self.maximum_pool_size == 0 {
            return Err(ConfigError::ZeroMaximum {
                operation: operation.to_string(),
            });
        }
        if self.core_pool_size > self.maximum_pool_size {
            return Err(ConfigError::CoreExceedsMaximum {
                operation: operation.to_string(),
                core: self.core_pool_size,
                maximum: self.maximum_pool_size,
            });
        }
        if self.work_queue_size == 0 {
            return Err(ConfigError::ZeroQueue {
                operation: operation.to_string(),
            });
        }
        self.routing_table(operation).map(|_| ())
    }

    /// Zips the two routing lists into a [`RoutingTable`].
    ///
    /// # Errors
    ///
    /// Fails when the lists differ in length, contain an empty id, or route
    /// the same sub-operation twice.
    pub fn routing_table(&self, operation: &str) -> Result<RoutingTable, ConfigError> {
        if self.sub_operation_ids.len() != self.sub_operation_handler_ids.len() {
            return Err(ConfigError::RouteLengthMismatch {
                operation: operation.to_string(),
                handlers: self.sub_operation_handler_ids.len(),
                sub_operations: self.sub_operation_ids.len(),
            });
        }

        let mut table = RoutingTable::default();
        for (sub_operation, handler) in self
            .sub_operation_ids
            .iter()
            .zip(&self.sub_operation_handler_ids)
        {
            if sub_operation.is_empty() || handler.is_empty() {
                return Err(ConfigError::EmptyRouteId {
                    operation: operation.to_string(),
                });
            }
            if table.index.contains_key(sub_operation) {
                return Err(ConfigError::DuplicateSubOperation {
                    operation: operation.to_string(),
                    sub_operation: sub_operation.clone(),
                });
            }
            table.index.insert(sub_operation.clone(), table.routes.len());
            table.routes.push(Route {
                sub_operation: sub_operation.clone(),
                handler: handler.clone(),
            });
        }
        Ok(table)
    }
}

/// One `sub-operation -> handler` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub sub_operation: String,
    pub handler: String,
}

/// Resolved routing table of an operation.
///
/// Iteration follows configuration order and is stable for a given table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoutingTable {
    routes: Vec<Route>,
    index: HashMap<String, usize>,
}

impl RoutingTable {
    /// Handler id routed for `sub_operation`.
    #[must_use]
    pub fn handler_for(&self, sub_operation: &str) -> Option<&str> {
        self.index
            .get(sub_operation)
            .map(|&i| self.routes[i].handler.as_str())
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Route> {
        self.routes.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

impl<'a> IntoIterator for &'a RoutingTable {
    type Item = &'a Route;
    type IntoIter = std::slice::Iter<'a, Route>;

    fn into_iter(self) -> Self::IntoIter {
        self.routes.iter()
    }
}
