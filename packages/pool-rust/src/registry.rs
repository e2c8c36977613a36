//! Operation-scoped pool registry.
//!
//! Maps operation ids to lazily created, long-lived [`WorkerPool`]s and their
//! routing tables. The only synchronization on the registry's own storage is
//! the DashMap shard lock taken while a pool is first inserted; once a pool
//! exists, callers use it through a cloned [`PoolHandle`] without touching
//! the registry again.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use quarantine_core::{ConfigError, OperationCatalog, PoolSpec, RoutingTable};
use tracing::{debug, info, warn};

use crate::error::EngineError;
use crate::pool::{PoolStats, WorkerPool};

// ---------------------------------------------------------------------------
// PoolHandle
// ---------------------------------------------------------------------------

struct OperationPool {
    operation: String,
    spec: PoolSpec,
    routes: RoutingTable,
    pool: WorkerPool,
}

/// Shared reference to one operation's pool and routing table.
///
/// Cloning a handle is cheap; every clone refers to the same pool.
#[derive(Clone)]
pub struct PoolHandle {
    inner: Arc<OperationPool>,
}

impl PoolHandle {
    #[must_use]
    pub fn operation(&self) -> &str {
        &self.inner.operation
    }

    /// The spec the pool was built from (the first writer's).
    #[must_use]
    pub fn spec(&self) -> &PoolSpec {
        &self.inner.spec
    }

    #[must_use]
    pub fn routes(&self) -> &RoutingTable {
        &self.inner.routes
    }

    #[must_use]
    pub fn pool(&self) -> &WorkerPool {
        &self.inner.pool
    }

    #[must_use]
    pub fn stats(&self) -> PoolStats {
        self.inner.pool.stats()
    }

    /// Whether two handles refer to the same pool instance.
    #[must_use]
    pub fn same_pool(&self, other: &PoolHandle) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl std::fmt::Debug for PoolHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoolHandle")
            .field("operation", &self.inner.operation)
            .field("routes", &self.inner.routes.len())
            .field("pool", &self.inner.pool)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// PoolRegistry
// ---------------------------------------------------------------------------

/// Owns every operation pool in the process.
///
/// Created once at startup and passed by reference (usually inside an `Arc`)
/// to whoever needs to run operations. Pools are never torn down implicitly;
/// [`shutdown_all`](Self::shutdown_all) is the only teardown path.
pub struct PoolRegistry {
    /// Known configuration, keyed by operation id.
    specs: DashMap<String, PoolSpec>,
    /// Pools created so far, keyed by operation id.
    pools: DashMap<String, PoolHandle>,
    pools_created: AtomicUsize,
}

impl PoolRegistry {
    /// Creates a registry with no known operations.
    #[must_use]
    pub fn new() -> Self {
        Self {
            specs: DashMap::new(),
            pools: DashMap::new(),
            pools_created: AtomicUsize::new(0),
        }
    }

    /// Creates a registry that knows every operation in `catalog`.
    #[must_use]
    pub fn with_catalog(catalog: OperationCatalog) -> Self {
        let registry = Self::new();
        for (operation, spec) in catalog {
            registry.specs.insert(operation, spec);
        }
        registry
    }

    /// Registers (or replaces) the spec used by [`resolve`](Self::resolve).
    ///
    /// Replacing a spec has no effect on a pool that already exists.
    ///
    /// # Errors
    ///
    /// Returns the validation error; the registry is left unchanged.
    pub fn register_spec(&self, operation: impl Into<String>, spec: PoolSpec) -> Result<(), ConfigError> {
        let operation = operation.into();
        spec.validate(&operation)?;
        if self.pools.contains_key(&operation) {
            debug!(operation = %operation, "spec registered after pool creation; existing pool unchanged");
        }
        self.specs.insert(operation, spec);
        Ok(())
    }

    /// Returns the pool for `operation`, building it from `spec` on first use.
    ///
    /// Later callers get the identical pool regardless of the `spec` they
    /// pass (first writer wins).
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Configuration`] if `spec` is invalid and no pool
    /// exists yet for `operation`.
    pub fn acquire(&self, operation: &str, spec: &PoolSpec) -> Result<PoolHandle, EngineError> {
        if let Some(existing) = self.pools.get(operation) {
            return Ok(existing.value().clone());
        }

        let entry = self
            .pools
            .entry(operation.to_string())
            .or_try_insert_with(|| self.build(operation, spec))?;
        Ok(entry.value().clone())
    }

    /// Returns the pool for `operation` using its registered spec.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::UnknownOperation`] if no pool exists and no
    /// spec was registered for `operation`.
    pub fn resolve(&self, operation: &str) -> Result<PoolHandle, EngineError> {
        if let Some(existing) = self.pools.get(operation) {
            return Ok(existing.value().clone());
        }

        let spec = self
            .specs
            .get(operation)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| EngineError::UnknownOperation {
                operation: operation.to_string(),
            })?;
        self.acquire(operation, &spec)
    }

    fn build(&self, operation: &str, spec: &PoolSpec) -> Result<PoolHandle, EngineError> {
        spec.validate(operation)?;
        let routes = spec.routing_table(operation)?;
        let pool = WorkerPool::new(operation, spec);
        self.pools_created.fetch_add(1, Ordering::Relaxed);
        info!(
            operation,
            core = spec.core_pool_size,
            maximum = spec.maximum_pool_size,
            queue = spec.work_queue_size,
            keep_alive_secs = spec.keep_alive_secs,
            routes = routes.len(),
            "operation pool created"
        );
        Ok(PoolHandle {
            inner: Arc::new(OperationPool {
                operation: operation.to_string(),
                spec: spec.clone(),
                routes,
                pool,
            }),
        })
    }

    /// Number of pools constructed over the registry's lifetime.
    #[must_use]
    pub fn pools_created(&self) -> usize {
        self.pools_created.load(Ordering::Relaxed)
    }

    /// Whether a pool exists for `operation`.
    #[must_use]
    pub fn contains(&self, operation: &str) -> bool {
        self.pools.contains_key(operation)
    }

    /// Operation ids with a known spec or an existing pool, sorted.
    #[must_use]
    pub fn operations(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.specs.iter().map(|e| e.key().clone()).collect();
        for entry in &self.pools {
            if !self.specs.contains_key(entry.key()) {
                ids.push(entry.key().clone());
            }
        }
        ids.sort();
        ids
    }

    /// Shuts down every pool and waits up to `timeout` for their workers to exit.
    ///
    /// Returns `true` if all pools terminated in time. Pools stay registered
    /// after shutdown, so later submissions produce abandoned-task results
    /// instead of building a fresh pool.
    pub fn shutdown_all(&self, timeout: Duration) -> bool {
        let handles: Vec<PoolHandle> = self.pools.iter().map(|e| e.value().clone()).collect();
        for handle in &handles {
            handle.pool().shutdown();
        }

        let deadline = Instant::now() + timeout;
        let mut terminated = true;
        for handle in &handles {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if !handle.pool().await_termination(remaining) {
                warn!(operation = handle.operation(), "pool did not terminate in time");
                terminated = false;
            }
        }
        info!(pools = handles.len(), terminated, "operation pools shut down");
        terminated
    }
}

impl Default for PoolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for PoolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoolRegistry")
            .field("operations", &self.operations())
            .field("pools_created", &self.pools_created())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Barrier;
    use std::thread;

    use super::*;

    fn operation2_spec() -> PoolSpec {
        PoolSpec::new(1, 2, 4)
            .with_route("operation2_sub1", "Operation1.sub1")
            .with_route("operation2_sub2", "Operation1.sub2")
    }

    #[test]
    fn concurrent_acquire_creates_one_pool() {
        let registry = PoolRegistry::new();
        let spec = operation2_spec();
        let barrier = Barrier::new(16);

        let handles: Vec<PoolHandle> = thread::scope(|s| {
            let workers: Vec<_> = (0..16)
                .map(|_| {
                    s.spawn(|| {
                        barrier.wait();
                        registry.acquire("operation2", &spec).unwrap()
                    })
                })
                .collect();
            workers.into_iter().map(|w| w.join().unwrap()).collect()
        });

        assert_eq!(registry.pools_created(), 1);
        assert!(handles.windows(2).all(|w| w[0].same_pool(&w[1])));
    }

    #[test]
    fn first_writer_wins() {
        let registry = PoolRegistry::new();
        let first = registry.acquire("op", &PoolSpec::new(1, 2, 4)).unwrap();
        let second = registry.acquire("op", &PoolSpec::new(5, 10, 100)).unwrap();

        assert!(first.same_pool(&second));
        assert_eq!(second.spec().maximum_pool_size, 2);
        assert_eq!(registry.pools_created(), 1);
    }

    #[test]
    fn handle_carries_routes_in_order() {
        let registry = PoolRegistry::new();
        let handle = registry.acquire("operation2", &operation2_spec()).unwrap();

        let subs: Vec<&str> = handle.routes().iter().map(|r| r.sub_operation.as_str()).collect();
        assert_eq!(subs, ["operation2_sub1", "operation2_sub2"]);
        assert_eq!(handle.routes().handler_for("operation2_sub2"), Some("Operation1.sub2"));
        assert_eq!(handle.operation(), "operation2");
    }

    #[test]
    fn resolve_unknown_operation_fails_without_creating() {
        let registry = PoolRegistry::new();
        let err = registry.resolve("nope").unwrap_err();
        assert!(matches!(err, EngineError::UnknownOperation { ref operation } if operation == "nope"));
        assert_eq!(registry.pools_created(), 0);
        assert!(!registry.contains("nope"));
    }

    #[test]
    fn resolve_uses_catalog_spec() {
        let mut catalog = OperationCatalog::new();
        catalog.insert("operation2", operation2_spec()).unwrap();
        let registry = PoolRegistry::with_catalog(catalog);

        assert!(!registry.contains("operation2"));
        let handle = registry.resolve("operation2").unwrap();
        assert_eq!(handle.routes().len(), 2);
        assert!(registry.contains("operation2"));
        assert!(registry.resolve("operation2").unwrap().same_pool(&handle));
        assert_eq!(registry.pools_created(), 1);
    }

    #[test]
    fn mismatched_route_lists_fail_acquire() {
        let registry = PoolRegistry::new();
        let mut spec = operation2_spec();
        spec.sub_operation_handler_ids.pop();

        let err = registry.acquire("operation2", &spec).unwrap_err();
        assert!(matches!(
            err,
            EngineError::Configuration(ConfigError::RouteLengthMismatch { .. })
        ));
        assert!(!registry.contains("operation2"));
        assert_eq!(registry.pools_created(), 0);
    }

    #[test]
    fn register_spec_rejects_invalid_bounds() {
        let registry = PoolRegistry::new();
        let err = registry.register_spec("op", PoolSpec::new(3, 2, 1)).unwrap_err();
        assert!(matches!(err, ConfigError::CoreExceedsMaximum { .. }));
        assert!(registry.operations().is_empty());
    }

    #[test]
    fn operations_lists_specs_and_pools() {
        let registry = PoolRegistry::new();
        registry.register_spec("b", PoolSpec::new(0, 1, 1)).unwrap();
        registry.acquire("a", &PoolSpec::new(0, 1, 1)).unwrap();
        assert_eq!(registry.operations(), ["a", "b"]);
    }

    #[test]
    fn shutdown_all_stops_every_pool() {
        let registry = PoolRegistry::new();
        let a = registry.acquire("a", &PoolSpec::new(1, 1, 1)).unwrap();
        let b = registry.acquire("b", &PoolSpec::new(1, 1, 1)).unwrap();
        a.pool().execute(Box::new(|| {})).unwrap();

        assert!(registry.shutdown_all(Duration::from_secs(5)));
        assert!(a.pool().is_shutdown());
        assert!(b.pool().is_shutdown());
        assert!(registry.acquire("a", &PoolSpec::new(1, 1, 1)).unwrap().same_pool(&a));
    }
}
