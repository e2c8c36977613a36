//! Named handlers for sub-operations.
//!
//! The embedding application registers each handler under the string id that
//! the operation catalog routes sub-operations to (e.g. `"Operation1.sub1"`).
//! Worker tasks resolve handlers by id at execution time.

use std::sync::Arc;

use dashmap::DashMap;
use quarantine_core::{TaskInput, TaskResult};

// ---------------------------------------------------------------------------
// Handler trait
// ---------------------------------------------------------------------------

/// What a handler hands back: `Ok(None)` is the "empty result" case.
pub type HandlerOutput = anyhow::Result<Option<TaskResult>>;

/// Executes one sub-operation.
///
/// `Ok(None)` is an empty result and `Ok(Some(r))` with no status set is a
/// contract violation; the worker task turns both into error results. An
/// `Err` (or a panic) is an invocation failure, also folded into an error result.
pub trait Handler: Send + Sync {
    fn call(&self, input: &TaskInput) -> HandlerOutput;
}

impl<F> Handler for F
where
    F: Fn(&TaskInput) -> HandlerOutput + Send + Sync,
{
    fn call(&self, input: &TaskInput) -> HandlerOutput {
        self(input)
    }
}

// ---------------------------------------------------------------------------
// HandlerRegistry
// ---------------------------------------------------------------------------

/// Maps handler ids to handler implementations.
///
/// Populated at startup; registering an id twice replaces the earlier handler.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: DashMap<String, Arc<dyn Handler>>,
}

impl HandlerRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self {
            handlers: DashMap::new(),
        }
    }

    /// Registers a handler with the full contract (may fail or return nothing).
    pub fn register<H: Handler + 'static>(&self, id: impl Into<String>, handler: H) {
        self.handlers.insert(id.into(), Arc::new(handler));
    }

    /// Registers a handler that always returns a [`TaskResult`].
    pub fn register_fn<F>(&self, id: impl Into<String>, handler: F)
    where
        F: Fn(&TaskInput) -> TaskResult + Send + Sync + 'static,
    {
        let handler = move |input: &TaskInput| -> HandlerOutput { Ok(Some(handler(input))) };
        self.handlers.insert(id.into(), Arc::new(handler));
    }

    #[must_use]
    pub fn resolve(&self, id: &str) -> Option<Arc<dyn Handler>> {
        self.handlers.get(id).map(|entry| Arc::clone(entry.value()))
    }

    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.handlers.contains_key(id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut ids: Vec<String> = self.handlers.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        f.debug_struct("HandlerRegistry").field("handlers", &ids).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_fn_and_resolve() {
        let registry = HandlerRegistry::new();
        registry.register_fn("Echo.single", |input: &TaskInput| {
            TaskResult::succeeded(input.as_single().cloned().unwrap_or(quarantine_core::Value::Null))
        });

        let handler = registry.resolve("Echo.single").unwrap();
        let result = handler.call(&TaskInput::single("hi")).unwrap().unwrap();
        assert_eq!(result.result(), Some(&quarantine_core::Value::from("hi")));
    }

    #[test]
    fn closures_returning_option_are_handlers() {
        let registry = HandlerRegistry::new();
        registry.register("Nothing.none", |_: &TaskInput| -> HandlerOutput { Ok(None) });
        registry.register("Broken.err", |_: &TaskInput| -> HandlerOutput {
            Err(anyhow::anyhow!("boom"))
        });

        assert!(registry.resolve("Nothing.none").unwrap().call(&TaskInput::single(1)).unwrap().is_none());
        let err = registry.resolve("Broken.err").unwrap().call(&TaskInput::single(1)).unwrap_err();
        assert_eq!(err.to_string(), "boom");
    }

    #[test]
    fn unknown_id_resolves_to_none() {
        let registry = HandlerRegistry::new();
        assert!(registry.resolve("Missing.handler").is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn re_registration_replaces() {
        let registry = HandlerRegistry::new();
        registry.register_fn("H.x", |_: &TaskInput| TaskResult::failed("old"));
        registry.register_fn("H.x", |_: &TaskInput| TaskResult::succeeded("new"));
        assert_eq!(registry.len(), 1);
        let result = registry.resolve("H.x").unwrap().call(&TaskInput::single(0)).unwrap().unwrap();
        assert!(result.is_success());
    }

    #[test]
    fn debug_lists_sorted_ids() {
        let registry = HandlerRegistry::new();
        registry.register_fn("b", |_: &TaskInput| TaskResult::succeeded(1));
        registry.register_fn("a", |_: &TaskInput| TaskResult::succeeded(1));
        assert_eq!(format!("{registry:?}"), r#"HandlerRegistry { handlers: ["a", "b"] }"#);
    }
}
