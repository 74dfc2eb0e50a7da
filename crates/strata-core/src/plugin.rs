//! Resource type capability trait and registry

use crate::error::{CoreError, ResourceError, ResourceResult, Result};
use crate::resource::{Properties, Resource};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Opaque value returned by a backend call and passed back to the matching
/// completeness check (e.g. the backend operation id, or the expected
/// terminal status).
pub type Handle = serde_json::Value;

/// Capability interface implemented by each resource type.
///
/// Every long-running operation is split into the initiating call (which
/// returns a [`Handle`]) and a `check_*_complete` call the engine polls at
/// [`poll_interval`](Self::poll_interval) until it reports `true`. The engine
/// never talks to a backend directly; all network I/O lives behind this
/// trait.
#[async_trait]
pub trait ResourceType: Send + Sync {
    /// Type name this implementation is registered under.
    fn type_name(&self) -> &str;

    /// Interval at which the engine re-checks a pending operation.
    fn poll_interval(&self) -> Duration {
        Duration::from_secs(1)
    }

    /// Whether a backend error is transient and worth retrying.
    fn retryable(&self, err: &ResourceError) -> bool {
        matches!(err, ResourceError::Conflict(_) | ResourceError::RateLimited(_))
    }

    /// Whether changing `current` into `desired` requires replacing the
    /// backend entity rather than updating it in place.
    fn needs_replacement(&self, current: &Properties, desired: &Properties) -> bool {
        let _ = (current, desired);
        false
    }

    /// Start creating the backend entity. Must set `resource.resource_id`
    /// as soon as the backend assigns one.
    async fn create(&self, resource: &mut Resource) -> ResourceResult<Handle>;

    /// Poll creation; `Ok(true)` once the entity is usable.
    async fn check_create_complete(&self, resource: &mut Resource, handle: &Handle)
    -> ResourceResult<bool>;

    /// Start an in-place update towards `desired`.
    async fn update(&self, resource: &mut Resource, desired: &Properties) -> ResourceResult<Handle>;

    /// Poll an in-place update.
    async fn check_update_complete(&self, resource: &mut Resource, handle: &Handle)
    -> ResourceResult<bool>;

    /// Start deleting the backend entity. Returning
    /// [`ResourceError::NotFound`] here (or from the check) is treated as
    /// already-deleted success by the engine, not as a failure.
    async fn delete(&self, resource: &mut Resource) -> ResourceResult<Handle>;

    /// Poll deletion; `Ok(true)` once the backend confirms removal.
    async fn check_delete_complete(&self, resource: &mut Resource, handle: &Handle)
    -> ResourceResult<bool>;

    /// Start suspending the entity. Optional capability.
    async fn suspend(&self, resource: &mut Resource) -> ResourceResult<Handle> {
        let _ = resource;
        Err(ResourceError::Unsupported(format!("{} does not support suspend", self.type_name())))
    }

    async fn check_suspend_complete(&self, resource: &mut Resource, handle: &Handle)
    -> ResourceResult<bool> {
        let _ = (resource, handle);
        Ok(true)
    }

    /// Start resuming a suspended entity. Optional capability.
    async fn resume(&self, resource: &mut Resource) -> ResourceResult<Handle> {
        let _ = resource;
        Err(ResourceError::Unsupported(format!("{} does not support resume", self.type_name())))
    }

    async fn check_resume_complete(&self, resource: &mut Resource, handle: &Handle)
    -> ResourceResult<bool> {
        let _ = (resource, handle);
        Ok(true)
    }

    /// Verify the live entity still matches its recorded state.
    async fn check(&self, resource: &mut Resource) -> ResourceResult<()> {
        let _ = resource;
        Ok(())
    }
}

/// Explicitly constructed map from type name to implementation.
///
/// Built once at startup and passed down to the scheduler; there is no
/// process-wide registry.
#[derive(Default, Clone)]
pub struct Registry {
    types: HashMap<String, Arc<dyn ResourceType>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a resource type under its [`ResourceType::type_name`].
    /// Registering the same name twice replaces the earlier entry.
    pub fn register(&mut self, plugin: Arc<dyn ResourceType>) {
        let name = plugin.type_name().to_string();
        if self.types.insert(name.clone(), plugin).is_some() {
            tracing::warn!(type_name = %name, "resource type re-registered, previous mapping replaced");
        }
    }

    pub fn get(&self, type_name: &str) -> Result<Arc<dyn ResourceType>> {
        self.types
            .get(type_name)
            .cloned()
            .ok_or_else(|| CoreError::TypeNotRegistered(type_name.to_string()))
    }

    pub fn contains(&self, type_name: &str) -> bool {
        self.types.contains_key(type_name)
    }

    pub fn type_names(&self) -> impl Iterator<Item = &str> {
        self.types.keys().map(String::as_str)
    }
}
