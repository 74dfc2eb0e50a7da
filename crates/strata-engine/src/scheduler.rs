//! Dependency-ordered stack execution
//!
//! The scheduler walks a [`Stack`]'s dependency graph with edge-triggered
//! readiness: a resource's task starts the instant its last blocking
//! dependency completes, and independent branches run concurrently up to the
//! configured parallelism bound. CREATE/UPDATE walk the forward order;
//! DELETE and SUSPEND walk the reverse order (all dependents first).
//!
//! On the first failure no further tasks are started, but in-flight siblings
//! are allowed to finish rather than being aborted mid-backend-call. If the
//! stack has rollback enabled, the resources that reached COMPLETE are then
//! deleted in reverse dependency order; rollback failures are reported
//! alongside the original failure, never in place of it.

use crate::backoff::BackoffPolicy;
use crate::error::EngineError;
use crate::runner::{TaskOutcome, TaskRunner};
use crate::stack::Stack;
use crate::task::Task;
use futures_util::stream::{FuturesUnordered, StreamExt};
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use strata_core::{Action, Registry, Resource, State, StateStore, Status};
use tokio_util::sync::CancellationToken;

/// Engine tuning knobs.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Maximum number of resource tasks in flight at once. Values below 1
    /// are treated as 1.
    pub max_parallel: usize,

    /// Deadline for each resource operation, retries included.
    pub action_timeout: Option<Duration>,

    /// Retries granted per resource operation on transient failures.
    pub retry_limit: u32,

    /// Backoff applied between retries.
    pub backoff: BackoffPolicy,

    /// Floor for task-requested poll intervals.
    pub min_poll_interval: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_parallel: 8,
            action_timeout: None,
            retry_limit: 2,
            backoff: BackoffPolicy::default(),
            min_poll_interval: Duration::from_millis(100),
        }
    }
}

/// Outcome of a stack-level action.
#[derive(Debug, Clone)]
pub enum StackOutcome {
    Complete,
    Failed {
        /// The first resource failure, with its cause chain.
        error: Arc<EngineError>,
        /// Present when rollback was configured and attempted.
        rollback: Option<RollbackReport>,
    },
    Cancelled,
}

impl StackOutcome {
    pub fn is_complete(&self) -> bool {
        matches!(self, StackOutcome::Complete)
    }
}

/// What a rollback pass achieved.
#[derive(Debug, Clone, Default)]
pub struct RollbackReport {
    /// Resources restored to deleted state, in completion order.
    pub rolled_back: Vec<String>,

    /// Rollback failures, reported separately from the original error.
    pub errors: Vec<(String, Arc<EngineError>)>,
}

struct ConvergeResult {
    failures: Vec<(String, Arc<EngineError>)>,
    cancelled: bool,
}

type TaskFuture = Pin<Box<dyn Future<Output = (String, TaskOutcome, Resource)> + Send>>;

/// Drives stack-level actions over the dependency graph.
pub struct StackScheduler {
    registry: Registry,
    store: Arc<dyn StateStore>,
    config: EngineConfig,
}

impl StackScheduler {
    pub fn new(registry: Registry, store: Arc<dyn StateStore>) -> Self {
        Self {
            registry,
            store,
            config: EngineConfig::default(),
        }
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Creates every resource in dependency order.
    pub async fn create(&self, stack: &mut Stack) -> Result<StackOutcome, EngineError> {
        self.run(stack, Action::Create, &CancellationToken::new()).await
    }

    /// Converges every resource towards its desired properties.
    pub async fn update(&self, stack: &mut Stack) -> Result<StackOutcome, EngineError> {
        self.run(stack, Action::Update, &CancellationToken::new()).await
    }

    /// Deletes every resource in reverse dependency order.
    pub async fn delete(&self, stack: &mut Stack) -> Result<StackOutcome, EngineError> {
        self.run(stack, Action::Delete, &CancellationToken::new()).await
    }

    /// Runs `action` over the whole stack.
    ///
    /// Returns `Err` only for validation failures, which abort before any
    /// task starts; everything after that point is reported through
    /// [`StackOutcome`].
    pub async fn run(
        &self,
        stack: &mut Stack,
        action: Action,
        cancel: &CancellationToken,
    ) -> Result<StackOutcome, EngineError> {
        stack.validate(&self.registry)?;

        tracing::info!(stack = %stack.name(), %action, resources = stack.len(), "starting stack action");
        stack.set_state(action, Status::InProgress);

        let result = self.converge(stack, action, None, cancel).await;

        if result.cancelled {
            stack.set_state(action, Status::Failed);
            tracing::info!(stack = %stack.name(), %action, "stack action cancelled");
            return Ok(StackOutcome::Cancelled);
        }

        match result.failures.into_iter().next() {
            None => {
                stack.set_state(action, Status::Complete);
                tracing::info!(stack = %stack.name(), %action, "stack action complete");
                Ok(StackOutcome::Complete)
            }
            Some((name, error)) => {
                stack.set_state(action, Status::Failed);
                tracing::warn!(stack = %stack.name(), %action, resource = %name, %error, "stack action failed");

                let rollback = if stack.rollback_on_failure()
                    && matches!(action, Action::Create | Action::Update)
                {
                    Some(self.rollback(stack, cancel).await)
                } else {
                    None
                };
                Ok(StackOutcome::Failed { error, rollback })
            }
        }
    }

    /// Deletes exactly the resources that reached COMPLETE, reverse
    /// dependency order. Never recurses into a second rollback.
    async fn rollback(&self, stack: &mut Stack, cancel: &CancellationToken) -> RollbackReport {
        let scope: HashSet<String> = stack
            .resources()
            .filter(|r| {
                r.state().is_complete()
                    && matches!(r.state().action, Action::Create | Action::Update)
            })
            .map(|r| r.name.clone())
            .collect();

        tracing::info!(stack = %stack.name(), resources = scope.len(), "rolling back");
        stack.set_state(Action::Rollback, Status::InProgress);

        let result = self
            .converge(stack, Action::Delete, Some(&scope), cancel)
            .await;

        let rolled_back: Vec<String> = scope
            .iter()
            .filter(|name| {
                stack
                    .resource(name)
                    .is_some_and(|r| r.state() == State::new(Action::Delete, Status::Complete))
            })
            .cloned()
            .collect();

        let status = if result.failures.is_empty() && !result.cancelled {
            Status::Complete
        } else {
            Status::Failed
        };
        stack.set_state(Action::Rollback, status);

        RollbackReport {
            rolled_back,
            errors: result.failures,
        }
    }

    /// Walks the graph for one action, starting tasks as their dependencies
    /// allow and collecting per-resource failures.
    async fn converge(
        &self,
        stack: &mut Stack,
        action: Action,
        scope: Option<&HashSet<String>>,
        cancel: &CancellationToken,
    ) -> ConvergeResult {
        let in_scope = |name: &str| scope.is_none_or(|s| s.contains(name));
        let reverse = matches!(action, Action::Delete | Action::Suspend);
        // a zero bound would stall the walk before it starts
        let max_parallel = self.config.max_parallel.max(1);

        // Last observed state per resource, updated as tasks finish; the
        // readiness computation reads only this table.
        let mut states: HashMap<String, State> = stack
            .resources()
            .map(|r| (r.name.clone(), r.state()))
            .collect();

        let mut pending: HashSet<String> = stack
            .resources()
            .filter(|r| in_scope(&r.name) && Self::needs_action(r, action))
            .map(|r| r.name.clone())
            .collect();

        let mut in_flight: FuturesUnordered<TaskFuture> = FuturesUnordered::new();
        let mut failures: Vec<(String, Arc<EngineError>)> = Vec::new();
        let mut cancelled = false;

        loop {
            if failures.is_empty() && !cancelled {
                let mut ready: Vec<String> = pending
                    .iter()
                    .filter(|name| self.eligible(stack, name, action, reverse, scope, &states))
                    .cloned()
                    .collect();
                ready.sort();

                for name in ready {
                    if in_flight.len() >= max_parallel {
                        break;
                    }
                    pending.remove(&name);
                    let Some(resource) = stack.take_resource(&name) else {
                        continue;
                    };
                    match self.launch(resource, action, cancel) {
                        Ok(fut) => in_flight.push(fut),
                        Err((resource, err)) => {
                            states.insert(name.clone(), resource.state());
                            stack.put_resource(resource);
                            failures.push((name, Arc::new(err)));
                        }
                    }
                }
            }

            let Some((name, outcome, resource)) = in_flight.next().await else {
                break;
            };

            states.insert(name.clone(), resource.state());
            stack.put_resource(resource);

            match outcome {
                TaskOutcome::Complete => {}
                TaskOutcome::Failed(err) => failures.push((name, err)),
                TaskOutcome::Cancelled => cancelled = true,
            }
        }

        ConvergeResult { failures, cancelled }
    }

    /// Builds and spawns the runner future for one resource.
    #[allow(clippy::result_large_err)]
    fn launch(
        &self,
        mut resource: Resource,
        action: Action,
        cancel: &CancellationToken,
    ) -> Result<TaskFuture, (Resource, EngineError)> {
        // a resource never created takes the create path during update; the
        // entity comes up with the desired properties, not the stale ones
        let effective = if action == Action::Update && resource.resource_id.is_none() {
            if let Some(desired) = resource.desired_properties.take() {
                resource.properties = desired;
            }
            Action::Create
        } else {
            action
        };

        let plugin = match self.registry.get(&resource.type_name) {
            Ok(plugin) => plugin,
            Err(err) => return Err((resource, err.into())),
        };

        let name = resource.name.clone();
        let task = Task::new(resource, effective, plugin, self.store.clone());
        let mut runner = TaskRunner::new(task)
            .with_timeout(self.config.action_timeout)
            .with_retry_limit(self.config.retry_limit)
            .with_backoff(self.config.backoff)
            .with_min_poll_interval(self.config.min_poll_interval);
        let token = cancel.child_token();

        Ok(Box::pin(async move {
            let outcome = runner.run(&token).await;
            (name, outcome, runner.into_resource())
        }))
    }

    /// Whether a resource has anything to do for this action.
    fn needs_action(resource: &Resource, action: Action) -> bool {
        let state = resource.state();
        match action {
            // no desired change and a healthy entity is the no-op path
            Action::Update => {
                resource.desired_properties.is_some() || state == State::INIT || state.is_failed()
            }
            _ => state != State::new(action, Status::Complete),
        }
    }

    /// Readiness: every blocking neighbour has reached the required state.
    fn eligible(
        &self,
        stack: &Stack,
        name: &str,
        action: Action,
        reverse: bool,
        scope: Option<&HashSet<String>>,
        states: &HashMap<String, State>,
    ) -> bool {
        let Some(resource) = stack.resource(name) else {
            // owned by a running task right now
            return false;
        };

        if reverse {
            // all dependents participating in this traversal must be done
            stack.dependents(name).iter().all(|dep| {
                if let Some(s) = scope
                    && !s.contains(dep)
                {
                    return true;
                }
                states
                    .get(dep)
                    .is_some_and(|s| s.action == action && s.is_complete())
            })
        } else {
            resource.requires.iter().all(|dep| {
                states.get(dep).is_some_and(|s| {
                    s.is_complete() && !matches!(s.action, Action::Init | Action::Delete)
                })
            })
        }
    }
}
