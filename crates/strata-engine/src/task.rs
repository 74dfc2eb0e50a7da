//! Resumable resource operations
//!
//! A [`Task`] wraps exactly one `(resource, action)` pair as an explicit
//! state machine: the first [`step`](Task::step) records the in-progress
//! transition and issues the initiating backend call, subsequent steps poll
//! the matching completeness check. Between steps the task holds no pending
//! I/O, so its driver can suspend it for as long as it likes; each pending
//! step carries the re-check interval the resource type asked for.

use crate::error::EngineError;
use std::sync::Arc;
use std::time::Duration;
use strata_core::{
    Action, Handle, Resource, ResourceError, ResourceRecord, ResourceType, StateStore, Status,
};
use tokio_util::sync::CancellationToken;

/// What a single step observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskPoll {
    /// The operation reached its terminal success state.
    Complete,
    /// The operation is still converging; re-check after `wait`.
    Pending { wait: Duration },
}

/// Which completeness check a pending operation is waiting on.
///
/// `ReplaceDelete`/`ReplaceCreate` are the internal sub-sequence an UPDATE
/// passes through when the resource type requires replacement; the
/// externally visible action stays UPDATE throughout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PollTarget {
    Create,
    Update,
    Delete,
    Suspend,
    Resume,
    ReplaceDelete,
    ReplaceCreate,
}

enum Phase {
    NotStarted,
    Polling { target: PollTarget, handle: Handle },
    Done,
}

/// One resumable unit of work driving a resource through a single action.
pub struct Task {
    resource: Resource,
    action: Action,
    plugin: Arc<dyn ResourceType>,
    store: Arc<dyn StateStore>,
    cancel: CancellationToken,
    phase: Phase,
}

impl Task {
    pub fn new(
        resource: Resource,
        action: Action,
        plugin: Arc<dyn ResourceType>,
        store: Arc<dyn StateStore>,
    ) -> Self {
        Self {
            resource,
            action,
            plugin,
            store,
            cancel: CancellationToken::new(),
            phase: Phase::NotStarted,
        }
    }

    pub fn action(&self) -> Action {
        self.action
    }

    pub fn resource(&self) -> &Resource {
        &self.resource
    }

    pub fn into_resource(self) -> Resource {
        self.resource
    }

    pub fn is_done(&self) -> bool {
        matches!(self.phase, Phase::Done)
    }

    /// Requests cooperative cancellation, observed at the next step boundary.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Rewinds the task so the underlying operation runs again from the
    /// initiating call. Used by the runner after a transient failure.
    pub fn restart(&mut self) {
        self.phase = Phase::NotStarted;
    }

    /// Whether `err` is a backend failure the resource type classifies as
    /// retryable.
    pub(crate) fn is_transient(&self, err: &EngineError) -> bool {
        match err {
            EngineError::ResourceFailed { source, .. } => self.plugin.retryable(source),
            _ => false,
        }
    }

    /// Resumes the task once.
    ///
    /// Plugin failures are wrapped with the resource name and action but do
    /// not finalize the resource as failed; the driver owns the retry budget
    /// and calls [`finalize_failure`](Task::finalize_failure) when it gives
    /// up.
    pub async fn step(&mut self) -> Result<TaskPoll, EngineError> {
        if self.cancel.is_cancelled() {
            return Err(EngineError::Cancelled);
        }

        match std::mem::replace(&mut self.phase, Phase::NotStarted) {
            Phase::NotStarted => self.begin().await,
            Phase::Polling { target, handle } => self.poll(target, handle).await,
            Phase::Done => {
                self.phase = Phase::Done;
                Ok(TaskPoll::Complete)
            }
        }
    }

    async fn begin(&mut self) -> Result<TaskPoll, EngineError> {
        self.resource.set_state(self.action, Status::InProgress);
        self.record().await?;

        let plugin = self.plugin.clone();
        let started = match self.action {
            Action::Create => plugin
                .create(&mut self.resource)
                .await
                .map(|h| (PollTarget::Create, h)),
            Action::Update => {
                let desired = self
                    .resource
                    .desired_properties
                    .clone()
                    .unwrap_or_else(|| self.resource.properties.clone());
                if plugin.needs_replacement(&self.resource.properties, &desired) {
                    match plugin.delete(&mut self.resource).await {
                        // old entity already gone, go straight to the
                        // replacement create
                        Err(ResourceError::NotFound(_)) => {
                            return self.advance(PollTarget::ReplaceDelete).await;
                        }
                        other => other.map(|h| (PollTarget::ReplaceDelete, h)),
                    }
                } else {
                    plugin
                        .update(&mut self.resource, &desired)
                        .await
                        .map(|h| (PollTarget::Update, h))
                }
            }
            Action::Delete => {
                if self.resource.resource_id.is_none() {
                    // never created, nothing to tear down
                    return self.complete().await;
                }
                plugin
                    .delete(&mut self.resource)
                    .await
                    .map(|h| (PollTarget::Delete, h))
            }
            Action::Suspend => plugin
                .suspend(&mut self.resource)
                .await
                .map(|h| (PollTarget::Suspend, h)),
            Action::Resume => plugin
                .resume(&mut self.resource)
                .await
                .map(|h| (PollTarget::Resume, h)),
            Action::Check => {
                return match plugin.check(&mut self.resource).await {
                    Ok(()) => self.complete().await,
                    Err(err) => Err(self.wrap(err)),
                };
            }
            other => Err(ResourceError::Unsupported(format!(
                "action {other} is not task-driven"
            ))),
        };

        match started {
            Ok((target, handle)) => {
                self.phase = Phase::Polling { target, handle };
                Ok(TaskPoll::Pending {
                    wait: self.plugin.poll_interval(),
                })
            }
            Err(ResourceError::NotFound(_)) if self.action == Action::Delete => {
                tracing::debug!(resource = %self.resource.name, "already gone, delete is a no-op");
                self.complete().await
            }
            Err(err) => Err(self.wrap(err)),
        }
    }

    async fn poll(&mut self, target: PollTarget, handle: Handle) -> Result<TaskPoll, EngineError> {
        let plugin = self.plugin.clone();
        let checked = match target {
            PollTarget::Create | PollTarget::ReplaceCreate => {
                plugin.check_create_complete(&mut self.resource, &handle).await
            }
            PollTarget::Update => plugin.check_update_complete(&mut self.resource, &handle).await,
            PollTarget::Delete | PollTarget::ReplaceDelete => {
                plugin.check_delete_complete(&mut self.resource, &handle).await
            }
            PollTarget::Suspend => {
                plugin.check_suspend_complete(&mut self.resource, &handle).await
            }
            PollTarget::Resume => plugin.check_resume_complete(&mut self.resource, &handle).await,
        };

        match checked {
            Ok(false) => {
                self.phase = Phase::Polling { target, handle };
                Ok(TaskPoll::Pending {
                    wait: self.plugin.poll_interval(),
                })
            }
            Ok(true) => self.advance(target).await,
            Err(ResourceError::NotFound(_))
                if matches!(target, PollTarget::Delete | PollTarget::ReplaceDelete) =>
            {
                self.advance(target).await
            }
            Err(err) => Err(self.wrap(err)),
        }
    }

    async fn advance(&mut self, finished: PollTarget) -> Result<TaskPoll, EngineError> {
        match finished {
            PollTarget::ReplaceDelete => {
                // old entity gone, bring up the replacement
                self.resource.resource_id = None;
                let plugin = self.plugin.clone();
                match plugin.create(&mut self.resource).await {
                    Ok(handle) => {
                        self.phase = Phase::Polling {
                            target: PollTarget::ReplaceCreate,
                            handle,
                        };
                        Ok(TaskPoll::Pending {
                            wait: self.plugin.poll_interval(),
                        })
                    }
                    Err(err) => Err(self.wrap(err)),
                }
            }
            _ => self.complete().await,
        }
    }

    async fn complete(&mut self) -> Result<TaskPoll, EngineError> {
        if self.action == Action::Delete {
            self.resource.resource_id = None;
        }
        if self.action == Action::Update
            && let Some(desired) = self.resource.desired_properties.take()
        {
            self.resource.properties = desired;
        }
        self.resource.set_state(self.action, Status::Complete);
        self.record().await?;
        self.phase = Phase::Done;
        tracing::debug!(resource = %self.resource.name, action = %self.action, "operation complete");
        Ok(TaskPoll::Complete)
    }

    /// Records the terminal failed state. Store errors here are logged, not
    /// propagated, so they never mask the original failure.
    pub(crate) async fn finalize_failure(&mut self, reason: &str) {
        self.resource.set_state(self.action, Status::Failed);
        self.resource.failure_reason = Some(reason.to_string());
        if let Err(err) = self
            .store
            .record(&ResourceRecord::from_resource(&self.resource))
            .await
        {
            tracing::warn!(resource = %self.resource.name, %err, "failed to record failure state");
        }
        self.phase = Phase::Done;
    }

    /// Best-effort compensation when the task is abandoned mid-operation:
    /// a create that already got a backend id is torn down rather than
    /// leaked.
    pub(crate) async fn unwind(&mut self) {
        let mid_create = matches!(
            self.phase,
            Phase::Polling {
                target: PollTarget::Create | PollTarget::ReplaceCreate,
                ..
            }
        );
        if mid_create && self.resource.resource_id.is_some() {
            let plugin = self.plugin.clone();
            if let Err(err) = plugin.delete(&mut self.resource).await {
                tracing::warn!(
                    resource = %self.resource.name,
                    %err,
                    "cleanup of partially created resource failed"
                );
            }
        }
    }

    fn wrap(&self, err: ResourceError) -> EngineError {
        EngineError::ResourceFailed {
            name: self.resource.name.clone(),
            action: self.action,
            source: err,
        }
    }

    async fn record(&self) -> Result<(), EngineError> {
        self.store
            .record(&ResourceRecord::from_resource(&self.resource))
            .await?;
        Ok(())
    }
}
