//! Resource identity and lifecycle state

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

/// Resolved template properties of a resource.
pub type Properties = serde_json::Map<String, serde_json::Value>;

/// The high-level operation requested on a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    /// No action has been performed yet.
    Init,
    Create,
    Update,
    Delete,
    Suspend,
    Resume,
    Check,
    Adopt,
    Snapshot,
    Rollback,
}

impl Action {
    /// Verb form used in user-visible failure messages
    /// (e.g. "Error in creating container").
    pub fn gerund(&self) -> &'static str {
        match self {
            Action::Init => "initializing",
            Action::Create => "creating",
            Action::Update => "updating",
            Action::Delete => "deleting",
            Action::Suspend => "suspending",
            Action::Resume => "resuming",
            Action::Check => "checking",
            Action::Adopt => "adopting",
            Action::Snapshot => "snapshotting",
            Action::Rollback => "rolling back",
        }
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Action::Init => write!(f, "init"),
            Action::Create => write!(f, "create"),
            Action::Update => write!(f, "update"),
            Action::Delete => write!(f, "delete"),
            Action::Suspend => write!(f, "suspend"),
            Action::Resume => write!(f, "resume"),
            Action::Check => write!(f, "check"),
            Action::Adopt => write!(f, "adopt"),
            Action::Snapshot => write!(f, "snapshot"),
            Action::Rollback => write!(f, "rollback"),
        }
    }
}

/// Progress/outcome of the current action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    InProgress,
    Complete,
    Failed,
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Status::InProgress => write!(f, "in_progress"),
            Status::Complete => write!(f, "complete"),
            Status::Failed => write!(f, "failed"),
        }
    }
}

/// The `(action, status)` composite exposed to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct State {
    pub action: Action,
    pub status: Status,
}

impl State {
    pub const INIT: State = State {
        action: Action::Init,
        status: Status::Complete,
    };

    pub fn new(action: Action, status: Status) -> Self {
        Self { action, status }
    }

    pub fn is_complete(&self) -> bool {
        self.status == Status::Complete
    }

    pub fn is_failed(&self) -> bool {
        self.status == Status::Failed
    }
}

impl std::fmt::Display for State {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}_{}", self.action, self.status)
    }
}

/// One node in the orchestration graph, backed by a single external entity.
///
/// A resource is mutated only by the task currently driving it; the engine
/// enforces this by moving ownership into the task and back.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Resource {
    /// Name, unique within its stack.
    pub name: String,

    /// Registered resource type driving the backend calls.
    pub type_name: String,

    /// Backend-assigned identifier, absent until create succeeds.
    pub resource_id: Option<String>,

    /// Resolved template properties.
    pub properties: Properties,

    /// Properties an in-flight update is converging towards. Applied to
    /// `properties` once the update completes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub desired_properties: Option<Properties>,

    /// Backend-observed values recorded as they become known (addresses,
    /// endpoints, ...).
    pub attributes: HashMap<String, serde_json::Value>,

    /// Names of resources that must be complete before this one may start.
    pub requires: BTreeSet<String>,

    /// Why the last action failed, if it did.
    pub failure_reason: Option<String>,

    state: State,
}

impl Resource {
    pub fn new(name: impl Into<String>, type_name: impl Into<String>, properties: Properties) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
            resource_id: None,
            properties,
            desired_properties: None,
            attributes: HashMap::new(),
            requires: BTreeSet::new(),
            failure_reason: None,
            state: State::INIT,
        }
    }

    /// Declares a dependency on another resource by name.
    pub fn depends_on(mut self, name: impl Into<String>) -> Self {
        self.requires.insert(name.into());
        self
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn set_state(&mut self, action: Action, status: Status) {
        let next = State::new(action, status);
        if next != self.state {
            tracing::debug!(resource = %self.name, from = %self.state, to = %next, "state transition");
            self.state = next;
        }
        if status != Status::Failed {
            self.failure_reason = None;
        }
    }

    pub fn set_attribute(&mut self, key: impl Into<String>, value: serde_json::Value) {
        self.attributes.insert(key.into(), value);
    }

    pub fn get_attribute<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.attributes
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_state() {
        let r = Resource::new("web", "container", Properties::new());
        assert_eq!(r.state(), State::INIT);
        assert!(r.state().is_complete());
        assert!(r.resource_id.is_none());
    }

    #[test]
    fn test_state_display() {
        let s = State::new(Action::Create, Status::InProgress);
        assert_eq!(s.to_string(), "create_in_progress");
        assert_eq!(State::INIT.to_string(), "init_complete");
    }

    #[test]
    fn test_failure_reason_cleared_on_success() {
        let mut r = Resource::new("web", "container", Properties::new());
        r.set_state(Action::Create, Status::Failed);
        r.failure_reason = Some("boom".into());
        r.set_state(Action::Delete, Status::Complete);
        assert!(r.failure_reason.is_none());
    }
}
