//! Stack dependency graph
//!
//! A [`Stack`] owns the resources being orchestrated together and the
//! dependency edges derived from each resource's `requires` set. Validation
//! runs before any task starts; a cyclic graph is a validation error, never
//! a condition the scheduler has to handle at runtime.

use crate::error::EngineError;
use std::collections::{BTreeMap, HashSet};
use strata_core::{Action, Registry, Resource, State, Status};

/// The full dependency graph of resources orchestrated together.
pub struct Stack {
    name: String,
    resources: BTreeMap<String, Resource>,
    state: State,
    rollback_on_failure: bool,
}

impl Stack {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            resources: BTreeMap::new(),
            state: State::INIT,
            rollback_on_failure: false,
        }
    }

    /// Enables deleting successfully created resources when a stack action
    /// fails partway.
    pub fn with_rollback(mut self, enabled: bool) -> Self {
        self.rollback_on_failure = enabled;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub(crate) fn set_state(&mut self, action: Action, status: Status) {
        let next = State::new(action, status);
        if next != self.state {
            tracing::info!(stack = %self.name, from = %self.state, to = %next, "stack state transition");
            self.state = next;
        }
    }

    pub fn rollback_on_failure(&self) -> bool {
        self.rollback_on_failure
    }

    pub fn add_resource(&mut self, resource: Resource) {
        self.resources.insert(resource.name.clone(), resource);
    }

    pub fn resource(&self, name: &str) -> Option<&Resource> {
        self.resources.get(name)
    }

    pub fn resource_mut(&mut self, name: &str) -> Option<&mut Resource> {
        self.resources.get_mut(name)
    }

    pub fn resources(&self) -> impl Iterator<Item = &Resource> {
        self.resources.values()
    }

    pub fn resource_names(&self) -> Vec<String> {
        self.resources.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Names of resources that directly depend on `name`.
    pub fn dependents(&self, name: &str) -> Vec<String> {
        self.resources
            .values()
            .filter(|r| r.requires.contains(name))
            .map(|r| r.name.clone())
            .collect()
    }

    /// Moves a resource out of the stack so exactly one task owns it while
    /// it runs.
    pub(crate) fn take_resource(&mut self, name: &str) -> Option<Resource> {
        self.resources.remove(name)
    }

    pub(crate) fn put_resource(&mut self, resource: Resource) {
        self.resources.insert(resource.name.clone(), resource);
    }

    /// Checks the graph before any task starts: every dependency must name a
    /// resource in the stack, every type must be registered, and the graph
    /// must be acyclic.
    pub fn validate(&self, registry: &Registry) -> Result<(), EngineError> {
        for resource in self.resources.values() {
            if !registry.contains(&resource.type_name) {
                return Err(EngineError::Core(
                    strata_core::CoreError::TypeNotRegistered(resource.type_name.clone()),
                ));
            }
            for dep in &resource.requires {
                if !self.resources.contains_key(dep) {
                    return Err(EngineError::UnknownDependency {
                        name: resource.name.clone(),
                        missing: dep.clone(),
                    });
                }
            }
        }

        let mut done = HashSet::new();
        let mut visiting = Vec::new();
        for name in self.resources.keys() {
            self.visit(name, &mut visiting, &mut done)?;
        }
        Ok(())
    }

    fn visit(
        &self,
        name: &str,
        visiting: &mut Vec<String>,
        done: &mut HashSet<String>,
    ) -> Result<(), EngineError> {
        if done.contains(name) {
            return Ok(());
        }
        if let Some(pos) = visiting.iter().position(|n| n == name) {
            let mut cycle: Vec<String> = visiting[pos..].to_vec();
            cycle.push(name.to_string());
            return Err(EngineError::CircularDependency(cycle.join(" -> ")));
        }

        visiting.push(name.to_string());
        if let Some(resource) = self.resources.get(name) {
            for dep in &resource.requires {
                self.visit(dep, visiting, done)?;
            }
        }
        visiting.pop();
        done.insert(name.to_string());
        Ok(())
    }
}
