#![allow(dead_code)]

//! Shared fake resource type for engine tests.
//!
//! Behaviour is configured per type instance (how many polls an operation
//! takes, which calls fail and how) and every backend call is appended to a
//! shared log so tests can assert ordering across resources.

use async_trait::async_trait;
use serde_json::json;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use strata_core::{Handle, Properties, Resource, ResourceError, ResourceResult, ResourceType};

pub type CallLog = Arc<Mutex<Vec<String>>>;

pub fn call_log() -> CallLog {
    Arc::new(Mutex::new(Vec::new()))
}

/// Position of `entry` in the log, panicking when absent.
pub fn log_index(log: &CallLog, entry: &str) -> usize {
    let entries = log.lock().unwrap();
    entries
        .iter()
        .position(|e| e == entry)
        .unwrap_or_else(|| panic!("expected {entry:?} in call log {entries:?}"))
}

pub fn log_count(log: &CallLog, entry: &str) -> usize {
    log.lock().unwrap().iter().filter(|e| *e == entry).count()
}

pub struct FakeType {
    type_name: String,
    poll_interval: Duration,
    /// Checks returning `false` before an operation reports complete.
    polls_to_complete: u32,
    /// Initial create calls failing with a retryable conflict.
    transient_create_failures: u32,
    /// Terminal status reported by the create check instead of completing.
    create_check_status: Option<String>,
    /// Delete call reports the entity is already gone.
    delete_not_found: bool,
    /// Delete call fails terminally.
    delete_error: Option<String>,
    /// Checks never report completion.
    never_complete: bool,
    /// Updates require replacing the backend entity.
    replace_on_update: bool,
    counters: Mutex<HashMap<String, u32>>,
    log: CallLog,
}

impl FakeType {
    pub fn new(type_name: &str, log: CallLog) -> Self {
        Self {
            type_name: type_name.to_string(),
            poll_interval: Duration::from_millis(100),
            polls_to_complete: 1,
            transient_create_failures: 0,
            create_check_status: None,
            delete_not_found: false,
            delete_error: None,
            never_complete: false,
            replace_on_update: false,
            counters: Mutex::new(HashMap::new()),
            log,
        }
    }

    pub fn polls_to_complete(mut self, polls: u32) -> Self {
        self.polls_to_complete = polls;
        self
    }

    pub fn transient_create_failures(mut self, failures: u32) -> Self {
        self.transient_create_failures = failures;
        self
    }

    pub fn create_check_status(mut self, status: &str) -> Self {
        self.create_check_status = Some(status.to_string());
        self
    }

    pub fn delete_not_found(mut self) -> Self {
        self.delete_not_found = true;
        self
    }

    pub fn delete_error(mut self, message: &str) -> Self {
        self.delete_error = Some(message.to_string());
        self
    }

    pub fn never_complete(mut self) -> Self {
        self.never_complete = true;
        self
    }

    pub fn replace_on_update(mut self) -> Self {
        self.replace_on_update = true;
        self
    }

    /// Times `op` was invoked for `resource` (e.g. `count("create", "web")`).
    pub fn count(&self, op: &str, resource: &str) -> u32 {
        *self
            .counters
            .lock()
            .unwrap()
            .get(&format!("{op}:{resource}"))
            .unwrap_or(&0)
    }

    fn bump(&self, op: &str, resource: &str) -> u32 {
        let mut counters = self.counters.lock().unwrap();
        let count = counters.entry(format!("{op}:{resource}")).or_insert(0);
        *count += 1;
        *count
    }

    fn record(&self, op: &str, resource: &str) -> u32 {
        self.log.lock().unwrap().push(format!("{op} {resource}"));
        self.bump(op, resource)
    }
}

#[async_trait]
impl ResourceType for FakeType {
    fn type_name(&self) -> &str {
        &self.type_name
    }

    fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    fn needs_replacement(&self, _current: &Properties, _desired: &Properties) -> bool {
        self.replace_on_update
    }

    async fn create(&self, resource: &mut Resource) -> ResourceResult<Handle> {
        let attempt = self.record("create", &resource.name);
        if attempt <= self.transient_create_failures {
            return Err(ResourceError::Conflict(format!(
                "{} busy (attempt {attempt})",
                resource.name
            )));
        }
        resource.resource_id = Some(format!("{}-id-{attempt}", resource.name));
        Ok(json!({ "op": "create" }))
    }

    async fn check_create_complete(
        &self,
        resource: &mut Resource,
        _handle: &Handle,
    ) -> ResourceResult<bool> {
        let polls = self.record("check_create", &resource.name);
        if let Some(status) = &self.create_check_status {
            return Err(ResourceError::UnexpectedStatus(status.clone()));
        }
        if self.never_complete {
            return Ok(false);
        }
        Ok(polls > self.polls_to_complete)
    }

    async fn update(&self, resource: &mut Resource, _desired: &Properties) -> ResourceResult<Handle> {
        self.record("update", &resource.name);
        Ok(json!({ "op": "update" }))
    }

    async fn check_update_complete(
        &self,
        resource: &mut Resource,
        _handle: &Handle,
    ) -> ResourceResult<bool> {
        let polls = self.record("check_update", &resource.name);
        if self.never_complete {
            return Ok(false);
        }
        Ok(polls > self.polls_to_complete)
    }

    async fn delete(&self, resource: &mut Resource) -> ResourceResult<Handle> {
        self.record("delete", &resource.name);
        if self.delete_not_found {
            return Err(ResourceError::NotFound(resource.name.clone()));
        }
        if let Some(message) = &self.delete_error {
            return Err(ResourceError::Backend(message.clone()));
        }
        Ok(json!({ "op": "delete" }))
    }

    async fn check_delete_complete(
        &self,
        resource: &mut Resource,
        _handle: &Handle,
    ) -> ResourceResult<bool> {
        let polls = self.record("check_delete", &resource.name);
        if self.never_complete {
            return Ok(false);
        }
        Ok(polls > self.polls_to_complete)
    }
}
