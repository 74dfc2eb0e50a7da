//! Engine error types

use std::time::Duration;
use strata_core::{Action, CoreError, ResourceError};
use thiserror::Error;

/// Errors surfaced by the engine.
///
/// Validation variants abort a stack operation before anything starts;
/// `ResourceFailed` carries the user-visible message naming the failing
/// resource, its action and the proximate cause.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("circular dependency in stack: {0}")]
    CircularDependency(String),

    #[error("resource {name} requires unknown resource {missing}")]
    UnknownDependency { name: String, missing: String },

    #[error("Error in {} {}: {}", .action.gerund(), .name, .source)]
    ResourceFailed {
        name: String,
        action: Action,
        #[source]
        source: ResourceError,
    },

    #[error("{} of {} timed out after {}s", .action, .name, .timeout.as_secs())]
    Timeout {
        name: String,
        action: Action,
        timeout: Duration,
    },

    #[error("operation cancelled")]
    Cancelled,

    #[error(transparent)]
    Core(#[from] CoreError),
}

impl EngineError {
    /// True when the error is a timeout of the named resource's action.
    pub fn is_timeout(&self) -> bool {
        matches!(self, EngineError::Timeout { .. })
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
