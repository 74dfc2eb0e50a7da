//! Core error types

use thiserror::Error;

/// Errors a resource backend can report to the engine.
///
/// Plugins translate provider-specific failures into these variants so the
/// engine can classify them uniformly: `NotFound` has dedicated handling on
/// the delete path, and `Conflict`/`RateLimited` are retryable by default
/// (see [`ResourceType::retryable`](crate::ResourceType::retryable)).
#[derive(Error, Debug)]
pub enum ResourceError {
    /// The backend does not know the resource (anymore).
    #[error("resource not found: {0}")]
    NotFound(String),

    /// The backend rejected the call due to a conflicting concurrent change.
    #[error("conflict: {0}")]
    Conflict(String),

    /// The backend is throttling requests.
    #[error("rate limited: {0}")]
    RateLimited(String),

    /// The backend reported a terminal status the plugin does not recognize.
    #[error("unknown status {0}")]
    UnexpectedStatus(String),

    /// Any other terminal backend failure.
    #[error("{0}")]
    Backend(String),

    /// The resource type does not support the requested operation.
    #[error("operation not supported: {0}")]
    Unsupported(String),
}

/// Errors from the core's own machinery (store, registry).
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("resource type not registered: {0}")]
    TypeNotRegistered(String),

    #[error("state file error: {0}")]
    StateError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, CoreError>;

/// Result of a single backend call or completeness check.
pub type ResourceResult<T> = std::result::Result<T, ResourceError>;
