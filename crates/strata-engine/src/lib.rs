//! Strata engine
//!
//! Task-scheduling and resource-lifecycle engine: drives many
//! independently-progressing resource operations to completion against slow,
//! externally-polled backends, without a thread per resource.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │                StackScheduler                    │
//! │   dependency graph walk, edge-triggered          │
//! │   readiness, failure policy, rollback            │
//! └───────┬─────────────────────────────────────────┘
//!         │ one per eligible resource
//! ┌───────▼───────┐   timeout / retry / backoff /
//! │   TaskRunner  │   cancellation enforcement
//! └───────┬───────┘
//!         │ step()
//! ┌───────▼───────┐   record transition → backend call
//! │     Task      │   → poll check_*_complete()
//! └───────┬───────┘
//!         │
//! ┌───────▼───────┐
//! │ ResourceType  │   plugin capability interface
//! │  (strata-core)│   (create/check/update/delete/...)
//! └───────────────┘
//! ```
//!
//! Tasks suspend cooperatively between polls; the runner's sleeps are the
//! points where sibling resources make progress, so thousands of in-flight
//! operations share one runtime.

pub mod backoff;
pub mod error;
pub mod runner;
pub mod scheduler;
pub mod stack;
pub mod task;

// Re-exports
pub use backoff::BackoffPolicy;
pub use error::{EngineError, Result};
pub use runner::{TaskOutcome, TaskRunner};
pub use scheduler::{EngineConfig, RollbackReport, StackOutcome, StackScheduler};
pub use stack::Stack;
pub use task::{Task, TaskPoll};
