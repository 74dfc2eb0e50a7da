//! Strata core
//!
//! Data model and external contracts for the Strata orchestration engine:
//! the resource lifecycle state machine, the capability trait each resource
//! type implements, the backend error taxonomy, and the persisted-state
//! store recording every transition.
//!
//! The engine that drives resources through these states lives in
//! `strata-engine`; this crate has no scheduling logic of its own.

pub mod error;
pub mod plugin;
pub mod resource;
pub mod store;

// Re-exports
pub use error::{CoreError, ResourceError, ResourceResult, Result};
pub use plugin::{Handle, Registry, ResourceType};
pub use resource::{Action, Properties, Resource, State, Status};
pub use store::{FileStateStore, MemoryStateStore, ResourceRecord, StateStore};
