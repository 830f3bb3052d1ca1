//! Port contracts for task persistence.
//!
//! Ports define infrastructure-agnostic interfaces used by task services and
//! behavior processors.

pub mod store;

pub use store::{TaskStore, TaskStoreError, TaskStoreResult, TaskTransaction};
