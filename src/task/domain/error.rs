//! Error types for task domain validation.

use thiserror::Error;

/// Errors returned while validating task payloads.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TaskDomainError {
    /// The task type is empty.
    #[error("task type must be provided")]
    EmptyTaskType,

    /// More than one initial status was supplied for a new task.
    #[error("a new task may only include one initial status, got {0}")]
    TooManyInitialStatuses(usize),

    /// A status value is empty.
    #[error("a blank status is not allowed")]
    EmptyStatus,

    /// A behavior has no type.
    #[error("all behaviors must have a type")]
    EmptyBehaviorType,
}
